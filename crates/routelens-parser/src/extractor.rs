use crate::LanguageRegistry;
use routelens_core::{ExtractedFunction, Result, RouteLensError};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::warn;
use tree_sitter::Node;

/// Locates the exact source span of a named handler function inside one
/// controller file. Uses a full Tree-sitter parse rather than bracket
/// counting: handler bodies routinely contain nested braces, strings with
/// braces, and nested callbacks that lexical matching cannot delimit.
pub struct SourceExtractor {
    registry: Arc<LanguageRegistry>,
}

impl SourceExtractor {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(LanguageRegistry::new()),
        }
    }

    /// Returns the handler's `ExtractedFunction`, or `None` when the file is
    /// unreadable, unparsable, or does not define the handler. All three are
    /// normal per-endpoint misses, reported as warnings and never fatal.
    pub async fn extract_function(
        &self,
        file_path: &Path,
        handler_name: &str,
    ) -> Result<Option<ExtractedFunction>> {
        let content = match fs::read_to_string(file_path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    "cannot read controller file {} while looking for '{}': {}",
                    file_path.display(),
                    handler_name,
                    e
                );
                return Ok(None);
            }
        };

        let Some(language) = self.registry.detect_language(&file_path.to_string_lossy()) else {
            warn!(
                "unrecognized source extension for {}, skipping '{}'",
                file_path.display(),
                handler_name
            );
            return Ok(None);
        };

        let registry = self.registry.clone();
        let handler = handler_name.to_string();
        // Named to avoid colliding with the `display` helper that tracing's
        // macros bring into scope.
        let path_display = file_path.display().to_string();

        tokio::task::spawn_blocking(move || {
            let Some(mut parser) = registry.create_parser(&language) else {
                warn!("no parser available for {}", path_display);
                return Ok(None);
            };
            let Some(tree) = parser.parse(&content, None) else {
                warn!("parse failed for {}, skipping '{}'", path_display, handler);
                return Ok(None);
            };
            Ok(find_function(tree.root_node(), &content, &handler))
        })
        .await
        .map_err(|e| RouteLensError::Parse(e.to_string()))?
    }
}

impl Default for SourceExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Search order mandated for handler lookup: first a top-level function
/// declaration with the name, else a top-level `name = <function|arrow>`
/// binding. First match wins in both passes.
fn find_function(root: Node, source: &str, name: &str) -> Option<ExtractedFunction> {
    let mut cursor = root.walk();

    for child in root.named_children(&mut cursor) {
        let node = unwrap_export(child);
        if is_function_declaration(node.kind()) && declared_name(node, source) == Some(name) {
            return Some(build_extracted(node, source, name));
        }
    }

    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        let node = unwrap_export(child);
        if !matches!(node.kind(), "lexical_declaration" | "variable_declaration") {
            continue;
        }
        let mut decl_cursor = node.walk();
        for declarator in node.named_children(&mut decl_cursor) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let bound_name = declarator
                .child_by_field_name("name")
                .and_then(|n| n.utf8_text(source.as_bytes()).ok());
            if bound_name != Some(name) {
                continue;
            }
            if let Some(value) = declarator.child_by_field_name("value") {
                if is_function_literal(value.kind()) {
                    // The span covers the function construct only, not the
                    // surrounding const/let statement.
                    return Some(build_extracted(value, source, name));
                }
            }
        }
    }

    None
}

fn unwrap_export(node: Node) -> Node {
    if node.kind() == "export_statement" {
        if let Some(declaration) = node.child_by_field_name("declaration") {
            return declaration;
        }
    }
    node
}

fn is_function_declaration(kind: &str) -> bool {
    matches!(
        kind,
        "function_declaration" | "generator_function_declaration"
    )
}

fn is_function_literal(kind: &str) -> bool {
    matches!(
        kind,
        "arrow_function" | "function_expression" | "function" | "generator_function"
    )
}

fn declared_name<'a>(node: Node, source: &'a str) -> Option<&'a str> {
    node.child_by_field_name("name")
        .and_then(|n| n.utf8_text(source.as_bytes()).ok())
}

fn build_extracted(node: Node, source: &str, name: &str) -> ExtractedFunction {
    let source_text = node
        .utf8_text(source.as_bytes())
        .unwrap_or_default()
        .to_string();
    ExtractedFunction {
        name: name.to_string(),
        source_text,
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
        is_async: node.child(0).map(|c| c.kind() == "async").unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    async fn extract(source: &str, name: &str) -> Option<ExtractedFunction> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("user.controller.js");
        fs::write(&path, source).unwrap();
        SourceExtractor::new()
            .extract_function(&path, name)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn extracts_function_declaration_span() {
        let source = "const db = require('./db');\n\nfunction getUser(req, res) {\n  res.json({ id: req.params.id });\n}\n";
        let f = extract(source, "getUser").await.unwrap();
        assert!(!f.is_async);
        assert_eq!(
            f.source_text,
            "function getUser(req, res) {\n  res.json({ id: req.params.id });\n}"
        );
        assert_eq!(f.start_line, 3);
        assert_eq!(f.end_line, 5);
    }

    #[tokio::test]
    async fn extracts_arrow_binding_span_only() {
        let source = "const getUser = async (req, res) => {\n  res.json(await load(req.params.id));\n};\n";
        let f = extract(source, "getUser").await.unwrap();
        assert!(f.is_async);
        assert!(f.source_text.starts_with("async (req, res) =>"));
        assert!(!f.source_text.starts_with("const"));
        assert!(!f.source_text.ends_with(';'));
    }

    #[tokio::test]
    async fn declaration_wins_over_binding() {
        let source = "const getUser = () => {};\nfunction getUser(req, res) { res.end(); }\n";
        let f = extract(source, "getUser").await.unwrap();
        assert!(f.source_text.starts_with("function getUser"));
    }

    #[tokio::test]
    async fn finds_exported_handlers() {
        let source = "export async function getUser(req, res) { res.json({}); }\n";
        let f = extract(source, "getUser").await.unwrap();
        assert!(f.is_async);
        assert!(f.source_text.starts_with("async function getUser"));
    }

    #[tokio::test]
    async fn body_braces_do_not_confuse_the_span() {
        let source = "function getUser(req, res) {\n  const s = \"}}{\";\n  res.on('end', () => { res.json({ s }); });\n}\n";
        let f = extract(source, "getUser").await.unwrap();
        assert!(f.source_text.ends_with('}'));
        assert_eq!(f.end_line, 4);
    }

    #[tokio::test]
    async fn unknown_handler_is_none() {
        assert!(extract("function other() {}", "getUser").await.is_none());
    }

    #[tokio::test]
    async fn missing_file_is_none_not_error() {
        let got = SourceExtractor::new()
            .extract_function(Path::new("/no/such/file.controller.js"), "getUser")
            .await
            .unwrap();
        assert!(got.is_none());
    }
}
