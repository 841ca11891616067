use crate::LanguageRegistry;
use once_cell::sync::Lazy;
use regex::Regex;
use routelens_core::{Endpoint, HttpMethod, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;
use tracing::warn;

// Narrow lexical grammar: `<router>.<verb>(<quoted path>, <identifier>`.
// The captured identifier is the first bare token after the path argument, so
// middleware chains placed before the handler are not recognized. That is a
// documented limitation of this matcher, not something to widen silently.
static ROUTE_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        \b[A-Za-z_$][A-Za-z0-9_$]*          # router-like receiver
        \s*\.\s*
        (?P<verb>get|post|put|patch|delete|options|head)
        \s*\(\s*
        (?:
            '(?P<sq>[^']*)'
          | "(?P<dq>[^"]*)"
          | `(?P<bq>[^`]*)`
        )
        \s*,\s*
        (?P<handler>[A-Za-z_$][A-Za-z0-9_$]*)
        "#,
    )
    .expect("route pattern compiles")
});

/// Scans route-definition source files for endpoint bindings.
pub struct EndpointScanner {
    registry: LanguageRegistry,
}

impl EndpointScanner {
    pub fn new() -> Self {
        Self {
            registry: LanguageRegistry::new(),
        }
    }

    /// Scan one route file. A missing or unreadable file yields an empty
    /// sequence with a warning, never an error.
    pub async fn scan_file(&self, path: &Path) -> Result<Vec<Endpoint>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("cannot read route file {}: {}", path.display(), e);
                return Ok(Vec::new());
            }
        };
        Ok(self.scan_source(&content, &path.to_string_lossy()))
    }

    /// Scan every file with a recognized source extension in `dir`, in
    /// enumeration order. Cross-file ordering is not stable across platforms.
    pub async fn scan_dir(&self, dir: &Path) -> Result<Vec<Endpoint>> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("route directory {} not readable: {}", dir.display(), e);
                return Ok(Vec::new());
            }
        };

        let extensions = self.registry.source_extensions();
        let mut endpoints = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let recognized = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| extensions.contains(&e))
                .unwrap_or(false);
            if recognized {
                endpoints.extend(self.scan_file(&path).await?);
            }
        }
        Ok(endpoints)
    }

    fn scan_source(&self, source: &str, file_ref: &str) -> Vec<Endpoint> {
        let mut endpoints = Vec::new();
        for caps in ROUTE_CALL.captures_iter(source) {
            let verb = &caps["verb"];
            let method = match HttpMethod::from_str(verb) {
                Ok(method) => method,
                Err(_) => continue,
            };
            let path = caps
                .name("sq")
                .or_else(|| caps.name("dq"))
                .or_else(|| caps.name("bq"))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            endpoints.push(Endpoint {
                method,
                path,
                handler_name: caps["handler"].to_string(),
                source_file_ref: file_ref.to_string(),
            });
        }
        endpoints
    }
}

impl Default for EndpointScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive the controller file a route file's handlers should live in, by the
/// fixed `*.routes.*` → `*.controller.*` naming substitution. Best-effort: if
/// the convention does not hold the result may not exist, and the extractor
/// treats that as a normal "handler not found" miss.
pub fn controller_file_for(route_file: &Path) -> PathBuf {
    let file_name = route_file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let substituted = if file_name.contains(".routes.") {
        file_name.replace(".routes.", ".controller.")
    } else {
        file_name.replacen("routes", "controller", 1)
    };

    let parent = route_file.parent().unwrap_or_else(|| Path::new("."));
    let same_dir = parent.join(&substituted);
    if same_dir.exists() {
        return same_dir;
    }

    // Conventional sibling layout: routes/ next to controllers/.
    if parent.file_name().and_then(|n| n.to_str()) == Some("routes") {
        if let Some(grandparent) = parent.parent() {
            let sibling = grandparent.join("controllers").join(&substituted);
            if sibling.exists() {
                return sibling;
            }
        }
    }

    same_dir
}

#[cfg(test)]
mod tests {
    use super::*;
    use routelens_core::HttpMethod;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn matches_single_route_line() {
        let scanner = EndpointScanner::new();
        let eps = scanner.scan_source(r#"router.get("/users/:id", getUser);"#, "user.routes.js");
        assert_eq!(eps.len(), 1);
        assert_eq!(eps[0].method, HttpMethod::Get);
        assert_eq!(eps[0].path, "/users/:id");
        assert_eq!(eps[0].handler_name, "getUser");
    }

    #[test]
    fn accepts_all_three_quote_styles() {
        let scanner = EndpointScanner::new();
        let source = "router.get('/a', a);\nrouter.post(\"/b\", b);\nrouter.put(`/c`, c);";
        let eps = scanner.scan_source(source, "x.routes.js");
        assert_eq!(eps.len(), 3);
        assert_eq!(eps[0].path, "/a");
        assert_eq!(eps[1].method, HttpMethod::Post);
        assert_eq!(eps[2].path, "/c");
    }

    #[test]
    fn ignores_non_verb_calls_and_inline_handlers() {
        let scanner = EndpointScanner::new();
        let source = "router.use(logger);\napp.get('/x', (req, res) => res.end());";
        let eps = scanner.scan_source(source, "x.routes.js");
        assert!(eps.is_empty());
    }

    #[tokio::test]
    async fn missing_directory_is_empty_not_error() {
        let scanner = EndpointScanner::new();
        let eps = scanner
            .scan_dir(Path::new("/definitely/not/a/real/dir"))
            .await
            .unwrap();
        assert!(eps.is_empty());
    }

    #[tokio::test]
    async fn scans_only_recognized_extensions() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("user.routes.js"),
            "router.get('/users', listUsers);",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "router.get('/x', y);").unwrap();

        let scanner = EndpointScanner::new();
        let eps = scanner.scan_dir(dir.path()).await.unwrap();
        assert_eq!(eps.len(), 1);
        assert_eq!(eps[0].handler_name, "listUsers");
    }

    #[test]
    fn controller_name_substitution() {
        let controller = controller_file_for(Path::new("/srv/app/routes/user.routes.js"));
        assert!(controller
            .to_string_lossy()
            .ends_with("user.controller.js"));
    }
}
