// ABOUTME: Defines the source dialects the extractor can parse.
// ABOUTME: Maps file extensions to Tree-sitter grammars and builds configured parsers.
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    JavaScript,
    TypeScript,
}

pub struct LanguageConfig {
    pub language: tree_sitter::Language,
    pub file_extensions: Vec<&'static str>,
}

pub struct LanguageRegistry {
    configs: HashMap<Language, LanguageConfig>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        let mut configs = HashMap::new();

        configs.insert(
            Language::JavaScript,
            LanguageConfig {
                language: tree_sitter_javascript::LANGUAGE.into(),
                file_extensions: vec!["js", "jsx", "mjs", "cjs"],
            },
        );

        configs.insert(
            Language::TypeScript,
            LanguageConfig {
                language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
                file_extensions: vec!["ts", "tsx"],
            },
        );

        Self { configs }
    }

    pub fn detect_language(&self, file_path: &str) -> Option<Language> {
        let extension = Path::new(file_path).extension()?.to_str()?;
        for (language, config) in &self.configs {
            if config.file_extensions.contains(&extension) {
                return Some(*language);
            }
        }
        None
    }

    pub fn create_parser(&self, language: &Language) -> Option<Parser> {
        let config = self.configs.get(language)?;
        let mut parser = Parser::new();
        parser.set_language(&config.language).ok()?;
        Some(parser)
    }

    /// Extensions the directory scanner treats as route source files.
    pub fn source_extensions(&self) -> Vec<&'static str> {
        let mut exts: Vec<&'static str> = self
            .configs
            .values()
            .flat_map(|c| c.file_extensions.iter().copied())
            .collect();
        exts.sort_unstable();
        exts
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
