pub mod extractor;
pub mod language;
pub mod scanner;

pub use extractor::SourceExtractor;
pub use language::{Language, LanguageConfig, LanguageRegistry};
pub use scanner::{controller_file_for, EndpointScanner};
