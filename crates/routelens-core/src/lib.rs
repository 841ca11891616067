pub mod config;
pub mod error;
pub mod naming;
pub mod types;

pub use config::{LoggingConfig, ModelConfig, PathsConfig, Settings};
pub use error::{Result, RouteLensError};
pub use naming::{fs_safe_timestamp, insight_file_name, payload_file_name};
pub use types::*;
