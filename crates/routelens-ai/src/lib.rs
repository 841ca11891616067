pub mod insight;
pub mod prompt;
pub mod provider;

pub use insight::{clean, save_insight};
pub use prompt::build_review_prompt;
pub use provider::{analyze, ModelClient, ModelReview, OpenAiCompatClient};
