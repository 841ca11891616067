pub mod pipeline;

pub use pipeline::{Pipeline, RunReport, Selection};
