pub mod payload;
pub mod refiner;
pub mod sanitizer;

pub use payload::{atomic_publish, build_payload, clear_payload_dir, load_payloads, save_payload};
pub use refiner::refine;
pub use sanitizer::sanitize;
