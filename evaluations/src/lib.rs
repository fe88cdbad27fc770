pub mod processor;
pub mod relevance;

pub use processor::{EvalProcessor, EvalSummary};
