//! Summarization pipeline: chunking, the resilient query engine, and reduction.

pub mod chunking;
mod engine;
mod service;
pub mod types;

pub use chunking::{Chunker, PARAGRAPH_SEPARATOR, chunk_text};
pub use engine::QueryEngine;
pub use service::SummaryPipeline;
pub use types::{ChunkingError, PipelineError, QueryError, QuerySettings};
