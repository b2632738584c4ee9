//! Core data types and error definitions for the summarization pipeline.

use crate::config::SizeUnit;
use crate::extraction::ExtractionError;
use crate::summarization::SummarizationClientError;
use anyhow::Error as TokenizerError;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Caller configured an impossible size bound.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable.
    #[error("failed to initialize tokenizer '{encoding}': {source}")]
    Tokenizer {
        /// Encoding we attempted to load.
        encoding: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Unrecoverable outcomes of the resilient query engine.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The service rejected a unit of text that cannot be subdivided further.
    #[error("remote summarizer rejected an irreducible unit of {size} {unit}: {source}")]
    Oversized {
        /// Size of the rejected text.
        size: usize,
        /// Unit `size` is expressed in.
        unit: SizeUnit,
        /// Rejection reported by the service.
        #[source]
        source: SummarizationClientError,
    },
    /// The same text failed transiently on every permitted submission.
    #[error("remote summarizer still failing after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Submissions made before giving up.
        attempts: u32,
        /// Last failure reported by the service.
        #[source]
        source: SummarizationClientError,
    },
    /// Subdivision would go deeper than the configured bound.
    #[error("request subdivision exceeded the maximum depth of {max_depth}")]
    DepthExceeded {
        /// Configured depth bound.
        max_depth: usize,
    },
    /// The service failed in a way waiting or subdividing cannot fix.
    #[error("remote summarizer failed: {0}")]
    Remote(#[source] SummarizationClientError),
    /// Subdivision could not chunk the rejected text.
    #[error("failed to subdivide request: {0}")]
    Chunking(#[from] ChunkingError),
}

/// Errors emitted by the end-to-end pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No usable text could be obtained from the input.
    #[error("Failed to extract document text: {0}")]
    Extraction(#[from] ExtractionError),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Summarizing a chunk or the reduction failed for good.
    #[error("Failed to summarize document: {0}")]
    Query(#[from] QueryError),
    /// The document contained no paragraphs to summarize.
    #[error("Document contains no text to summarize")]
    EmptyDocument,
}

impl PipelineError {
    /// Process exit status reported for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Extraction(_) | Self::EmptyDocument => 2,
            Self::Query(QueryError::Oversized { .. } | QueryError::DepthExceeded { .. }) => 3,
            Self::Query(QueryError::RetriesExhausted { .. }) => 4,
            Self::Query(QueryError::Remote(_)) => 5,
            Self::Chunking(_) | Self::Query(QueryError::Chunking(_)) => 1,
        }
    }
}

/// Tunables for the resilient query engine and the reducer.
#[derive(Debug, Clone)]
pub struct QuerySettings {
    /// Model identifier passed to the remote summarizer.
    pub model: String,
    /// Instruction sent with every request.
    pub instruction: String,
    /// Upper bound on chunk size, in the chunker's unit.
    pub max_chunk_size: usize,
    /// Total submissions of the same text before giving up.
    pub retry_limit: u32,
    /// First backoff delay.
    pub retry_delay: Duration,
    /// Ceiling applied to every backoff wait.
    pub max_retry_delay: Duration,
    /// Deepest permitted subdivision along one chain.
    pub max_split_depth: usize,
}

impl QuerySettings {
    /// Derive engine settings from the loaded configuration.
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            model: config.model.clone(),
            instruction: config.summary_prompt.clone(),
            max_chunk_size: config.max_chunk_size,
            retry_limit: config.retry_limit,
            retry_delay: config.retry_delay,
            max_retry_delay: config.max_retry_delay,
            max_split_depth: config.max_split_depth,
        }
    }
}
