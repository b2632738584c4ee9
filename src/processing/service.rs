//! Pipeline coordinating extraction, chunking, per-chunk summarization, and reduction.

use crate::{
    extraction::extract,
    metrics::{MetricsSnapshot, QueryMetrics},
    processing::{
        chunking::{Chunker, PARAGRAPH_SEPARATOR},
        engine::QueryEngine,
        types::{PipelineError, QuerySettings},
    },
    summarization::SummarizationClient,
};
use std::path::Path;
use std::sync::Arc;

/// Runs the whole summarization of one document.
///
/// The pipeline owns the remote client (through its query engine) for the duration of a run, so
/// tests can hand in any [`SummarizationClient`] double. Chunks are summarized strictly one after
/// another, in document order, and the ordered summaries are reduced into one final summary that is
/// always produced by the same resilient query path.
pub struct SummaryPipeline {
    engine: QueryEngine,
    chunker: Chunker,
    max_chunk_size: usize,
    max_rounds: usize,
    metrics: Arc<QueryMetrics>,
}

impl SummaryPipeline {
    /// Build a pipeline around `client`, measuring sizes with `chunker`.
    pub fn new(
        client: Box<dyn SummarizationClient + Send + Sync>,
        chunker: Chunker,
        settings: QuerySettings,
    ) -> Self {
        let metrics = Arc::new(QueryMetrics::new());
        let max_chunk_size = settings.max_chunk_size;
        let max_rounds = settings.max_split_depth.max(1);
        let engine = QueryEngine::new(client, chunker.clone(), settings, metrics.clone());
        Self {
            engine,
            chunker,
            max_chunk_size,
            max_rounds,
            metrics,
        }
    }

    /// Extract the document at `path` and summarize it.
    pub async fn summarize_file(&self, path: &Path) -> Result<String, PipelineError> {
        let text = extract(path)?;
        tracing::info!(
            path = %path.display(),
            size = self.chunker.measure(&text),
            unit = %self.chunker.unit(),
            "Extracted document"
        );
        self.summarize_document(&text).await
    }

    /// Chunk `text`, summarize every chunk in order, and reduce the summaries.
    pub async fn summarize_document(&self, text: &str) -> Result<String, PipelineError> {
        let chunks = self.chunker.chunk(text, self.max_chunk_size)?;
        if chunks.is_empty() {
            return Err(PipelineError::EmptyDocument);
        }

        let total = chunks.len();
        self.metrics.record_chunks(total as u64);
        let mut summaries = Vec::with_capacity(total);
        for (index, chunk) in chunks.into_iter().enumerate() {
            tracing::info!(chunk = index + 1, total, "Processing chunk");
            summaries.push(self.engine.summarize(&chunk).await?);
        }

        self.reduce(summaries).await
    }

    /// Combine ordered summaries into one final summary.
    ///
    /// While the concatenation is larger than the chunk bound it is rechunked and every chunk is
    /// summarized again. Rounds stop early when they no longer shrink the text, and the remaining
    /// concatenation is then left to the query engine's own subdivision path.
    pub async fn reduce(&self, summaries: Vec<String>) -> Result<String, PipelineError> {
        if summaries.is_empty() {
            return Err(PipelineError::EmptyDocument);
        }

        let mut combined = summaries.join(PARAGRAPH_SEPARATOR);
        for round in 1..=self.max_rounds {
            let size = self.chunker.measure(&combined);
            if size <= self.max_chunk_size {
                break;
            }

            let chunks = self.chunker.chunk(&combined, self.max_chunk_size)?;
            if chunks.len() < 2 {
                break;
            }

            tracing::info!(round, size, pieces = chunks.len(), "Reducing oversized summary set");
            let mut reduced = Vec::with_capacity(chunks.len());
            for chunk in &chunks {
                reduced.push(self.engine.summarize(chunk).await?);
            }

            let next = reduced.join(PARAGRAPH_SEPARATOR);
            let next_size = self.chunker.measure(&next);
            combined = next;
            if next_size >= size {
                tracing::debug!(round, size, next_size, "Reduction round did not shrink summaries");
                break;
            }
        }

        tracing::info!(size = self.chunker.measure(&combined), "Summarizing combined summaries");
        Ok(self.engine.summarize(&combined).await?)
    }

    /// Return the counters accumulated by this pipeline.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
