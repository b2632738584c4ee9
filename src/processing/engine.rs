//! Resilient query engine.
//!
//! Submits one text to the remote summarizer and recovers from the failures the client reports:
//!
//! - transient faults and request-frequency limits wait and resubmit the same text, with an
//!   exponential backoff bounded by `retry_limit` submissions;
//! - rejections (and token-volume limits) subdivide the text with a halved size bound, summarize
//!   every piece in order, and summarize the recombined pieces.
//!
//! Subdivision is driven by an explicit stack of split frames rather than recursion. Pieces of a
//! split keep the depth of the text that was split, since every split at least halves the size
//! bound and the chunker eventually reports an irreducible paragraph. The recombined summaries of a
//! split run one level deeper, and a text may only be split while its depth is below
//! `max_split_depth`, so chains of recombinations that keep getting rejected stop as well.

use super::chunking::{Chunker, PARAGRAPH_SEPARATOR};
use super::types::{QueryError, QuerySettings};
use crate::metrics::QueryMetrics;
use crate::summarization::{
    RateLimitKind, SummarizationClient, SummarizationClientError, SummarizationRequest,
};
use std::sync::Arc;
use std::time::Duration;

/// Summarizes one text at a time, retrying and subdividing as the remote service demands.
pub struct QueryEngine {
    client: Box<dyn SummarizationClient + Send + Sync>,
    chunker: Chunker,
    settings: QuerySettings,
    metrics: Arc<QueryMetrics>,
}

struct Task {
    text: String,
    depth: usize,
}

/// Pieces of a subdivided text still waiting for a summary, and the summaries collected so far.
struct SplitFrame {
    depth: usize,
    pending: std::vec::IntoIter<String>,
    summaries: Vec<String>,
}

enum Outcome {
    Summary(String),
    Split(Vec<String>),
}

enum Subdivision {
    Chunks(Vec<String>),
    Irreducible,
}

enum Recovery {
    Wait(Option<Duration>),
    Shrink,
    /// Subdivide, or wait with the hint when the text is irreducible.
    ShrinkOrWait(Option<Duration>),
    Fail,
}

/// Retry bookkeeping for one text.
struct QueryAttempt {
    attempts: u32,
    next_delay: Duration,
}

impl QueryAttempt {
    fn new(initial_delay: Duration) -> Self {
        Self {
            attempts: 0,
            next_delay: initial_delay,
        }
    }

    fn backoff(&mut self, hint: Option<Duration>, ceiling: Duration) -> Duration {
        let delay = hint.unwrap_or(self.next_delay).min(ceiling);
        self.next_delay = self.next_delay.saturating_mul(2).min(ceiling);
        delay
    }
}

impl QueryEngine {
    /// Build an engine around an explicit client; the client lives as long as the engine.
    pub fn new(
        client: Box<dyn SummarizationClient + Send + Sync>,
        chunker: Chunker,
        settings: QuerySettings,
        metrics: Arc<QueryMetrics>,
    ) -> Self {
        Self {
            client,
            chunker,
            settings,
            metrics,
        }
    }

    /// Settings the engine was built with.
    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Summarize `text`, returning a non-empty summary or an unrecoverable error.
    pub async fn summarize(&self, text: &str) -> Result<String, QueryError> {
        let mut frames: Vec<SplitFrame> = Vec::new();
        let mut task = Task {
            text: text.to_string(),
            depth: 0,
        };

        loop {
            match self.attempt(&task).await? {
                Outcome::Split(chunks) => {
                    self.metrics.record_subdivision();
                    frames.push(SplitFrame {
                        depth: task.depth,
                        summaries: Vec::with_capacity(chunks.len()),
                        pending: chunks.into_iter(),
                    });
                }
                Outcome::Summary(summary) => match frames.last_mut() {
                    None => return Ok(summary),
                    Some(frame) => frame.summaries.push(summary),
                },
            }

            if let Some(mut frame) = frames.pop() {
                task = match frame.pending.next() {
                    Some(chunk) => {
                        let depth = frame.depth;
                        tracing::debug!(
                            depth,
                            piece = frame.summaries.len() + 1,
                            "Processing subdivided piece"
                        );
                        frames.push(frame);
                        Task { text: chunk, depth }
                    }
                    None => {
                        let depth = frame.depth + 1;
                        tracing::debug!(
                            depth,
                            pieces = frame.summaries.len(),
                            "Combining piece summaries"
                        );
                        Task {
                            text: frame.summaries.join(PARAGRAPH_SEPARATOR),
                            depth,
                        }
                    }
                };
            }
        }
    }

    async fn attempt(&self, task: &Task) -> Result<Outcome, QueryError> {
        let mut attempt = QueryAttempt::new(self.settings.retry_delay);

        loop {
            attempt.attempts += 1;
            self.metrics.record_call();
            let request = SummarizationRequest {
                model: self.settings.model.clone(),
                instruction: self.settings.instruction.clone(),
                text: task.text.clone(),
            };

            let error = match self.client.generate_summary(request).await {
                Ok(summary) if !summary.trim().is_empty() => {
                    return Ok(Outcome::Summary(summary.trim().to_string()));
                }
                Ok(_) => SummarizationClientError::Transient("empty summary returned".into()),
                Err(error) => error,
            };

            let recovery = match &error {
                SummarizationClientError::Transient(_) => Recovery::Wait(None),
                SummarizationClientError::RateLimited {
                    limit: RateLimitKind::Requests,
                    retry_after,
                    ..
                } => Recovery::Wait(*retry_after),
                SummarizationClientError::RateLimited {
                    limit: RateLimitKind::Tokens,
                    retry_after,
                    ..
                } => Recovery::ShrinkOrWait(*retry_after),
                SummarizationClientError::Rejected(_) => Recovery::Shrink,
                SummarizationClientError::Unauthorized(_)
                | SummarizationClientError::InvalidResponse(_)
                | SummarizationClientError::ProviderUnavailable(_) => Recovery::Fail,
            };

            let hint = match recovery {
                Recovery::Fail => return Err(QueryError::Remote(error)),
                Recovery::Wait(hint) => hint,
                Recovery::ShrinkOrWait(hint) => match self.subdivide(task)? {
                    Subdivision::Chunks(chunks) => return Ok(Outcome::Split(chunks)),
                    Subdivision::Irreducible => hint,
                },
                Recovery::Shrink => match self.subdivide(task)? {
                    Subdivision::Chunks(chunks) => return Ok(Outcome::Split(chunks)),
                    Subdivision::Irreducible => {
                        return Err(QueryError::Oversized {
                            size: self.chunker.measure(&task.text),
                            unit: self.chunker.unit(),
                            source: error,
                        });
                    }
                },
            };

            if attempt.attempts >= self.settings.retry_limit {
                return Err(QueryError::RetriesExhausted {
                    attempts: attempt.attempts,
                    source: error,
                });
            }

            let delay = attempt.backoff(hint, self.settings.max_retry_delay);
            let rate_limited = matches!(error, SummarizationClientError::RateLimited { .. });
            self.metrics.record_retry(rate_limited);
            tracing::warn!(
                attempt = attempt.attempts,
                delay_ms = delay.as_millis() as u64,
                depth = task.depth,
                error = %error,
                "Retrying after remote failure"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn subdivide(&self, task: &Task) -> Result<Subdivision, QueryError> {
        let size = self.chunker.measure(&task.text);
        let bound = (size / 2).min(self.settings.max_chunk_size).max(1);
        let chunks = self.chunker.chunk(&task.text, bound)?;
        if chunks.len() < 2 {
            return Ok(Subdivision::Irreducible);
        }
        if task.depth >= self.settings.max_split_depth {
            return Err(QueryError::DepthExceeded {
                max_depth: self.settings.max_split_depth,
            });
        }

        tracing::info!(
            depth = task.depth,
            size,
            bound,
            pieces = chunks.len(),
            "Subdividing oversized request"
        );
        Ok(Subdivision::Chunks(chunks))
    }
}
