//! Paragraph-respecting chunker.
//!
//! Text is split on blank lines (two or more consecutive line breaks), each paragraph is trimmed,
//! empty paragraphs are dropped, and the remaining paragraphs are packed greedily into chunks whose
//! measured size stays within a bound. Packed paragraphs are rejoined with [`PARAGRAPH_SEPARATOR`].
//!
//! Size is measured with the run's [`SizeUnit`]:
//!
//! - `characters`: Unicode scalar values; the separator costs two.
//! - `words`: whitespace-delimited words; the separator is free.
//! - `tokens`: `cl100k_base` tokens via `tiktoken-rs`, which is how the remote service meters
//!   requests; the separator costs whatever it encodes to.
//!
//! A paragraph that alone exceeds the bound is emitted unmodified as its own chunk. Resolving that
//! oversize is the query engine's job, not the chunker's.

use crate::config::SizeUnit;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tiktoken_rs::cl100k_base;

use super::types::ChunkingError;

/// Separator placed between paragraphs packed into one chunk, and between combined summaries.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

static PARAGRAPH_BREAK: OnceLock<Regex> = OnceLock::new();

fn paragraph_break() -> &'static Regex {
    PARAGRAPH_BREAK
        .get_or_init(|| Regex::new(r"(?:\r?\n){2,}").expect("paragraph break pattern is valid"))
}

/// Splits text into ordered, size-bounded chunks measured in one [`SizeUnit`].
#[derive(Clone)]
pub struct Chunker {
    unit: SizeUnit,
    counter: TokenCounter,
    separator_overhead: usize,
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("unit", &self.unit)
            .field("separator_overhead", &self.separator_overhead)
            .finish()
    }
}

impl Chunker {
    /// Build a chunker for the given unit, loading the tokenizer when sizes are in tokens.
    pub fn new(unit: SizeUnit) -> Result<Self, ChunkingError> {
        let counter = build_token_counter(unit)?;
        let separator_overhead = match unit {
            SizeUnit::Characters => PARAGRAPH_SEPARATOR.chars().count(),
            SizeUnit::Words => 0,
            SizeUnit::Tokens => counter.as_ref()(PARAGRAPH_SEPARATOR),
        };
        Ok(Self {
            unit,
            counter,
            separator_overhead,
        })
    }

    /// Unit every measurement of this chunker is expressed in.
    pub fn unit(&self) -> SizeUnit {
        self.unit
    }

    /// Measure `text` in this chunker's unit.
    pub fn measure(&self, text: &str) -> usize {
        self.counter.as_ref()(text)
    }

    /// Chunk `text` so every chunk measures at most `max_chunk_size`, except a single paragraph
    /// that is larger on its own.
    ///
    /// Returns an empty vector when the text holds no non-whitespace paragraph.
    pub fn chunk(&self, text: &str, max_chunk_size: usize) -> Result<Vec<String>, ChunkingError> {
        if max_chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_size = 0usize;

        for paragraph in split_paragraphs(text) {
            let paragraph_size = self.measure(paragraph);
            if current_size + paragraph_size + self.separator_overhead > max_chunk_size {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                current.push_str(paragraph);
                current_size = paragraph_size;
            } else {
                if !current.is_empty() {
                    current.push_str(PARAGRAPH_SEPARATOR);
                    current_size += self.separator_overhead;
                }
                current.push_str(paragraph);
                current_size += paragraph_size;
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        Ok(chunks)
    }
}

/// Chunk `text` with a freshly built chunker for `unit`.
pub fn chunk_text(
    text: &str,
    max_chunk_size: usize,
    unit: SizeUnit,
) -> Result<Vec<String>, ChunkingError> {
    Chunker::new(unit)?.chunk(text, max_chunk_size)
}

/// Split on blank lines, trimming each paragraph and dropping the empty ones.
pub fn split_paragraphs(text: &str) -> impl Iterator<Item = &str> {
    paragraph_break()
        .split(text)
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
}

fn build_token_counter(unit: SizeUnit) -> Result<TokenCounter, ChunkingError> {
    match unit {
        SizeUnit::Characters => Ok(Arc::new(|segment: &str| segment.chars().count())),
        SizeUnit::Words => Ok(Arc::new(|segment: &str| segment.split_whitespace().count())),
        SizeUnit::Tokens => {
            let encoding = cl100k_base().map_err(|source| ChunkingError::Tokenizer {
                encoding: "cl100k_base".to_string(),
                source,
            })?;
            let encoding = Arc::new(encoding);
            Ok(Arc::new(move |segment: &str| {
                encoding.encode_ordinary(segment).len()
            }))
        }
    }
}
