#![deny(missing_docs)]

//! Core library for docsum, a summarizer for documents of any size.

/// Environment-driven configuration management.
pub mod config;
/// Plain-text extraction from text, HTML, and PDF files.
pub mod extraction;
/// Structured logging and tracing setup.
pub mod logging;
/// Run counters for the query engine.
pub mod metrics;
/// Chunking, resilient querying, and reduction.
pub mod processing;
/// Remote summarizer abstraction and adapters.
pub mod summarization;
