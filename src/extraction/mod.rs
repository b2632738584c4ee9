//! Plain-text extraction from the supported input formats.
//!
//! The format is chosen by file extension: `.html`/`.htm` documents are parsed with `scraper` and
//! their block elements become paragraphs, `.pdf` documents go through `pdf-extract` with page
//! breaks turned into paragraph breaks, and everything else is read as text. Text files are decoded
//! as UTF-8 (BOM stripped), as UTF-16 when a BOM says so, and as Latin-1 when they are not valid
//! UTF-8.

use crate::processing::chunking::{PARAGRAPH_SEPARATOR, split_paragraphs};
use scraper::{ElementRef, Html};
use std::path::{Path, PathBuf};
use thiserror::Error;

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "head", "template"];
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "aside", "main", "nav", "h1", "h2",
    "h3", "h4", "h5", "h6", "li", "ul", "ol", "tr", "table", "blockquote", "pre", "dd", "dt",
];

/// Errors raised when no usable text can be produced for an input file.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// File we attempted to read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The PDF text layer could not be extracted.
    #[error("failed to extract PDF text from {}: {message}", .path.display())]
    Pdf {
        /// PDF we attempted to read.
        path: PathBuf,
        /// Failure reported by the PDF extractor.
        message: String,
    },
    /// The file was readable but held no text.
    #[error("no text could be extracted from {}", .0.display())]
    NoText(PathBuf),
}

/// Return the plain text of the document at `path`.
pub fn extract(path: &Path) -> Result<String, ExtractionError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase);

    let text = match extension.as_deref() {
        Some("html" | "htm") => html_to_text(&decode_text(&bytes)),
        Some("pdf") => pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|error| ExtractionError::Pdf {
                path: path.to_path_buf(),
                message: error.to_string(),
            })?
            .replace('\x0C', PARAGRAPH_SEPARATOR),
        _ => decode_text(&bytes),
    };

    if text.trim().is_empty() {
        return Err(ExtractionError::NoText(path.to_path_buf()));
    }

    tracing::debug!(
        path = %path.display(),
        format = extension.as_deref().unwrap_or("text"),
        bytes = bytes.len(),
        "Extracted text"
    );
    Ok(text)
}

/// Flatten an HTML document into paragraphs of visible text.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();
    collect_text(document.root_element(), &mut raw);

    split_paragraphs(&raw)
        .map(|paragraph| paragraph.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join(PARAGRAPH_SEPARATOR)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for node in element.children() {
        if let Some(child) = ElementRef::wrap(node) {
            let name = child.value().name();
            if SKIPPED_TAGS.contains(&name) {
                continue;
            }
            let block = BLOCK_TAGS.contains(&name);
            if block {
                out.push_str(PARAGRAPH_SEPARATOR);
            } else if name == "br" {
                out.push('\n');
            }
            collect_text(child, out);
            if block {
                out.push_str(PARAGRAPH_SEPARATOR);
            }
        } else if let Some(text) = node.value().as_text() {
            out.push_str(text);
        }
    }
}

fn decode_text(bytes: &[u8]) -> String {
    let text = if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        String::from_utf8_lossy(rest).into_owned()
    } else if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        decode_utf16(rest, u16::from_le_bytes)
    } else if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        decode_utf16(rest, u16::from_be_bytes)
    } else {
        match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => {
                tracing::warn!("Input is not valid UTF-8; decoding as Latin-1");
                bytes.iter().map(|&byte| char::from(byte)).collect()
            }
        }
    };
    text.replace("\r\n", "\n")
}

fn decode_utf16(bytes: &[u8], read: fn([u8; 2]) -> u16) -> String {
    let units = bytes.chunks_exact(2).map(|pair| read([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}
