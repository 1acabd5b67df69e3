//! Error types for the smart merge library

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the smart merge library
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or unsupported input document
    #[error("Failed to parse {input}: {message}")]
    Parse {
        /// Identity of the offending input (usually its path)
        input: String,
        message: String,
    },

    /// Caller supplied a page range the document cannot satisfy
    #[error("Invalid page range {first}-{last} for {input} ({page_count} pages)")]
    PageRange {
        input: String,
        first: usize,
        last: usize,
        page_count: usize,
    },

    /// Internal invariant violation detected while emitting the output
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Operation not permitted in the current merge session state
    #[error("Cannot {operation} a merge session in state {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// Nothing was merged
    #[error("No input documents to merge")]
    NoDocuments,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Invalid PDF (no pages)
    #[error("PDF has no pages: {0}")]
    EmptyPdf(String),
}

impl Error {
    pub(crate) fn parse(input: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Parse {
            input: input.into(),
            message: message.into(),
        }
    }
}
