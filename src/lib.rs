//! PDF Smart Merge Library
//!
//! Merges PDF files while sharing identical resources between them, and
//! inspects the internal structure of a PDF. This library provides
//! functionality to:
//! - Load a PDF into an object graph (tokenizing is done by lopdf)
//! - Fingerprint objects by content and deduplicate them across documents
//! - Renumber and serialize the merged graph with a fresh cross-reference table
//! - Extract metadata and produce inspection reports
//!
//! # Example
//!
//! ```no_run
//! use pdf_smart_merge::pdf::{MergeInput, MergeOptions, merge_pdfs};
//! use std::path::PathBuf;
//!
//! let options = MergeOptions {
//!     inputs: vec![
//!         MergeInput::new("handout.pdf"),
//!         MergeInput::new("handout.pdf"),
//!     ],
//!     output_path: PathBuf::from("merged.pdf"),
//! };
//!
//! let report = merge_pdfs(&options).expect("Failed to merge PDFs");
//! println!("{}", report);
//! ```

pub mod error;
pub mod pdf;
pub mod text;

// Re-export commonly used items
pub use error::{Error, Result};
