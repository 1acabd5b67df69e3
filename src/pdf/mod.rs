//! PDF object graphs, smart merging and inspection

pub mod object;
pub mod graph;
pub mod loader;
pub mod fingerprint;
pub mod dedup;
pub mod writer;
pub mod session;
pub mod merge;
pub mod metadata;
pub mod inspect;

// Re-export commonly used items
pub use object::{Dictionary, IndirectObject, Object, ObjectId, Stream, StringFormat};
pub use graph::{ObjectGraph, XrefFormat, XrefLayout};
pub use loader::{load_bytes, load_file};
pub use fingerprint::{Fingerprint, Fingerprinter};
pub use dedup::{DedupStats, MergedGraph, PageRange};
pub use writer::serialize;
pub use session::{MergeSession, SessionState, PRODUCER};
pub use merge::{merge_pdfs, merge_to_writer, InputSummary, MergeInput, MergeOptions, MergeReport};
pub use metadata::{count_pages, extract_metadata, PdfMetadata};
pub use inspect::{inspect, inspect_file, DocumentReport, InspectOptions};
