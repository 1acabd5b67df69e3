//! PDF metadata extraction

use std::path::Path;

use crate::error::Result;
use crate::text::decode_text_string;
use super::graph::{ObjectGraph, XrefLayout};
use super::loader::load_file;
use super::object::Object;

/// PDF metadata
#[derive(Debug, Clone)]
pub struct PdfMetadata {
    /// Number of pages in the PDF
    pub page_count: usize,
    /// Document title (if present)
    pub title: Option<String>,
    /// Document author (if present)
    pub author: Option<String>,
    /// Header version, e.g. "1.7"
    pub version: String,
    /// How the cross-reference information is stored
    pub layout: XrefLayout,
}

impl PdfMetadata {
    /// Collect the metadata of an already loaded document.
    pub fn from_graph(graph: &ObjectGraph) -> Self {
        PdfMetadata {
            page_count: graph.page_count(),
            title: info_text(graph, b"Title"),
            author: info_text(graph, b"Author"),
            version: graph.version.clone(),
            layout: graph.layout,
        }
    }
}

/// Text entry of the document information dictionary.
pub fn info_text(graph: &ObjectGraph, key: &[u8]) -> Option<String> {
    let info = graph.get_dict(graph.info?)?;
    match graph.resolve_key(info, key)? {
        Object::String(bytes, _) => Some(decode_text_string(bytes)),
        _ => None,
    }
}

/// Extract metadata from a PDF file
pub fn extract_metadata(path: &Path) -> Result<PdfMetadata> {
    let graph = load_file(path)?;
    Ok(PdfMetadata::from_graph(&graph))
}

/// Count the number of pages in a PDF file
///
/// Pages are counted by walking the page tree, not by trusting `/Count`.
pub fn count_pages(path: &Path) -> Result<usize> {
    Ok(load_file(path)?.page_count())
}
