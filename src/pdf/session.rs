//! Merge session state machine
//!
//! `Empty → Accumulating → Finalized → Closed`. Documents are merged one at a
//! time while the session is empty or accumulating; [`MergeSession::finalize`]
//! serializes exactly once.

use std::fmt;
use chrono::Local;
use log::info;

use crate::error::{Error, Result};
use super::dedup::{DedupStats, MergedGraph, PageRange};
use super::graph::ObjectGraph;
use super::object::{Dictionary, Object, StringFormat};
use super::writer;

/// Value written to `/Producer` of merged files.
pub const PRODUCER: &str = concat!("pdf-smart-merge ", env!("CARGO_PKG_VERSION"));

/// Lifecycle state of a [`MergeSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Accumulating,
    Finalized,
    Closed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Empty => "empty",
            SessionState::Accumulating => "accumulating",
            SessionState::Finalized => "finalized",
            SessionState::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulates documents into one deduplicated output.
///
/// # Example
///
/// ```no_run
/// use pdf_smart_merge::pdf::{load_file, MergeSession, PageRange};
/// use std::path::Path;
///
/// let mut session = MergeSession::new();
/// session.merge(&load_file(Path::new("a.pdf"))?, None)?;
/// session.merge(&load_file(Path::new("b.pdf"))?, Some(PageRange::new(2, 3)))?;
/// let bytes = session.finalize()?;
/// std::fs::write("merged.pdf", bytes)?;
/// # Ok::<(), pdf_smart_merge::Error>(())
/// ```
#[derive(Debug)]
pub struct MergeSession {
    state: SessionState,
    merged: MergedGraph,
    producer: Option<String>,
}

impl Default for MergeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeSession {
    pub fn new() -> Self {
        MergeSession {
            state: SessionState::Empty,
            merged: MergedGraph::new(),
            producer: Some(PRODUCER.to_string()),
        }
    }

    /// Producer recorded in the output's information dictionary; `None` omits
    /// the dictionary altogether.
    pub fn with_producer(mut self, producer: Option<String>) -> Self {
        self.producer = producer;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn page_count(&self) -> usize {
        self.merged.page_count()
    }

    pub fn stats(&self) -> DedupStats {
        self.merged.stats()
    }

    /// Merge the pages of `graph` in `range` (whole document when `None`).
    /// Returns the number of pages added.
    pub fn merge(&mut self, graph: &ObjectGraph, range: Option<PageRange>) -> Result<usize> {
        self.require(&[SessionState::Empty, SessionState::Accumulating], "merge into")?;
        let added = self.merged.absorb(graph, range)?;
        self.state = SessionState::Accumulating;
        Ok(added)
    }

    /// Serialize the merged document. Allowed once.
    ///
    /// A serialization failure closes the session: the arena already holds
    /// the output page tree and cannot take further documents.
    pub fn finalize(&mut self) -> Result<Vec<u8>> {
        match self.state {
            SessionState::Empty => return Err(Error::NoDocuments),
            SessionState::Accumulating => {}
            state => {
                return Err(Error::InvalidState {
                    operation: "finalize",
                    state: state.as_str(),
                })
            }
        }

        let info = self.producer.as_ref().map(|producer| info_dictionary(producer));
        let bytes = match writer::serialize(&mut self.merged, info) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.close();
                return Err(e);
            }
        };
        self.state = SessionState::Finalized;
        info!(
            "Finalized merge: {} pages, {} bytes",
            self.merged.page_count(),
            bytes.len()
        );
        Ok(bytes)
    }

    /// Release the merged objects. Any further call fails.
    pub fn close(&mut self) {
        self.merged = MergedGraph::new();
        self.state = SessionState::Closed;
    }

    fn require(&self, allowed: &[SessionState], operation: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state.as_str(),
            })
        }
    }
}

fn info_dictionary(producer: &str) -> Dictionary {
    let mut info = Dictionary::new();
    info.set(
        "Producer",
        Object::String(producer.as_bytes().to_vec(), StringFormat::Literal),
    );
    let now = Local::now().format("D:%Y%m%d%H%M%S").to_string();
    info.set("CreationDate", Object::String(now.into_bytes(), StringFormat::Literal));
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::loader::load_bytes;
    use crate::pdf::graph::tests::nested_graph;

    #[test]
    fn test_session_lifecycle() {
        let graph = nested_graph();
        let mut session = MergeSession::new();
        assert_eq!(session.state(), SessionState::Empty);

        assert_eq!(session.merge(&graph, None).unwrap(), 3);
        assert_eq!(session.state(), SessionState::Accumulating);
        session.merge(&graph, Some(PageRange::new(2, 2))).unwrap();
        assert_eq!(session.page_count(), 4);

        let bytes = session.finalize().unwrap();
        assert_eq!(session.state(), SessionState::Finalized);

        let reloaded = load_bytes(&bytes, "merged").unwrap();
        assert_eq!(reloaded.page_count(), 4);

        session.close();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_merge_after_finalize_is_rejected() {
        let graph = nested_graph();
        let mut session = MergeSession::new();
        session.merge(&graph, None).unwrap();
        session.finalize().unwrap();

        let result = session.merge(&graph, None);
        assert!(matches!(
            result,
            Err(Error::InvalidState { operation: "merge into", state: "finalized" })
        ));
        assert!(matches!(session.finalize(), Err(Error::InvalidState { .. })));
    }

    #[test]
    fn test_finalize_without_documents() {
        let mut session = MergeSession::new();
        assert!(matches!(session.finalize(), Err(Error::NoDocuments)));
    }

    #[test]
    fn test_closed_session_rejects_everything() {
        let graph = nested_graph();
        let mut session = MergeSession::new();
        session.close();
        assert!(matches!(
            session.merge(&graph, None),
            Err(Error::InvalidState { state: "closed", .. })
        ));
        assert!(matches!(
            session.finalize(),
            Err(Error::InvalidState { state: "closed", .. })
        ));
    }

    #[test]
    fn test_failed_finalize_closes_session() {
        let graph = nested_graph();
        let mut session = MergeSession::new();
        session.merge(&graph, None).unwrap();

        let page = session.merged.pages()[0];
        session
            .merged
            .get_mut(page)
            .and_then(Object::as_dict_mut)
            .unwrap()
            .set("Annots", Object::Array(vec![Object::Reference((900, 0))]));

        assert!(matches!(session.finalize(), Err(Error::Serialization(_))));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.page_count(), 0);
        assert!(matches!(
            session.merge(&graph, None),
            Err(Error::InvalidState { operation: "merge into", state: "closed" })
        ));
    }

    #[test]
    fn test_failed_range_keeps_state() {
        let graph = nested_graph();
        let mut session = MergeSession::new();
        assert!(session.merge(&graph, Some(PageRange::new(2, 9))).is_err());
        assert_eq!(session.state(), SessionState::Empty);
    }

    #[test]
    fn test_without_producer_has_no_info() {
        let graph = nested_graph();
        let mut session = MergeSession::new().with_producer(None);
        session.merge(&graph, None).unwrap();
        let bytes = session.finalize().unwrap();
        assert!(load_bytes(&bytes, "merged").unwrap().info.is_none());
    }
}
