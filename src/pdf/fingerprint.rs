//! Content fingerprints for duplicate detection
//!
//! A fingerprint is a SHA-256 over a canonical encoding of an object in which
//! every reference is replaced by the fingerprint of its target. Two objects
//! therefore share a fingerprint when their whole reachable content matches,
//! independent of the object numbers each source file happened to use.

use std::collections::{HashMap, HashSet};
use std::fmt;
use sha2::{Digest, Sha256};

use super::graph::ObjectGraph;
use super::object::{Dictionary, Object, ObjectId, StringFormat};

/// Content-derived key of an indirect object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Fingerprint of a standalone object that holds no references.
    pub fn of_direct(object: &Object) -> Option<Fingerprint> {
        let mut hasher = Sha256::new();
        let mut deref = |_: &[u8], _: ObjectId| -> Option<Fingerprint> { None };
        encode(object, &mut hasher, &mut deref)?;
        Some(finish(hasher))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Dictionary entries that point back up a hierarchy (page tree, annotation
/// owner, form field tree). They are left out of the hash; equality checks on
/// the re-linked object still see them.
fn is_back_link(key: &[u8], value: &Object) -> bool {
    key == b"Parent" || (key == b"P" && matches!(value, Object::Reference(_)))
}

/// Memoizing fingerprint calculator over one document.
pub struct Fingerprinter<'a> {
    graph: &'a ObjectGraph,
    memo: HashMap<ObjectId, Option<Fingerprint>>,
    in_progress: HashSet<ObjectId>,
}

impl<'a> Fingerprinter<'a> {
    pub fn new(graph: &'a ObjectGraph) -> Self {
        Fingerprinter {
            graph,
            memo: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    /// Fingerprint of object `id`.
    ///
    /// `None` when the object is part of a reference cycle (not counting back
    /// links) or refers to page-tree nodes; such objects are never shared.
    pub fn fingerprint(&mut self, id: ObjectId) -> Option<Fingerprint> {
        if let Some(known) = self.memo.get(&id) {
            return *known;
        }
        if !self.in_progress.insert(id) {
            return None;
        }

        let graph = self.graph;
        let result = match graph.get(id) {
            Some(object) if !graph.is_page_tree_node(id) => {
                let mut hasher = Sha256::new();
                let mut deref = |_: &[u8], target: ObjectId| {
                    if graph.is_page_tree_node(target) {
                        None
                    } else {
                        self.fingerprint(target)
                    }
                };
                encode(object, &mut hasher, &mut deref).map(|()| finish(hasher))
            }
            _ => None,
        };

        self.in_progress.remove(&id);
        self.memo.insert(id, result);
        result
    }
}

fn finish(hasher: Sha256) -> Fingerprint {
    let digest = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    Fingerprint(bytes)
}

/// Feed the canonical encoding of `object` to `hasher`.
///
/// Every variable-length part is length-prefixed so that distinct objects can
/// never produce the same byte sequence.
fn encode<F>(object: &Object, hasher: &mut Sha256, deref: &mut F) -> Option<()>
where
    F: FnMut(&[u8], ObjectId) -> Option<Fingerprint>,
{
    encode_value(b"", object, hasher, deref)
}

fn encode_value<F>(key: &[u8], object: &Object, hasher: &mut Sha256, deref: &mut F) -> Option<()>
where
    F: FnMut(&[u8], ObjectId) -> Option<Fingerprint>,
{
    match object {
        Object::Null => hasher.update(b"n"),
        Object::Boolean(value) => hasher.update(if *value { b"t" } else { b"f" }),
        Object::Integer(value) => {
            hasher.update(b"i");
            hasher.update(value.to_be_bytes());
        }
        Object::Real(value) => {
            hasher.update(b"r");
            hasher.update(value.to_bits().to_be_bytes());
        }
        Object::Name(name) => encode_bytes(b"/", name, hasher),
        Object::String(bytes, format) => {
            let tag: &[u8] = match format {
                StringFormat::Literal => b"(",
                StringFormat::Hexadecimal => b"<",
            };
            encode_bytes(tag, bytes, hasher);
        }
        Object::Array(items) => {
            hasher.update(b"[");
            hasher.update((items.len() as u64).to_be_bytes());
            for item in items {
                encode_value(key, item, hasher, deref)?;
            }
        }
        Object::Dictionary(dict) => encode_dict(dict, hasher, deref)?,
        Object::Stream(stream) => {
            hasher.update(b"s");
            encode_dict(&stream.dict, hasher, deref)?;
            encode_bytes(b"c", &stream.content, hasher);
        }
        Object::Reference(id) => {
            let target = deref(key, *id)?;
            hasher.update(b"R");
            hasher.update(target.as_bytes());
        }
    }
    Some(())
}

fn encode_dict<F>(dict: &Dictionary, hasher: &mut Sha256, deref: &mut F) -> Option<()>
where
    F: FnMut(&[u8], ObjectId) -> Option<Fingerprint>,
{
    let entries: Vec<_> = dict.iter().filter(|(key, value)| !is_back_link(key, value)).collect();
    hasher.update(b"<<");
    hasher.update((entries.len() as u64).to_be_bytes());
    for (key, value) in entries {
        encode_bytes(b"k", key, hasher);
        encode_value(key, value, hasher, deref)?;
    }
    Some(())
}

fn encode_bytes(tag: &[u8], bytes: &[u8], hasher: &mut Sha256) {
    hasher.update(tag);
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}
