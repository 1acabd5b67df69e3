//! Per-document object graph

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use log::warn;

use crate::error::{Error, Result};
use super::object::{Dictionary, IndirectObject, Object, ObjectId};

/// Page attributes a page inherits from its ancestors in the page tree.
pub const INHERITABLE_PAGE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// How the cross-reference information of the source file was laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefFormat {
    /// Classic `xref` table
    Table,
    /// Cross-reference stream (PDF 1.5+)
    Stream,
    /// `startxref` missing or pointing at something else
    Unrecognized,
}

/// Cross-reference layout of a loaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XrefLayout {
    /// Format of the last (most recent) cross-reference section
    pub format: XrefFormat,
    /// The file starts with a linearization dictionary
    pub linearized: bool,
    /// Number of revisions (`%%EOF` markers); more than one means incremental updates
    pub revisions: usize,
}

impl fmt::Display for XrefFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XrefFormat::Table => write!(f, "table"),
            XrefFormat::Stream => write!(f, "stream"),
            XrefFormat::Unrecognized => write!(f, "unrecognized"),
        }
    }
}

impl fmt::Display for XrefLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} xref", self.format)?;
        if self.linearized {
            write!(f, ", linearized")?;
        }
        if self.revisions > 1 {
            write!(f, ", {} revisions", self.revisions)?;
        }
        Ok(())
    }
}

/// All indirect objects of one document plus its entry points
#[derive(Debug, Clone)]
pub struct ObjectGraph {
    /// Identity of the source, used in error messages
    pub source: String,
    /// Header version, e.g. "1.7"
    pub version: String,
    /// Document catalog
    pub root: ObjectId,
    /// Document information dictionary, if the trailer names one
    pub info: Option<ObjectId>,
    pub layout: XrefLayout,
    objects: BTreeMap<ObjectId, Object>,
    pages: Vec<ObjectId>,
    page_tree_nodes: HashSet<ObjectId>,
}

impl ObjectGraph {
    /// Build a graph from its objects, flattening the page tree under `root`.
    ///
    /// References to objects that are not part of `objects` are replaced by
    /// null, which is what a PDF reader makes of them anyway.
    pub fn new(
        source: impl Into<String>,
        version: impl Into<String>,
        root: ObjectId,
        info: Option<ObjectId>,
        layout: XrefLayout,
        objects: impl IntoIterator<Item = IndirectObject>,
    ) -> Result<Self> {
        let mut graph = ObjectGraph {
            source: source.into(),
            version: version.into(),
            root,
            info,
            layout,
            objects: objects.into_iter().map(|o| (o.id, o.object)).collect(),
            pages: Vec::new(),
            page_tree_nodes: HashSet::new(),
        };

        graph.cut_dangling_references();
        if graph.info.is_some_and(|id| !graph.objects.contains_key(&id)) {
            graph.info = None;
        }
        graph.flatten_page_tree()?;

        Ok(graph)
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    /// Dictionary of the object `id` (dictionary or stream).
    pub fn get_dict(&self, id: ObjectId) -> Option<&Dictionary> {
        self.get(id).and_then(Object::as_dict)
    }

    /// Follow `object` through references until a direct object is reached.
    pub fn resolve<'a>(&'a self, mut object: &'a Object) -> &'a Object {
        let mut hops = 0;
        while let Object::Reference(id) = object {
            match self.objects.get(id) {
                Some(target) if hops < 32 => object = target,
                _ => return &Object::Null,
            }
            hops += 1;
        }
        object
    }

    /// Look up `key` in `dict` and resolve the value.
    pub fn resolve_key<'a>(&'a self, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
        match dict.get(key).map(|value| self.resolve(value)) {
            Some(Object::Null) | None => None,
            found => found,
        }
    }

    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.objects.iter().map(|(id, object)| (*id, object))
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Leaf page objects in document order.
    pub fn pages(&self) -> &[ObjectId] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// True for every node of the page tree, intermediate or leaf.
    pub fn is_page_tree_node(&self, id: ObjectId) -> bool {
        self.page_tree_nodes.contains(&id)
    }

    /// Page dictionary with inherited attributes filled in and `/Parent` removed.
    pub fn materialized_page(&self, page: ObjectId) -> Option<Dictionary> {
        let mut dict = self.get_dict(page)?.clone();
        dict.remove(b"Parent");

        let mut ancestor = self.get_dict(page).and_then(|d| d.get(b"Parent")?.as_reference());
        let mut hops = 0;
        while let Some(parent_id) = ancestor {
            let Some(parent) = self.get_dict(parent_id) else { break };
            for key in INHERITABLE_PAGE_KEYS {
                if !dict.has(key) {
                    if let Some(value) = parent.get(key) {
                        dict.set(key, value.clone());
                    }
                }
            }
            hops += 1;
            if hops > self.page_tree_nodes.len() {
                break;
            }
            ancestor = parent.get(b"Parent").and_then(Object::as_reference);
        }

        Some(dict)
    }

    fn cut_dangling_references(&mut self) {
        let known: HashSet<ObjectId> = self.objects.keys().copied().collect();
        let source = &self.source;
        for (id, object) in self.objects.iter_mut() {
            let mut dangling = false;
            object.for_each_reference(&mut |_, target| dangling |= !known.contains(&target));
            if !dangling {
                continue;
            }
            let cut = object.try_map_references(&mut |_, target| {
                Some(if known.contains(&target) {
                    Object::Reference(target)
                } else {
                    warn!(
                        "{}: object {} {} refers to missing object {} {}",
                        source, id.0, id.1, target.0, target.1
                    );
                    Object::Null
                })
            });
            if let Some(cut) = cut {
                *object = cut;
            }
        }
    }

    fn flatten_page_tree(&mut self) -> Result<()> {
        let catalog = self
            .get_dict(self.root)
            .ok_or_else(|| Error::parse(&self.source, "catalog is not a dictionary"))?;
        let pages_root = catalog
            .get(b"Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::parse(&self.source, "catalog has no page tree"))?;

        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![pages_root];
        while let Some(node_id) = stack.pop() {
            if !visited.insert(node_id) {
                return Err(Error::parse(
                    &self.source,
                    format!("page tree node {} {} is reachable twice", node_id.0, node_id.1),
                ));
            }
            let Some(node) = self.get_dict(node_id) else {
                warn!(
                    "{}: page tree node {} {} is not a dictionary",
                    self.source, node_id.0, node_id.1
                );
                continue;
            };

            match node.get(b"Kids").and_then(Object::as_array) {
                Some(kids) if !node.type_is(b"Page") => {
                    for kid in kids.iter().rev() {
                        match kid.as_reference() {
                            Some(kid_id) => stack.push(kid_id),
                            None => warn!("{}: ignoring direct object in /Kids", self.source),
                        }
                    }
                }
                _ => pages.push(node_id),
            }
        }

        self.page_tree_nodes = visited;
        self.pages = pages;
        Ok(())
    }
}
