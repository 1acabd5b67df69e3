//! Content deduplication across merged documents
//!
//! [`MergedGraph`] is an arena: object `n` of the output lives in slot `n - 1`
//! and every reference inside the arena is `(n, 0)`. Each input document is
//! folded in with [`MergedGraph::absorb`], which copies the objects reachable
//! from the selected pages and reuses arena objects whose content is already
//! present.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use log::{debug, info};

use crate::error::{Error, Result};
use super::fingerprint::{Fingerprint, Fingerprinter};
use super::graph::ObjectGraph;
use super::object::{Object, ObjectId};

/// Inclusive, 1-based page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub first: usize,
    pub last: usize,
}

impl PageRange {
    pub fn new(first: usize, last: usize) -> Self {
        PageRange { first, last }
    }

    /// Zero-based indices of the selected pages, checked against `graph`.
    fn indices(&self, graph: &ObjectGraph) -> Result<std::ops::Range<usize>> {
        let page_count = graph.page_count();
        if self.first == 0 || self.first > self.last || self.last > page_count {
            return Err(Error::PageRange {
                input: graph.source.clone(),
                first: self.first,
                last: self.last,
                page_count,
            });
        }
        Ok(self.first - 1..self.last)
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first, self.last)
    }
}

/// Parses `"N"` or `"FIRST-LAST"`.
impl FromStr for PageRange {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| format!("Invalid page number: {}", part))
        };
        match s.split_once('-') {
            Some((first, last)) => Ok(PageRange::new(parse(first)?, parse(last)?)),
            None => {
                let page = parse(s)?;
                Ok(PageRange::new(page, page))
            }
        }
    }
}

/// Counters describing what absorbing documents did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    pub documents: usize,
    /// Objects copied into the arena
    pub copied: usize,
    /// Objects replaced by an existing arena object
    pub reused: usize,
}

/// Union of the deduplicated objects of all absorbed documents.
#[derive(Debug, Default)]
pub struct MergedGraph {
    slots: Vec<Option<Object>>,
    pages: Vec<u32>,
    index: HashMap<Fingerprint, Vec<u32>>,
    version: Option<(u8, u8)>,
    stats: DedupStats,
}

/// Where an object of the document being absorbed ends up.
#[derive(Debug, Clone, Copy)]
enum Target {
    /// Copied into this (still empty) arena slot
    Fresh(u32),
    /// Replaced by an existing arena object
    Shared(u32),
}

impl Target {
    fn number(self) -> u32 {
        match self {
            Target::Fresh(n) | Target::Shared(n) => n,
        }
    }
}

impl MergedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arena object numbers of the merged pages, in merge order.
    pub fn pages(&self) -> &[u32] {
        &self.pages
    }

    #[cfg(test)]
    pub(crate) fn pages_mut(&mut self) -> &mut Vec<u32> {
        &mut self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn object_count(&self) -> usize {
        self.slots.len()
    }

    pub fn stats(&self) -> DedupStats {
        self.stats
    }

    /// Highest header version seen among the absorbed documents.
    pub fn version(&self) -> Option<(u8, u8)> {
        self.version
    }

    pub fn get(&self, number: u32) -> Option<&Object> {
        let index = usize::try_from(number).ok()?.checked_sub(1)?;
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, number: u32) -> Option<&mut Object> {
        let index = usize::try_from(number).ok()?.checked_sub(1)?;
        self.slots.get_mut(index)?.as_mut()
    }

    /// Iterate over `(number, object)` for every filled slot.
    pub fn objects(&self) -> impl Iterator<Item = (u32, &Object)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|object| (i as u32 + 1, object)))
    }

    /// Append `object` to the arena and return its number.
    pub fn push(&mut self, object: Object) -> u32 {
        self.slots.push(Some(object));
        self.slots.len() as u32
    }

    fn reserve(&mut self) -> u32 {
        self.slots.push(None);
        self.slots.len() as u32
    }

    /// Fold the pages of `graph` selected by `range` (all pages when `None`)
    /// into the arena. Returns the number of pages added.
    ///
    /// Nothing is modified when the range is rejected.
    pub fn absorb(&mut self, graph: &ObjectGraph, range: Option<PageRange>) -> Result<usize> {
        let selected: &[ObjectId] = match range {
            Some(range) => &graph.pages()[range.indices(graph)?],
            None => graph.pages(),
        };
        if selected.is_empty() {
            return Err(Error::EmptyPdf(graph.source.clone()));
        }

        let mut targets: HashMap<ObjectId, Target> = HashMap::new();
        let mut page_numbers = Vec::with_capacity(selected.len());
        for &page in selected {
            let number = self.reserve();
            targets.insert(page, Target::Fresh(number));
            page_numbers.push(number);
        }

        let order = reachable_post_order(graph, selected);
        let mut fingerprinter = Fingerprinter::new(graph);
        let mut pending = Vec::new();
        let mut copied = 0;
        let mut reused = 0;
        for &id in &order {
            let Some(object) = graph.get(id) else { continue };
            let relinked = relink(graph, object, &targets);
            let fingerprint = fingerprinter.fingerprint(id);

            if let (Some(fingerprint), Some(relinked)) = (fingerprint, relinked.as_ref()) {
                if let Some(existing) = self.find_shared(fingerprint, relinked) {
                    debug!(
                        "{}: object {} {} shares arena object {}",
                        graph.source, id.0, id.1, existing
                    );
                    targets.insert(id, Target::Shared(existing));
                    reused += 1;
                    continue;
                }
            }

            let number = self.reserve();
            targets.insert(id, Target::Fresh(number));
            copied += 1;
            match relinked {
                Some(relinked) => self.fill(number, relinked, fingerprint),
                // Part of a cycle: its references are resolved once every target is known.
                None => pending.push((id, number, fingerprint)),
            }
        }

        for (id, number, fingerprint) in pending {
            let relinked = graph
                .get(id)
                .and_then(|object| relink(graph, object, &targets))
                .ok_or_else(|| {
                    Error::Serialization(format!(
                        "{}: object {} {} has unmapped references",
                        graph.source, id.0, id.1
                    ))
                })?;
            self.fill(number, relinked, fingerprint);
        }
        for (&page, &number) in selected.iter().zip(&page_numbers) {
            let page_dict = graph.materialized_page(page).ok_or_else(|| {
                Error::parse(
                    &graph.source,
                    format!("page {} {} is not a dictionary", page.0, page.1),
                )
            })?;
            let relinked =
                relink(graph, &Object::Dictionary(page_dict), &targets).ok_or_else(|| {
                    Error::Serialization(format!(
                        "{}: page {} {} has unmapped references",
                        graph.source, page.0, page.1
                    ))
                })?;
            self.fill(number, relinked, None);
        }

        self.pages.extend_from_slice(&page_numbers);
        if let Some(version) = parse_version(&graph.version) {
            self.version = Some(self.version.map_or(version, |current| current.max(version)));
        }
        self.stats.documents += 1;
        self.stats.copied += copied + page_numbers.len();
        self.stats.reused += reused;

        info!(
            "Merged {}: {} pages, {} objects copied, {} reused",
            graph.source,
            page_numbers.len(),
            copied,
            reused
        );
        Ok(page_numbers.len())
    }

    /// Existing arena object interchangeable with `relinked`, if any.
    ///
    /// A fingerprint match is only a candidate: the object re-linked into arena
    /// numbering must equal the stored object exactly.
    fn find_shared(&self, fingerprint: Fingerprint, relinked: &Object) -> Option<u32> {
        self.index
            .get(&fingerprint)?
            .iter()
            .copied()
            .find(|&number| self.get(number) == Some(relinked))
    }

    fn fill(&mut self, number: u32, object: Object, fingerprint: Option<Fingerprint>) {
        if let Some(fingerprint) = fingerprint {
            self.index.entry(fingerprint).or_default().push(number);
        }
        self.slots[number as usize - 1] = Some(object);
    }
}

/// `object` with references rewritten to arena numbers.
///
/// Links to page-tree nodes that are not merged pages become null. Returns
/// `None` when some other reference has no target yet.
fn relink(
    graph: &ObjectGraph,
    object: &Object,
    targets: &HashMap<ObjectId, Target>,
) -> Option<Object> {
    object.try_map_references(&mut |_, id| match targets.get(&id) {
        Some(target) => Some(Object::Reference((target.number(), 0))),
        None if graph.is_page_tree_node(id) || id == graph.root => Some(Object::Null),
        None => None,
    })
}

/// Objects reachable from the selected pages, children before parents.
///
/// Page-tree nodes and the catalog are not entered; the walk starts from the
/// materialized page dictionaries so inherited resources are included.
fn reachable_post_order(graph: &ObjectGraph, pages: &[ObjectId]) -> Vec<ObjectId> {
    let mut order = Vec::new();
    let mut visited: HashSet<ObjectId> = HashSet::new();

    let children = |object: &Object| {
        let mut ids = Vec::new();
        object.for_each_reference(&mut |_, id| {
            if !graph.is_page_tree_node(id) && id != graph.root {
                ids.push(id);
            }
        });
        ids
    };

    for &page in pages {
        let Some(dict) = graph.materialized_page(page) else { continue };
        // Iterative DFS: (object, its children, next child index).
        let mut stack: Vec<(Option<ObjectId>, Vec<ObjectId>, usize)> =
            vec![(None, children(&Object::Dictionary(dict)), 0)];
        while let Some((owner, kids, next)) = stack.last_mut() {
            if let Some(&child) = kids.get(*next) {
                *next += 1;
                if visited.insert(child) {
                    let grandchildren = graph.get(child).map(&children).unwrap_or_default();
                    stack.push((Some(child), grandchildren, 0));
                }
            } else {
                if let Some(id) = *owner {
                    order.push(id);
                }
                stack.pop();
            }
        }
    }

    order
}

/// Parse a header version such as "1.7".
fn parse_version(version: &str) -> Option<(u8, u8)> {
    let (major, minor) = version.trim().split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}
