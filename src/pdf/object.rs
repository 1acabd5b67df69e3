//! In-memory PDF object model
//!
//! Every indirect object of a loaded document is held as an [`Object`], a tagged
//! union over the PDF object kinds. Consumers (fingerprinting, rewriting,
//! serialization) match exhaustively so that no kind is silently dropped.

use std::collections::BTreeMap;

/// Object identifier: object number and generation number.
pub type ObjectId = (u32, u16);

/// How a string object was written in the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringFormat {
    #[default]
    Literal,
    Hexadecimal,
}

/// Dictionary with keys kept in sorted order.
///
/// Key order carries no meaning in PDF, so a sorted map gives every consumer
/// the same canonical iteration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dictionary(BTreeMap<Vec<u8>, Object>);

/// Stream object: attribute dictionary plus raw (still encoded) content.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub dict: Dictionary,
    pub content: Vec<u8>,
}

/// PDF object kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Name(Vec<u8>),
    String(Vec<u8>, StringFormat),
    Array(Vec<Object>),
    Dictionary(Dictionary),
    Stream(Stream),
    Reference(ObjectId),
}

/// An object together with its identity in the owning graph.
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObject {
    pub id: ObjectId,
    pub object: Object,
}

impl Object {
    /// Short tag naming the object kind, used in serialization errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::Name(_) => "Name",
            Object::String(..) => "String",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream(_) => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    pub fn name(name: &str) -> Self {
        Object::Name(name.as_bytes().to_vec())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Object::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&[u8]> {
        match self {
            Object::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Object::Reference(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Object]> {
        match self {
            Object::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Dictionary of a dictionary or stream object.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(dict) => Some(dict),
            Object::Stream(stream) => Some(&stream.dict),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dictionary(dict) => Some(dict),
            Object::Stream(stream) => Some(&mut stream.dict),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Object::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    /// Visit every reference contained in this object, depth first.
    pub fn for_each_reference<F: FnMut(&[u8], ObjectId)>(&self, f: &mut F) {
        self.visit_references(b"", f);
    }

    fn visit_references<F: FnMut(&[u8], ObjectId)>(&self, key: &[u8], f: &mut F) {
        match self {
            Object::Reference(id) => f(key, *id),
            Object::Array(items) => {
                for item in items {
                    item.visit_references(key, f);
                }
            }
            Object::Dictionary(dict) => dict.visit_references(f),
            Object::Stream(stream) => stream.dict.visit_references(f),
            Object::Null
            | Object::Boolean(_)
            | Object::Integer(_)
            | Object::Real(_)
            | Object::Name(_)
            | Object::String(..) => {}
        }
    }

    /// Rebuild this object with every reference passed through `map`.
    ///
    /// `map` returns the replacement for a reference (usually another
    /// reference, or `Object::Null` for links that must be cut). The dictionary
    /// key under which the reference was found is passed along. Returns `None`
    /// as soon as `map` does.
    pub fn try_map_references<F>(&self, map: &mut F) -> Option<Object>
    where
        F: FnMut(&[u8], ObjectId) -> Option<Object>,
    {
        self.map_with_key(b"", map)
    }

    fn map_with_key<F>(&self, key: &[u8], map: &mut F) -> Option<Object>
    where
        F: FnMut(&[u8], ObjectId) -> Option<Object>,
    {
        Some(match self {
            Object::Reference(id) => map(key, *id)?,
            Object::Array(items) => Object::Array(
                items
                    .iter()
                    .map(|item| item.map_with_key(key, map))
                    .collect::<Option<Vec<_>>>()?,
            ),
            Object::Dictionary(dict) => Object::Dictionary(dict.try_map_references(map)?),
            Object::Stream(stream) => Object::Stream(Stream {
                dict: stream.dict.try_map_references(map)?,
                content: stream.content.clone(),
            }),
            Object::Null
            | Object::Boolean(_)
            | Object::Integer(_)
            | Object::Real(_)
            | Object::Name(_)
            | Object::String(..) => self.clone(),
        })
    }
}

impl From<Dictionary> for Object {
    fn from(dict: Dictionary) -> Self {
        Object::Dictionary(dict)
    }
}

impl From<ObjectId> for Object {
    fn from(id: ObjectId) -> Self {
        Object::Reference(id)
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Object::Integer(value)
    }
}

impl Dictionary {
    pub fn new() -> Self {
        Dictionary(BTreeMap::new())
    }

    pub fn get(&self, key: &[u8]) -> Option<&Object> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Object> {
        self.0.get_mut(key)
    }

    pub fn has(&self, key: &[u8]) -> bool {
        self.0.contains_key(key)
    }

    pub fn set<K: Into<Vec<u8>>, V: Into<Object>>(&mut self, key: K, value: V) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Object> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Object)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Vec<u8>, &mut Object)> {
        self.0.iter_mut()
    }

    /// Value of `/Type` as UTF-8, if it is a name.
    pub fn type_name(&self) -> Option<&str> {
        self.name_value(b"Type")
    }

    /// Value of `/Subtype` as UTF-8, if it is a name.
    pub fn subtype_name(&self) -> Option<&str> {
        self.name_value(b"Subtype")
    }

    fn name_value(&self, key: &[u8]) -> Option<&str> {
        self.get(key)
            .and_then(Object::as_name)
            .and_then(|name| std::str::from_utf8(name).ok())
    }

    pub fn type_is(&self, type_name: &[u8]) -> bool {
        self.get(b"Type").and_then(Object::as_name) == Some(type_name)
    }

    fn visit_references<F: FnMut(&[u8], ObjectId)>(&self, f: &mut F) {
        for (key, value) in &self.0 {
            value.visit_references(key, f);
        }
    }

    fn try_map_references<F>(&self, map: &mut F) -> Option<Dictionary>
    where
        F: FnMut(&[u8], ObjectId) -> Option<Object>,
    {
        let mut mapped = BTreeMap::new();
        for (key, value) in &self.0 {
            mapped.insert(key.clone(), value.map_with_key(key, map)?);
        }
        Some(Dictionary(mapped))
    }
}

impl<'a> IntoIterator for &'a Dictionary {
    type Item = (&'a Vec<u8>, &'a Object);
    type IntoIter = std::collections::btree_map::Iter<'a, Vec<u8>, Object>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<(Vec<u8>, Object)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (Vec<u8>, Object)>>(iter: I) -> Self {
        Dictionary(iter.into_iter().collect())
    }
}

impl Stream {
    pub fn new(dict: Dictionary, content: Vec<u8>) -> Self {
        let mut stream = Stream { dict, content };
        stream.dict.set("Length", stream.content.len() as i64);
        stream
    }

    /// Filter chain from `/Filter`, outermost first.
    pub fn filters(&self) -> Vec<String> {
        match self.dict.get(b"Filter") {
            Some(Object::Name(name)) => vec![String::from_utf8_lossy(name).into_owned()],
            Some(Object::Array(items)) => items
                .iter()
                .filter_map(Object::as_name)
                .map(|name| String::from_utf8_lossy(name).into_owned())
                .collect(),
            _ => Vec::new(),
        }
    }
}
