//! Document inspection report
//!
//! Walks one document and describes what a merge would be working with:
//! information dictionary, pages with their metadata, annotations, content
//! streams and images, and optionally the full object table.

use std::fmt;
use std::io::Read;
use std::path::Path;
use flate2::read::ZlibDecoder;
use log::debug;

use crate::error::Result;
use crate::text::display_value;
use super::graph::{ObjectGraph, XrefLayout};
use super::loader::load_file;
use super::object::{Dictionary, Object, ObjectId, Stream};

/// What to include in an inspection report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InspectOptions {
    /// Dump the (decoded) content of every page content stream
    pub print_streams: bool,
    /// List every indirect object with its type and subtype
    pub list_objects: bool,
}

impl Default for InspectOptions {
    fn default() -> Self {
        InspectOptions {
            print_streams: false,
            list_objects: true,
        }
    }
}

/// Inspection result for one document
#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub source: String,
    pub version: String,
    pub layout: XrefLayout,
    /// Information dictionary entries in key order, values decoded for display
    pub info: Vec<(String, String)>,
    pub pages: Vec<PageReport>,
    /// `None` when the object table was not requested
    pub objects: Option<Vec<ObjectEntry>>,
}

#[derive(Debug, Clone, Default)]
pub struct PageReport {
    /// 1-based page number
    pub number: usize,
    /// Content of the page's `/Metadata` stream
    pub metadata: Option<String>,
    /// `/Subtype` of every annotation
    pub annotations: Vec<String>,
    pub contents: Vec<ContentReport>,
    pub images: Vec<ImageReport>,
}

impl PageReport {
    /// Image sizes sorted ascending, as `(resource name, bytes)`.
    pub fn image_sizes(&self) -> Vec<(&str, usize)> {
        let mut sizes: Vec<_> = self
            .images
            .iter()
            .map(|image| (image.name.as_str(), image.size))
            .collect();
        sizes.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(b.0)));
        sizes
    }

    /// Combined in-PDF size of the page's images.
    pub fn total_image_size(&self) -> usize {
        self.images.iter().map(|image| image.size).sum()
    }
}

#[derive(Debug, Clone)]
pub struct ContentReport {
    pub id: Option<ObjectId>,
    /// Stored (encoded) length
    pub length: usize,
    pub filters: Vec<String>,
    /// Decoded text, present only when streams were requested
    pub text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImageReport {
    /// Resource name under `/XObject`
    pub name: String,
    pub id: Option<ObjectId>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub filters: Vec<String>,
    /// Stored (encoded) length
    pub size: usize,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub id: ObjectId,
    pub type_name: Option<String>,
    pub subtype: Option<String>,
}

/// Load and inspect a PDF file.
pub fn inspect_file(path: &Path, options: &InspectOptions) -> Result<DocumentReport> {
    let graph = load_file(path)?;
    Ok(inspect(&graph, options))
}

/// Inspect a loaded document.
pub fn inspect(graph: &ObjectGraph, options: &InspectOptions) -> DocumentReport {
    let pages = graph
        .pages()
        .iter()
        .enumerate()
        .map(|(index, &page)| inspect_page(graph, index + 1, page, options))
        .collect();

    DocumentReport {
        source: graph.source.clone(),
        version: graph.version.clone(),
        layout: graph.layout,
        info: info_entries(graph),
        pages,
        objects: options.list_objects.then(|| object_table(graph)),
    }
}

/// Content of a stream with its filters undone.
///
/// Only unfiltered and `FlateDecode` streams can be decoded; anything else
/// yields `None`.
pub fn decode_stream(stream: &Stream) -> Option<Vec<u8>> {
    match stream.filters().as_slice() {
        [] => Some(stream.content.clone()),
        [filter] if filter == "FlateDecode" => {
            let mut decoded = Vec::new();
            match ZlibDecoder::new(stream.content.as_slice()).read_to_end(&mut decoded) {
                Ok(_) => Some(decoded),
                Err(e) => {
                    debug!("Flate decoding failed: {}", e);
                    None
                }
            }
        }
        _ => None,
    }
}

fn info_entries(graph: &ObjectGraph) -> Vec<(String, String)> {
    let Some(info) = graph.info.and_then(|id| graph.get_dict(id)) else {
        return Vec::new();
    };
    info.iter()
        .filter_map(|(key, value)| {
            let key = String::from_utf8_lossy(key).into_owned();
            let value = match graph.resolve(value) {
                Object::String(bytes, _) => display_value(&key, bytes),
                Object::Name(name) => String::from_utf8_lossy(name).into_owned(),
                Object::Integer(n) => n.to_string(),
                Object::Real(n) => n.to_string(),
                Object::Boolean(b) => b.to_string(),
                _ => return None,
            };
            Some((key, value))
        })
        .collect()
}

fn inspect_page(
    graph: &ObjectGraph,
    number: usize,
    page: ObjectId,
    options: &InspectOptions,
) -> PageReport {
    let Some(dict) = graph.materialized_page(page) else {
        return PageReport { number, ..PageReport::default() };
    };

    let annotations = graph
        .resolve_key(&dict, b"Annots")
        .and_then(Object::as_array)
        .unwrap_or_default()
        .iter()
        .filter_map(|annot| graph.resolve(annot).as_dict())
        .map(|annot| annot.subtype_name().unwrap_or("(no subtype)").to_string())
        .collect();

    PageReport {
        number,
        metadata: metadata_text(graph, &dict),
        annotations,
        contents: content_streams(graph, &dict, options.print_streams),
        images: images(graph, &dict),
    }
}

fn metadata_text(graph: &ObjectGraph, dict: &Dictionary) -> Option<String> {
    let stream = graph.resolve_key(dict, b"Metadata")?.as_stream()?;
    let bytes = decode_stream(stream)?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn content_streams(graph: &ObjectGraph, page: &Dictionary, print: bool) -> Vec<ContentReport> {
    let entries: Vec<&Object> = match page.get(b"Contents") {
        Some(Object::Array(items)) => items.iter().collect(),
        Some(reference @ Object::Reference(_)) => match graph.resolve(reference) {
            Object::Array(items) => items.iter().collect(),
            _ => vec![reference],
        },
        Some(other) => vec![other],
        None => Vec::new(),
    };

    entries
        .into_iter()
        .filter_map(|entry| {
            let stream = graph.resolve(entry).as_stream()?;
            let text = if print {
                Some(match decode_stream(stream) {
                    Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                    None => format!("(cannot decode {})", stream.filters().join(" ")),
                })
            } else {
                None
            };
            Some(ContentReport {
                id: entry.as_reference(),
                length: stream.content.len(),
                filters: stream.filters(),
                text,
            })
        })
        .collect()
}

fn images(graph: &ObjectGraph, page: &Dictionary) -> Vec<ImageReport> {
    let Some(xobjects) = graph
        .resolve_key(page, b"Resources")
        .and_then(Object::as_dict)
        .and_then(|resources| graph.resolve_key(resources, b"XObject"))
        .and_then(Object::as_dict)
    else {
        return Vec::new();
    };

    xobjects
        .iter()
        .filter_map(|(name, entry)| {
            let stream = graph.resolve(entry).as_stream()?;
            if stream.dict.subtype_name() != Some("Image") {
                return None;
            }
            let integer =
                |key: &[u8]| graph.resolve_key(&stream.dict, key).and_then(Object::as_i64);
            Some(ImageReport {
                name: String::from_utf8_lossy(name).into_owned(),
                id: entry.as_reference(),
                width: integer(b"Width"),
                height: integer(b"Height"),
                filters: stream.filters(),
                size: stream.content.len(),
                metadata: metadata_text(graph, &stream.dict),
            })
        })
        .collect()
}

fn object_table(graph: &ObjectGraph) -> Vec<ObjectEntry> {
    graph
        .objects()
        .map(|(id, object)| {
            let dict = object.as_dict();
            ObjectEntry {
                id,
                type_name: dict.and_then(Dictionary::type_name).map(str::to_string),
                subtype: dict.and_then(Dictionary::subtype_name).map(str::to_string),
            }
        })
        .collect()
}

fn reference(id: Option<ObjectId>) -> String {
    match id {
        Some((number, generation)) => format!("{} {} R", number, generation),
        None => "direct".to_string(),
    }
}

fn filter_suffix(filters: &[String]) -> String {
    if filters.is_empty() {
        String::new()
    } else {
        format!(" [{}]", filters.join(" "))
    }
}

impl fmt::Display for DocumentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File: {}", self.source)?;
        writeln!(f, "PDF version: {} ({})", self.version, self.layout)?;

        if self.info.is_empty() {
            writeln!(f, "Document information: (none)")?;
        } else {
            writeln!(f, "Document information:")?;
            for (key, value) in &self.info {
                writeln!(f, "  {}: {}", key, value)?;
            }
        }

        writeln!(f, "Number of pages: {}", self.pages.len())?;
        for page in &self.pages {
            write!(f, "{}", page)?;
        }

        if let Some(objects) = &self.objects {
            writeln!(f, "Objects: {}", objects.len())?;
            for entry in objects {
                writeln!(f, "  {}", entry)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for PageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Page {}:", self.number)?;
        match &self.metadata {
            Some(metadata) => writeln!(f, "  Metadata:\n{}", metadata.trim_end())?,
            None => writeln!(f, "  Metadata: (none)")?,
        }
        if self.annotations.is_empty() {
            writeln!(f, "  Annotations: (none)")?;
        } else {
            writeln!(f, "  Annotations: {}", self.annotations.join(", "))?;
        }

        for content in &self.contents {
            writeln!(
                f,
                "  Content stream {}: {} bytes{}",
                reference(content.id),
                content.length,
                filter_suffix(&content.filters)
            )?;
            if let Some(text) = &content.text {
                for line in text.lines() {
                    writeln!(f, "    {}", line)?;
                }
            }
        }

        for image in &self.images {
            let dimensions = match (image.width, image.height) {
                (Some(width), Some(height)) => format!("{}x{}", width, height),
                _ => "unknown size".to_string(),
            };
            writeln!(
                f,
                "  Image /{} ({}): {}, {} bytes{}",
                image.name,
                reference(image.id),
                dimensions,
                image.size,
                filter_suffix(&image.filters)
            )?;
            if let Some(metadata) = &image.metadata {
                writeln!(f, "    Metadata:\n{}", metadata.trim_end())?;
            }
        }

        if !self.images.is_empty() {
            writeln!(f, "  Image sizes:")?;
            for (name, size) in self.image_sizes() {
                writeln!(f, "    /{}: {}", name, size)?;
            }
            writeln!(f, "    Total size in PDF: {}", self.total_image_size())?;
        }
        Ok(())
    }
}

impl fmt::Display for ObjectEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "COS object {} ({}) type {} subtype {}",
            self.id.0,
            self.id.1,
            self.type_name.as_deref().unwrap_or("(no type)"),
            self.subtype.as_deref().unwrap_or("(no subtype)")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use crate::pdf::graph::tests::{layout, nested_graph};
    use crate::pdf::object::{IndirectObject, StringFormat};

    fn image(size: usize) -> Object {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::name("XObject"));
        dict.set("Subtype", Object::name("Image"));
        dict.set("Width", Object::Integer(size as i64));
        dict.set("Height", Object::Integer(1));
        Object::Stream(Stream::new(dict, vec![0x7f; size]))
    }

    /// One page with a compressed content stream, two images, a link and an info dictionary.
    fn illustrated_graph() -> ObjectGraph {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"BT /F1 12 Tf (Hello) Tj ET").unwrap();
        let mut content_dict = Dictionary::new();
        content_dict.set("Filter", Object::name("FlateDecode"));
        let content = Stream::new(content_dict, encoder.finish().unwrap());

        let mut xobjects = Dictionary::new();
        xobjects.set("Big", Object::Reference((6, 0)));
        xobjects.set("Small", Object::Reference((7, 0)));
        let mut resources = Dictionary::new();
        resources.set("XObject", xobjects);

        let mut link = Dictionary::new();
        link.set("Type", Object::name("Annot"));
        link.set("Subtype", Object::name("Link"));

        let mut page = Dictionary::new();
        page.set("Type", Object::name("Page"));
        page.set("Parent", Object::Reference((2, 0)));
        page.set("Contents", Object::Reference((4, 0)));
        page.set("Resources", resources);
        page.set("Annots", Object::Array(vec![link.into()]));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::name("Catalog"));
        catalog.set("Pages", Object::Reference((2, 0)));
        let mut pages = Dictionary::new();
        pages.set("Type", Object::name("Pages"));
        pages.set("Kids", Object::Array(vec![Object::Reference((3, 0))]));
        let mut info = Dictionary::new();
        info.set("Title", Object::String(b"Inspected".to_vec(), StringFormat::Literal));
        info.set(
            "CreationDate",
            Object::String(b"D:20240101000000Z".to_vec(), StringFormat::Literal),
        );

        let objects = vec![
            IndirectObject { id: (1, 0), object: catalog.into() },
            IndirectObject { id: (2, 0), object: pages.into() },
            IndirectObject { id: (3, 0), object: page.into() },
            IndirectObject { id: (4, 0), object: Object::Stream(content) },
            IndirectObject { id: (5, 0), object: info.into() },
            IndirectObject { id: (6, 0), object: image(40) },
            IndirectObject { id: (7, 0), object: image(8) },
        ];
        ObjectGraph::new("illustrated", "1.5", (1, 0), Some((5, 0)), layout(), objects).unwrap()
    }

    #[test]
    fn test_page_details() {
        let options = InspectOptions {
            print_streams: true,
            list_objects: false,
        };
        let report = inspect(&illustrated_graph(), &options);
        assert_eq!(report.pages.len(), 1);

        let page = &report.pages[0];
        assert_eq!(page.annotations, vec!["Link".to_string()]);
        assert_eq!(page.contents.len(), 1);
        assert_eq!(page.contents[0].filters, vec!["FlateDecode".to_string()]);
        assert_eq!(page.contents[0].text.as_deref(), Some("BT /F1 12 Tf (Hello) Tj ET"));
        assert_eq!(page.images.len(), 2);
        assert!(report.objects.is_none());
    }

    #[test]
    fn test_image_sizes_sorted_ascending() {
        let report = inspect(&illustrated_graph(), &InspectOptions::default());
        let page = &report.pages[0];
        assert_eq!(page.image_sizes(), vec![("Small", 8), ("Big", 40)]);
        assert_eq!(page.total_image_size(), 48);

        let text = report.to_string();
        let small = text.find("    /Small: 8").unwrap();
        let big = text.find("    /Big: 40").unwrap();
        assert!(small < big);
        assert!(text.contains("Total size in PDF: 48"));
    }

    #[test]
    fn test_info_entries_are_decoded() {
        let report = inspect(&illustrated_graph(), &InspectOptions::default());
        assert!(report.info.contains(&("Title".to_string(), "Inspected".to_string())));
        assert!(report
            .info
            .contains(&("CreationDate".to_string(), "Mon, 1 Jan 2024 00:00:00 +0000".to_string())));
    }

    #[test]
    fn test_object_table() {
        let report = inspect(&nested_graph(), &InspectOptions::default());
        let objects = report.objects.as_ref().unwrap();
        assert_eq!(objects.len(), 8);
        assert_eq!(objects[0].to_string(), "COS object 1 (0) type Catalog subtype (no subtype)");
        assert_eq!(objects[6].to_string(), "COS object 7 (0) type (no type) subtype (no subtype)");
    }

    #[test]
    fn test_streams_hidden_by_default() {
        let report = inspect(&illustrated_graph(), &InspectOptions::default());
        assert!(report.pages[0].contents[0].text.is_none());
        assert!(!report.to_string().contains("Hello"));
    }

    #[test]
    fn test_undecodable_stream() {
        let mut dict = Dictionary::new();
        dict.set("Filter", Object::name("DCTDecode"));
        assert_eq!(decode_stream(&Stream::new(dict, vec![1, 2, 3])), None);
        assert_eq!(decode_stream(&Stream::new(Dictionary::new(), vec![1, 2])), Some(vec![1, 2]));
    }
}
