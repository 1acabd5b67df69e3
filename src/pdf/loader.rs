//! Object model loader
//!
//! Tokenizing and cross-reference decoding are done by lopdf; this module
//! converts the decoded document into an [`ObjectGraph`] and records how the
//! source file was laid out.

use std::path::Path;
use log::{debug, info};

use crate::error::{Error, Result};
use super::graph::{ObjectGraph, XrefFormat, XrefLayout};
use super::object::{Dictionary, IndirectObject, Object, Stream, StringFormat};

/// Object types whose content lopdf has already expanded into ordinary objects.
const CONTAINER_TYPES: [&[u8]; 2] = [b"ObjStm", b"XRef"];

/// Load a PDF file into an object graph.
///
/// The file is read in one go and closed before parsing starts, so the
/// handle is released on every exit path.
pub fn load_file(path: &Path) -> Result<ObjectGraph> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    let bytes = std::fs::read(path)?;
    load_bytes(&bytes, path.display().to_string())
}

/// Parse raw PDF bytes into an object graph. `source` names the input in errors.
pub fn load_bytes(bytes: &[u8], source: impl Into<String>) -> Result<ObjectGraph> {
    let source = source.into();
    let layout = detect_layout(bytes);
    debug!("{}: {} bytes, {}", source, bytes.len(), layout);

    let doc = lopdf::Document::load_mem(bytes).map_err(|e| Error::parse(&source, e.to_string()))?;

    if doc.trailer.has(b"Encrypt") {
        return Err(Error::parse(&source, "unsupported encryption"));
    }

    let root = doc
        .trailer
        .get(b"Root")
        .ok()
        .and_then(|root| root.as_reference().ok())
        .ok_or_else(|| Error::parse(&source, "trailer has no /Root reference"))?;
    let info = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|info| info.as_reference().ok());

    let objects: Vec<IndirectObject> = doc
        .objects
        .iter()
        .filter(|(_, object)| !is_container(object))
        .map(|(&id, object)| IndirectObject { id, object: convert(object) })
        .collect();

    let graph = ObjectGraph::new(source, doc.version.clone(), root, info, layout, objects)?;
    if graph.page_count() == 0 {
        return Err(Error::EmptyPdf(graph.source));
    }

    info!(
        "Loaded {}: PDF {}, {} objects, {} pages",
        graph.source,
        graph.version,
        graph.object_count(),
        graph.page_count()
    );
    Ok(graph)
}

/// Object streams, cross-reference streams and linearization dictionaries.
fn is_container(object: &lopdf::Object) -> bool {
    match object {
        lopdf::Object::Stream(stream) => stream
            .dict
            .get(b"Type")
            .and_then(|t| t.as_name())
            .is_ok_and(|name| CONTAINER_TYPES.contains(&name)),
        lopdf::Object::Dictionary(dict) => dict.has(b"Linearized"),
        _ => false,
    }
}

fn convert(object: &lopdf::Object) -> Object {
    match object {
        lopdf::Object::Null => Object::Null,
        lopdf::Object::Boolean(value) => Object::Boolean(*value),
        lopdf::Object::Integer(value) => Object::Integer(*value),
        lopdf::Object::Real(value) => Object::Real(f64::from(*value)),
        lopdf::Object::Name(name) => Object::Name(name.clone()),
        lopdf::Object::String(bytes, format) => {
            let format = match format {
                lopdf::StringFormat::Literal => StringFormat::Literal,
                lopdf::StringFormat::Hexadecimal => StringFormat::Hexadecimal,
            };
            Object::String(bytes.clone(), format)
        }
        lopdf::Object::Array(items) => Object::Array(items.iter().map(convert).collect()),
        lopdf::Object::Dictionary(dict) => Object::Dictionary(convert_dict(dict)),
        // Stream::new rewrites /Length, which may have been an indirect reference.
        lopdf::Object::Stream(stream) => {
            Object::Stream(Stream::new(convert_dict(&stream.dict), stream.content.clone()))
        }
        lopdf::Object::Reference(id) => Object::Reference(*id),
    }
}

fn convert_dict(dict: &lopdf::Dictionary) -> Dictionary {
    dict.iter().map(|(key, value)| (key.clone(), convert(value))).collect()
}

/// Work out the cross-reference layout from the raw bytes.
pub fn detect_layout(bytes: &[u8]) -> XrefLayout {
    let head = &bytes[..bytes.len().min(1024)];
    XrefLayout {
        format: detect_xref_format(bytes),
        linearized: find(head, b"/Linearized").is_some(),
        revisions: count(bytes, b"%%EOF").max(1),
    }
}

fn detect_xref_format(bytes: &[u8]) -> XrefFormat {
    let Some(marker) = rfind(bytes, b"startxref") else {
        return XrefFormat::Unrecognized;
    };
    let digits: String = bytes[marker + b"startxref".len()..]
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .map(|&b| char::from(b))
        .collect();
    let Some(offset) = digits.parse::<usize>().ok().filter(|&o| o < bytes.len()) else {
        return XrefFormat::Unrecognized;
    };

    let section = &bytes[offset..];
    let start = section.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(0);
    let section = &section[start..];
    if section.starts_with(b"xref") {
        XrefFormat::Table
    } else if section.first().is_some_and(u8::is_ascii_digit)
        && find(&section[..section.len().min(32)], b"obj").is_some()
    {
        XrefFormat::Stream
    } else {
        XrefFormat::Unrecognized
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|window| window == needle)
}

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|window| *window == needle).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::xref::XrefType;
    use lopdf::{Document, Object as LoObject, Stream as LoStream};

    fn sample_document(version: &str, pages: usize) -> Document {
        let mut doc = Document::with_version(version);
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for n in 0..pages {
            let content = format!("BT /F1 12 Tf 72 720 Td (Page {}) Tj ET", n + 1);
            let content = LoStream::new(lopdf::Dictionary::new(), content.into_bytes());
            let content_id = doc.add_object(content);
            let mut page = lopdf::Dictionary::new();
            page.set("Type", LoObject::Name(b"Page".to_vec()));
            page.set("Parent", LoObject::Reference(pages_id));
            page.set("Contents", LoObject::Reference(content_id));
            kids.push(LoObject::Reference(doc.add_object(page)));
        }
        let mut pages_dict = lopdf::Dictionary::new();
        pages_dict.set("Type", LoObject::Name(b"Pages".to_vec()));
        pages_dict.set("Count", LoObject::Integer(pages as i64));
        pages_dict.set("Kids", LoObject::Array(kids));
        doc.objects.insert(pages_id, LoObject::Dictionary(pages_dict));

        let mut catalog = lopdf::Dictionary::new();
        catalog.set("Type", LoObject::Name(b"Catalog".to_vec()));
        catalog.set("Pages", LoObject::Reference(pages_id));
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", LoObject::Reference(catalog_id));
        doc
    }

    /// A PDF 1.4 file with a classic cross-reference table.
    fn sample_pdf(pages: usize) -> Vec<u8> {
        let mut doc = sample_document("1.4", pages);
        doc.reference_table.cross_reference_type = XrefType::CrossReferenceTable;
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).expect("save sample");
        buffer
    }

    /// Append one revision: the numbered object bodies, an xref section
    /// listing them and a trailer. Returns the offset of the xref section.
    fn append_revision(out: &mut Vec<u8>, objects: &[(u32, &str)], trailer: &str) -> usize {
        let mut entries = Vec::new();
        for (id, body) in objects {
            entries.push((*id, out.len()));
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", id, body).as_bytes());
        }
        let xref_offset = out.len();
        let mut section = String::from("xref\n0 1\n0000000000 65535 f \n");
        for (id, offset) in entries {
            section.push_str(&format!("{} 1\n{:010} 00000 n \n", id, offset));
        }
        section.push_str(&format!("trailer\n{}\nstartxref\n{}\n%%EOF\n", trailer, xref_offset));
        out.extend_from_slice(section.as_bytes());
        xref_offset
    }

    fn has_type(graph: &ObjectGraph, type_name: &str) -> bool {
        graph.objects().any(|(_, object)| match object {
            Object::Stream(stream) => stream.dict.type_name() == Some(type_name),
            Object::Dictionary(dict) => dict.type_name() == Some(type_name),
            _ => false,
        })
    }

    #[test]
    fn test_load_bytes_builds_graph() {
        let graph = load_bytes(&sample_pdf(3), "sample").unwrap();

        assert_eq!(graph.page_count(), 3);
        assert_eq!(graph.version, "1.4");
        assert_eq!(graph.layout.format, XrefFormat::Table);
        assert_eq!(graph.layout.revisions, 1);
        assert!(!graph.layout.linearized);

        let page = graph.get_dict(graph.pages()[0]).unwrap();
        let content_id = page.get(b"Contents").and_then(Object::as_reference).unwrap();
        let content = graph.get(content_id).and_then(Object::as_stream).unwrap();
        assert!(content.content.ends_with(b"(Page 1) Tj ET"));
        assert_eq!(
            content.dict.get(b"Length"),
            Some(&Object::Integer(content.content.len() as i64))
        );
    }

    #[test]
    fn test_load_xref_stream_drops_container_objects() {
        let mut doc = sample_document("1.5", 2);
        doc.reference_table.cross_reference_type = XrefType::CrossReferenceStream;
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save sample");

        assert_eq!(detect_layout(&bytes).format, XrefFormat::Stream);
        let graph = load_bytes(&bytes, "xref-stream").unwrap();
        assert_eq!(graph.layout.format, XrefFormat::Stream);
        assert_eq!(graph.page_count(), 2);
        assert!(!has_type(&graph, "XRef"));
        assert!(!has_type(&graph, "ObjStm"));
    }

    #[test]
    fn test_load_incremental_update_uses_latest_revision() {
        let mut bytes = b"%PDF-1.4\n".to_vec();
        let base = append_revision(
            &mut bytes,
            &[
                (1, "<</Type/Catalog/Pages 2 0 R>>"),
                (2, "<</Type/Pages/Kids[3 0 R]/Count 1>>"),
                (3, "<</Type/Page/Parent 2 0 R/Contents 4 0 R/MediaBox[0 0 612 792]>>"),
                (4, "<</Length 3>>\nstream\nold\nendstream"),
            ],
            "<</Size 5/Root 1 0 R>>",
        );
        let trailer = format!("<</Size 5/Root 1 0 R/Prev {}>>", base);
        append_revision(&mut bytes, &[(4, "<</Length 3>>\nstream\nnew\nendstream")], &trailer);

        let graph = load_bytes(&bytes, "incremental").unwrap();
        assert_eq!(graph.layout.revisions, 2);
        assert_eq!(graph.layout.format, XrefFormat::Table);
        assert_eq!(graph.page_count(), 1);

        let content = graph.get((4, 0)).and_then(Object::as_stream).unwrap();
        assert_eq!(content.content, b"new");
    }

    #[test]
    fn test_load_linearized_drops_linearization_dictionary() {
        let mut bytes = b"%PDF-1.4\n".to_vec();
        append_revision(
            &mut bytes,
            &[
                (1, "<</Linearized 1/N 1/O 4>>"),
                (2, "<</Type/Catalog/Pages 3 0 R>>"),
                (3, "<</Type/Pages/Kids[4 0 R]/Count 1>>"),
                (4, "<</Type/Page/Parent 3 0 R/Contents 5 0 R/MediaBox[0 0 612 792]>>"),
                (5, "<</Length 5>>\nstream\nBT ET\nendstream"),
            ],
            "<</Size 6/Root 2 0 R>>",
        );

        let graph = load_bytes(&bytes, "linearized").unwrap();
        assert!(graph.layout.linearized);
        assert_eq!(graph.page_count(), 1);
        assert_eq!(graph.object_count(), 4);
        assert!(graph.get((1, 0)).is_none());
        assert!(!graph
            .objects()
            .any(|(_, object)| object.as_dict().is_some_and(|d| d.has(b"Linearized"))));
    }

    #[test]
    fn test_load_bytes_garbage_is_parse_error() {
        let result = load_bytes(b"this is not a pdf", "garbage");
        match result {
            Err(Error::Parse { input, .. }) => assert_eq!(input, "garbage"),
            other => panic!("expected parse error, got {:?}", other.map(|g| g.page_count())),
        }
    }

    #[test]
    fn test_load_file_missing() {
        let result = load_file(Path::new("does-not-exist.pdf"));
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn test_detect_xref_stream() {
        let bytes: &[u8] =
            b"%PDF-1.5\n7 0 obj\n<</Type/XRef>>stream\nendstream\nendobj\nstartxref\n9\n%%EOF";
        assert_eq!(detect_layout(bytes).format, XrefFormat::Stream);
        assert_eq!(detect_layout(b"%PDF-1.4\n%%EOF").format, XrefFormat::Unrecognized);
    }

    #[test]
    fn test_detect_linearized() {
        let bytes = b"%PDF-1.6\n1 0 obj\n<</Linearized 1/L 1234>>\nendobj\n";
        assert!(detect_layout(bytes).linearized);
    }
}
