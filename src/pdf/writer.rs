//! Graph rewriter and serializer
//!
//! Turns a [`MergedGraph`] into PDF bytes: builds the output page tree and
//! catalog, renumbers the reachable objects sequentially, and writes the body,
//! a classic cross-reference table and the trailer. Output is produced in
//! memory so a failure never leaves a half-written file behind.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use log::debug;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use super::dedup::MergedGraph;
use super::object::{Dictionary, Object, Stream, StringFormat};

/// Lowest header version written.
const MIN_VERSION: (u8, u8) = (1, 4);

/// Serialize `merged` into a complete PDF file.
///
/// `info` becomes the document information dictionary. Fails with
/// [`Error::Serialization`] when an object refers to something that is not in
/// the arena.
pub fn serialize(merged: &mut MergedGraph, info: Option<Dictionary>) -> Result<Vec<u8>> {
    if merged.page_count() == 0 {
        return Err(Error::NoDocuments);
    }

    let catalog = build_page_tree(merged)?;
    let info = info.map(|dict| merged.push(Object::Dictionary(dict)));

    let order = renumber(merged, catalog, info)?;
    let numbers: HashMap<u32, u32> = order
        .iter()
        .enumerate()
        .map(|(i, &arena)| (arena, i as u32 + 1))
        .collect();
    debug!(
        "Serializing {} of {} arena objects",
        order.len(),
        merged.object_count()
    );

    let version = merged.version().unwrap_or(MIN_VERSION).max(MIN_VERSION);
    let mut out = Vec::new();
    write!(out, "%PDF-{}.{}\n%", version.0, version.1)?;
    out.extend_from_slice(&[0xE2, 0xE3, 0xCF, 0xD3, b'\n']);

    let mut offsets = Vec::with_capacity(order.len());
    for (i, &arena) in order.iter().enumerate() {
        let object = merged
            .get(arena)
            .ok_or_else(|| Error::Serialization(format!("arena object {} is empty", arena)))?;
        let object = object
            .try_map_references(&mut |_, (target, _)| {
                numbers.get(&target).map(|&n| Object::Reference((n, 0)))
            })
            .ok_or_else(|| {
                Error::Serialization(format!(
                    "{} object {} has unresolved references",
                    object.kind(),
                    arena
                ))
            })?;

        offsets.push(out.len());
        write!(out, "{} 0 obj\n", i + 1)?;
        Writer::write_object(&mut out, &object)?;
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_start = out.len();
    write!(out, "xref\n0 {}\n", order.len() + 1)?;
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        write!(out, "{:010} 00000 n \n", offset)?;
    }

    let id = document_id(&out);
    let mut trailer = Dictionary::new();
    trailer.set("Size", (order.len() + 1) as i64);
    trailer.set("Root", Object::Reference((numbers[&catalog], 0)));
    if let Some(info) = info {
        trailer.set("Info", Object::Reference((numbers[&info], 0)));
    }
    trailer.set(
        "ID",
        Object::Array(vec![
            Object::String(id.clone(), StringFormat::Hexadecimal),
            Object::String(id, StringFormat::Hexadecimal),
        ]),
    );
    out.extend_from_slice(b"trailer\n");
    Writer::write_dictionary(&mut out, &trailer)?;
    write!(out, "\nstartxref\n{}\n%%EOF\n", xref_start)?;

    Ok(out)
}

/// Add a flat page tree over the merged pages plus a catalog; returns the catalog.
fn build_page_tree(merged: &mut MergedGraph) -> Result<u32> {
    let pages = merged.pages().to_vec();

    let mut root = Dictionary::new();
    root.set("Type", Object::name("Pages"));
    root.set("Count", pages.len() as i64);
    root.set(
        "Kids",
        Object::Array(pages.iter().map(|&n| Object::Reference((n, 0))).collect()),
    );
    let root = merged.push(Object::Dictionary(root));

    for &page in &pages {
        match merged.get_mut(page) {
            Some(Object::Dictionary(dict)) => dict.set("Parent", Object::Reference((root, 0))),
            Some(other) => {
                return Err(Error::Serialization(format!(
                    "page object {} is {}, expected Dictionary",
                    page,
                    other.kind()
                )))
            }
            None => {
                return Err(Error::Serialization(format!("page object {} is empty", page)))
            }
        }
    }

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::name("Catalog"));
    catalog.set("Pages", Object::Reference((root, 0)));
    Ok(merged.push(Object::Dictionary(catalog)))
}

/// Output order: breadth first from the catalog, then the info dictionary.
///
/// Every reference met on the way must point at a filled arena slot.
fn renumber(merged: &MergedGraph, catalog: u32, info: Option<u32>) -> Result<Vec<u32>> {
    let mut order = Vec::new();
    let mut seen = vec![false; merged.object_count() + 1];
    let mut queue: VecDeque<u32> = VecDeque::new();

    for start in std::iter::once(catalog).chain(info) {
        if seen[start as usize] {
            continue;
        }
        seen[start as usize] = true;
        queue.push_back(start);

        while let Some(number) = queue.pop_front() {
            let object = merged.get(number).ok_or_else(|| {
                Error::Serialization(format!("unresolved reference to object {}", number))
            })?;
            order.push(number);

            let mut unresolved = None;
            object.for_each_reference(&mut |_, (target, generation)| {
                let known = generation == 0 && merged.get(target).is_some();
                if !known {
                    unresolved.get_or_insert((target, generation));
                } else if !seen[target as usize] {
                    seen[target as usize] = true;
                    queue.push_back(target);
                }
            });
            if let Some((target, generation)) = unresolved {
                return Err(Error::Serialization(format!(
                    "{} object {} refers to {} {} which is not part of the output",
                    object.kind(),
                    number,
                    target,
                    generation
                )));
            }
        }
    }

    Ok(order)
}

/// First 16 bytes of a SHA-256 over the file body.
fn document_id(body: &[u8]) -> Vec<u8> {
    Sha256::digest(body)[..16].to_vec()
}

pub struct Writer;

impl Writer {
    fn need_separator(object: &Object) -> bool {
        matches!(
            object,
            Object::Null
                | Object::Boolean(_)
                | Object::Integer(_)
                | Object::Real(_)
                | Object::Reference(_)
        )
    }

    pub fn write_object(out: &mut Vec<u8>, object: &Object) -> Result<()> {
        match object {
            Object::Null => out.extend_from_slice(b"null"),
            Object::Boolean(true) => out.extend_from_slice(b"true"),
            Object::Boolean(false) => out.extend_from_slice(b"false"),
            Object::Integer(value) => write!(out, "{}", value)?,
            Object::Real(value) => out.extend_from_slice(format_real(*value).as_bytes()),
            Object::Name(name) => Writer::write_name(out, name),
            Object::String(text, format) => Writer::write_string(out, text, *format),
            Object::Array(items) => Writer::write_array(out, items)?,
            Object::Dictionary(dict) => Writer::write_dictionary(out, dict)?,
            Object::Stream(stream) => Writer::write_stream(out, stream)?,
            Object::Reference((number, generation)) => write!(out, "{} {} R", number, generation)?,
        }
        Ok(())
    }

    fn write_name(out: &mut Vec<u8>, name: &[u8]) {
        out.push(b'/');
        for &byte in name {
            // white-space, delimiters and bytes outside 33..=126 are encoded as #XX
            if b" \t\n\r\x0C()<>[]{}/%#".contains(&byte) || !(33..=126).contains(&byte) {
                out.extend_from_slice(format!("#{:02X}", byte).as_bytes());
            } else {
                out.push(byte);
            }
        }
    }

    fn write_string(out: &mut Vec<u8>, text: &[u8], format: StringFormat) {
        match format {
            StringFormat::Literal => {
                out.push(b'(');
                for &byte in text {
                    match byte {
                        b'(' | b')' | b'\\' => out.extend_from_slice(&[b'\\', byte]),
                        b'\r' => out.extend_from_slice(b"\\r"),
                        _ => out.push(byte),
                    }
                }
                out.push(b')');
            }
            StringFormat::Hexadecimal => {
                out.push(b'<');
                for byte in text {
                    out.extend_from_slice(format!("{:02X}", byte).as_bytes());
                }
                out.push(b'>');
            }
        }
    }

    fn write_array(out: &mut Vec<u8>, items: &[Object]) -> Result<()> {
        out.push(b'[');
        for (i, item) in items.iter().enumerate() {
            if i > 0 && Writer::need_separator(item) {
                out.push(b' ');
            }
            Writer::write_object(out, item)?;
        }
        out.push(b']');
        Ok(())
    }

    pub fn write_dictionary(out: &mut Vec<u8>, dict: &Dictionary) -> Result<()> {
        out.extend_from_slice(b"<<");
        for (key, value) in dict {
            Writer::write_name(out, key);
            if Writer::need_separator(value) {
                out.push(b' ');
            }
            Writer::write_object(out, value)?;
        }
        out.extend_from_slice(b">>");
        Ok(())
    }

    fn write_stream(out: &mut Vec<u8>, stream: &Stream) -> Result<()> {
        let mut dict = stream.dict.clone();
        dict.set("Length", stream.content.len() as i64);
        Writer::write_dictionary(out, &dict)?;
        out.extend_from_slice(b"\nstream\n");
        out.extend_from_slice(&stream.content);
        out.extend_from_slice(b"\nendstream");
        Ok(())
    }
}

/// Decimal notation without exponent, as PDF requires.
fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let text = format!("{:.6}", value);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
