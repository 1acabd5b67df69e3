//! PDF text strings and dates
//!
//! Text strings in information dictionaries are either UTF-16BE with a byte
//! order mark or PDFDocEncoding. Dates use the `D:YYYYMMDDHHmmSSOHH'mm'` form
//! where every field after the year is optional.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};

/// PDFDocEncoding code points 0x18..=0x1F.
const PDF_DOC_LOW: [char; 8] = ['˘', 'ˇ', 'ˆ', '˙', '˝', '˛', '˚', '˜'];

/// PDFDocEncoding code points 0x80..=0x9F.
const PDF_DOC_HIGH: [char; 32] = [
    '•', '†', '‡', '…', '—', '–', 'ƒ', '⁄', '‹', '›', '−', '‰', '„', '“', '”', '‘',
    '’', '‚', '™', 'ﬁ', 'ﬂ', 'Ł', 'Œ', 'Š', 'Ÿ', 'Ž', 'ı', 'ł', 'œ', 'š', 'ž', '\u{FFFD}',
];

/// Decode a PDF text string.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    bytes.iter().map(|&byte| pdf_doc_char(byte)).collect()
}

fn pdf_doc_char(byte: u8) -> char {
    match byte {
        0x18..=0x1F => PDF_DOC_LOW[(byte - 0x18) as usize],
        0x80..=0x9F => PDF_DOC_HIGH[(byte - 0x80) as usize],
        0xA0 => '€',
        _ => char::from(byte),
    }
}

/// Parse a PDF date string. Returns `None` when the year is missing or any
/// field is out of range.
pub fn parse_pdf_date(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    let text = text.strip_prefix("D:").unwrap_or(text);
    let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return None;
    }

    let field = |start: usize, default: u32| -> Option<u32> {
        match digits.get(start..start + 2) {
            Some(two) => two.parse().ok(),
            None => Some(default),
        }
    };
    let year: i32 = digits[..4].parse().ok()?;
    let month = field(4, 1)?;
    let day = field(6, 1)?;
    let hour = field(8, 0)?;
    let minute = field(10, 0)?;
    let second = field(12, 0)?;

    let offset = parse_offset(&text[digits.len()..])?;
    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    offset.from_local_datetime(&naive).single()
}

/// Parse the `Z`, `+HH'mm'` or `-HH'mm` suffix; absent means UTC.
fn parse_offset(rest: &str) -> Option<FixedOffset> {
    let mut chars = rest.chars();
    let sign = match chars.next() {
        None | Some('Z') => return FixedOffset::east_opt(0),
        Some('+') => 1,
        Some('-') => -1,
        Some(_) => return None,
    };
    let numbers: Vec<i32> = chars
        .as_str()
        .split('\'')
        .filter(|part| !part.is_empty())
        .map(|part| part.parse().ok())
        .collect::<Option<_>>()?;
    let hours = numbers.first().copied().unwrap_or(0);
    let minutes = numbers.get(1).copied().unwrap_or(0);
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Render a text string for reports, turning dates into RFC 2822 form.
pub fn display_value(key: &str, bytes: &[u8]) -> String {
    let text = decode_text_string(bytes);
    if key.ends_with("Date") {
        if let Some(date) = parse_pdf_date(&text) {
            return date.to_rfc2822();
        }
    }
    text
}
