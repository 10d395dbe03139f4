//! Decoded source map `mappings` and the edits applied to them
//!
//! Mappings are kept as one `Vec<Segment>` per generated line. Columns are
//! UTF-16 code units, as in the v3 format.

use std::ops::Range;
use thiserror::Error;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid mappings: {0}")]
pub struct MappingsError(String);

impl MappingsError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Position in an original source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Original {
    pub source: u32,
    pub line: u32,
    pub column: u32,
    pub name: Option<u32>,
}

/// One mapping on a generated line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub column: u32,
    pub original: Option<Original>,
}

pub type MappingLines = Vec<Vec<Segment>>;

fn digit(byte: u8) -> Option<i64> {
    let value = match byte {
        b'A'..=b'Z' => byte - b'A',
        b'a'..=b'z' => byte - b'a' + 26,
        b'0'..=b'9' => byte - b'0' + 52,
        b'+' => 62,
        b'/' => 63,
        _ => return None,
    };
    Some(i64::from(value))
}

fn decode_field(bytes: &[u8], pos: &mut usize) -> Result<i64, MappingsError> {
    let mut value = 0i64;
    let mut shift = 0;
    loop {
        let byte = *bytes.get(*pos).ok_or_else(|| MappingsError::new("truncated segment"))?;
        let d = digit(byte).ok_or_else(|| MappingsError::new(format!("unexpected character {:?}", byte as char)))?;
        *pos += 1;
        value |= (d & 31) << shift;
        if d & 32 == 0 {
            break;
        }
        shift += 5;
        if shift > 60 {
            return Err(MappingsError::new("value out of range"));
        }
    }
    let negative = value & 1 == 1;
    value >>= 1;
    Ok(if negative { -value } else { value })
}

fn encode_field(out: &mut String, value: i64) {
    let mut vlq = if value < 0 { ((-value) << 1) | 1 } else { value << 1 };
    loop {
        let mut d = vlq & 31;
        vlq >>= 5;
        if vlq > 0 {
            d |= 32;
        }
        out.push(ALPHABET[d as usize] as char);
        if vlq == 0 {
            break;
        }
    }
}

fn to_u32(value: i64) -> Result<u32, MappingsError> {
    u32::try_from(value).map_err(|_| MappingsError::new(format!("position {} out of range", value)))
}

pub fn decode(mappings: &str) -> Result<MappingLines, MappingsError> {
    let mut lines = Vec::new();
    let (mut source, mut line, mut column, mut name) = (0i64, 0i64, 0i64, 0i64);

    for text in mappings.split(';') {
        let mut segments = Vec::new();
        let mut generated = 0i64;
        for raw in text.split(',').filter(|raw| !raw.is_empty()) {
            let bytes = raw.as_bytes();
            let mut pos = 0;
            let mut fields = Vec::with_capacity(5);
            while pos < bytes.len() {
                fields.push(decode_field(bytes, &mut pos)?);
            }

            generated += fields[0];
            let original = match fields.len() {
                1 => None,
                4 | 5 => {
                    source += fields[1];
                    line += fields[2];
                    column += fields[3];
                    let segment_name = match fields.get(4) {
                        Some(delta) => {
                            name += delta;
                            Some(to_u32(name)?)
                        }
                        None => None,
                    };
                    Some(Original {
                        source: to_u32(source)?,
                        line: to_u32(line)?,
                        column: to_u32(column)?,
                        name: segment_name,
                    })
                }
                n => return Err(MappingsError::new(format!("segment with {} fields", n))),
            };
            segments.push(Segment {
                column: to_u32(generated)?,
                original,
            });
        }
        lines.push(segments);
    }
    Ok(lines)
}

pub fn encode(lines: &MappingLines) -> String {
    let mut out = String::new();
    let (mut source, mut line, mut column, mut name) = (0i64, 0i64, 0i64, 0i64);

    for (index, segments) in lines.iter().enumerate() {
        if index > 0 {
            out.push(';');
        }
        let mut generated = 0i64;
        for (position, segment) in segments.iter().enumerate() {
            if position > 0 {
                out.push(',');
            }
            encode_field(&mut out, i64::from(segment.column) - generated);
            generated = i64::from(segment.column);

            let Some(original) = segment.original else {
                continue;
            };
            encode_field(&mut out, i64::from(original.source) - source);
            encode_field(&mut out, i64::from(original.line) - line);
            encode_field(&mut out, i64::from(original.column) - column);
            source = i64::from(original.source);
            line = i64::from(original.line);
            column = i64::from(original.column);
            if let Some(segment_name) = original.name {
                encode_field(&mut out, i64::from(segment_name) - name);
                name = i64::from(segment_name);
            }
        }
    }
    out
}

/// The mapping in effect at `line:column`, if any
pub fn lookup(lines: &MappingLines, line: u32, column: u32) -> Option<Original> {
    let segments = lines.get(line as usize)?;
    let index = segments.partition_point(|segment| segment.column <= column);
    segments.get(index.checked_sub(1)?)?.original
}

/// Replacement of a byte range of some text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: Range<usize>,
    pub replacement: String,
}

/// Apply non-overlapping `edits`, sorted by start, to `text`
pub fn apply_edits(text: &str, edits: &[TextEdit]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for edit in edits {
        out.push_str(&text[cursor..edit.range.start]);
        out.push_str(&edit.replacement);
        cursor = edit.range.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Byte offset where each line of `text` starts
fn line_starts(text: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

fn line_text<'a>(text: &'a str, starts: &[usize], line: usize) -> &'a str {
    let start = starts[line];
    let end = starts.get(line + 1).map(|next| next - 1).unwrap_or(text.len());
    &text[start..end]
}

fn byte_column(line: &str, utf16_column: u32) -> usize {
    let mut units = 0;
    for (offset, c) in line.char_indices() {
        if units >= utf16_column as usize {
            return offset;
        }
        units += c.len_utf16();
    }
    line.len()
}

fn utf16_column(line: &str, byte_column: usize) -> u32 {
    let end = byte_column.min(line.len());
    let units: usize = line
        .char_indices()
        .take_while(|(offset, _)| *offset < end)
        .map(|(_, c)| c.len_utf16())
        .sum();
    units as u32
}

/// Move generated positions of `lines` from `old_text` into `apply_edits(old_text, edits)`
///
/// Positions inside a replaced range collapse onto the start of its replacement.
pub fn remap_generated(lines: &MappingLines, old_text: &str, edits: &[TextEdit]) -> MappingLines {
    let new_text = apply_edits(old_text, edits);
    let old_starts = line_starts(old_text);
    let new_starts = line_starts(&new_text);
    let mut remapped: MappingLines = vec![Vec::new(); new_starts.len()];

    for (line, segments) in lines.iter().enumerate().take(old_starts.len()) {
        let old_line = line_text(old_text, &old_starts, line);
        for segment in segments {
            let offset = old_starts[line] + byte_column(old_line, segment.column);

            let mut shift = 0isize;
            let mut moved = offset;
            for edit in edits {
                if edit.range.end <= offset {
                    shift += edit.replacement.len() as isize - edit.range.len() as isize;
                } else {
                    if edit.range.start < offset {
                        moved = edit.range.start;
                    }
                    break;
                }
            }
            let new_offset = (moved as isize + shift).max(0) as usize;

            let new_line = new_starts.partition_point(|start| *start <= new_offset).saturating_sub(1);
            let column = utf16_column(line_text(&new_text, &new_starts, new_line), new_offset - new_starts[new_line]);
            let target = &mut remapped[new_line];
            if target.last().is_some_and(|last| last.column == column) {
                continue;
            }
            target.push(Segment {
                column,
                original: segment.original,
            });
        }
    }
    remapped
}
