//! Localization rewriting for emitted JavaScript
//!
//! `localize('key', 'message', ...)` calls are rewritten to
//! `localize(<index>, null, ...)` and the extracted messages travel next to the
//! file as `<file>.nls.json` and `<file>.nls.metadata.json`.

use crate::error::{CoreError, CoreResult};
use crate::mappings::{apply_edits, TextEdit};
use crate::record::FileRecord;
use crate::stream::RecordTransform;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, warn};

fn localize_call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"\b(localize2?)\(\s*(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")\s*,\s*(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")"#,
        )
        .expect("static regex")
    })
}

/// Keys and messages extracted from one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NlsMetadata {
    pub keys: Vec<String>,
    pub messages: Vec<String>,
}

fn unescape(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    let mut chars = literal.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// The edits turning each localize call of `text` into its indexed form
pub fn localize_edits(text: &str) -> (Vec<TextEdit>, NlsMetadata) {
    let mut metadata = NlsMetadata::default();
    let mut edits = Vec::new();
    for caps in localize_call_regex().captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let function = &caps[1];
        let key = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str()).unwrap_or_default();
        let message = caps.get(4).or_else(|| caps.get(5)).map(|m| m.as_str()).unwrap_or_default();

        let index = metadata.keys.len();
        metadata.keys.push(unescape(key));
        metadata.messages.push(unescape(message));
        edits.push(TextEdit {
            range: whole.range(),
            replacement: format!("{}({}, null", function, index),
        });
    }
    (edits, metadata)
}

/// Rewrite localize calls in `text`, returning the new text and what was extracted
pub fn rewrite_localize_calls(text: &str) -> (String, NlsMetadata) {
    let (edits, metadata) = localize_edits(text);
    (apply_edits(text, &edits), metadata)
}

/// Build-mode localization pass
pub struct Localize;

impl RecordTransform for Localize {
    fn name(&self) -> &str {
        "nls"
    }

    fn apply(&self, mut record: FileRecord) -> CoreResult<Vec<FileRecord>> {
        if !record.has_suffix(".js") {
            return Ok(vec![record]);
        }
        let Some(text) = record.contents_str() else {
            return Ok(vec![record]);
        };
        let text = text.to_owned();
        let text = text.as_str();

        let (edits, metadata) = localize_edits(text);
        if metadata.keys.is_empty() {
            return Ok(vec![record]);
        }
        debug!("Localized {} strings in {}", metadata.keys.len(), record.relative());
        let rewritten = apply_edits(text, &edits);
        if let Some(map) = record.source_map.as_mut() {
            if let Err(e) = map.remap_edits(text, &edits) {
                warn!("Source map of {} left as is: {}", record.relative(), e);
            }
        }

        let messages = to_json(&record, &metadata.messages)?;
        let full = to_json(&record, &metadata)?;

        let stem = record.relative().trim_end_matches(".js").to_string();
        let messages_record = FileRecord::new(record.base(), format!("{}.nls.json", stem), messages);
        let metadata_record = FileRecord::new(record.base(), format!("{}.nls.metadata.json", stem), full);

        record.contents = rewritten.into_bytes();
        Ok(vec![record, messages_record, metadata_record])
    }
}

fn to_json<T: Serialize>(record: &FileRecord, value: &T) -> CoreResult<String> {
    serde_json::to_string(value).map_err(|e| CoreError::Transform {
        transform: "nls".to_string(),
        path: record.relative().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_calls_in_order() {
        let js = r#"const a = localize('hello', "Hello {0}", name); const b = nls.localize2("bye.key", 'Don\'t go');"#;
        let (out, metadata) = rewrite_localize_calls(js);

        assert_eq!(
            out,
            r#"const a = localize(0, null, name); const b = nls.localize2(1, null);"#
        );
        assert_eq!(metadata.keys, vec!["hello", "bye.key"]);
        assert_eq!(metadata.messages, vec!["Hello {0}", "Don't go"]);
    }

    #[test]
    fn test_emits_companion_files() {
        let record = FileRecord::new("/out", "vs/a.js", "localize('k', 'v');");
        let out = Localize.apply(record).unwrap();

        let paths: Vec<_> = out.iter().map(|r| r.relative()).collect();
        assert_eq!(paths, vec!["vs/a.js", "vs/a.nls.json", "vs/a.nls.metadata.json"]);
        assert_eq!(out[0].contents_str().unwrap(), "localize(0, null);");
        assert_eq!(out[1].contents_str().unwrap(), r#"["v"]"#);
    }

    #[test]
    fn test_map_follows_shortened_calls() {
        use crate::mappings::{decode, encode, Original, Segment};
        use crate::SourceMap;

        // the call starts at 10, `g` sits at 49
        let js = "var a = f(localize('some.key', 'Some message')); g();";
        let at = |column, original| Segment {
            column,
            original: Some(Original {
                source: 0,
                line: 0,
                column: original,
                name: None,
            }),
        };
        let mut record = FileRecord::new("/out", "vs/a.js", js);
        record.source_map = Some(SourceMap {
            mappings: encode(&vec![vec![at(0, 0), at(10, 12), at(49, 60)]]),
            ..SourceMap::identity("vs/a.ts", None)
        });

        let out = Localize.apply(record).unwrap().remove(0);
        let text = out.contents_str().unwrap();
        assert_eq!(text, "var a = f(localize(0, null)); g();");

        let lines = decode(&out.source_map.as_ref().unwrap().mappings).unwrap();
        let columns: Vec<_> = lines[0].iter().map(|s| (s.column, s.original.unwrap().column)).collect();
        assert_eq!(columns, vec![(0, 0), (10, 12), (30, 60)]);
        assert_eq!(&text[30..31], "g");
    }

    #[test]
    fn test_files_without_calls_are_untouched() {
        let record = FileRecord::new("/out", "vs/a.js", "var x = 1;");
        let out = Localize.apply(record.clone()).unwrap();
        assert_eq!(out, vec![record]);
    }
}
