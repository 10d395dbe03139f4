//! Source map v3 model and comment handling

use crate::mappings::{self, MappingsError, Original, Segment, TextEdit};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

const INLINE_PREFIX: &str = "data:application/json;base64,";

/// A version 3 source map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub mappings: String,
}

impl SourceMap {
    /// An empty map pointing at a single source (used when a file has no map yet)
    pub fn identity(source: &str, content: Option<&str>) -> Self {
        Self {
            version: 3,
            file: Some(source.to_string()),
            source_root: None,
            sources: vec![source.to_string()],
            sources_content: content.map(|c| vec![Some(c.to_string())]),
            names: Vec::new(),
            mappings: String::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> String {
        // Serializing plain strings and vectors cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Encode as a `//# sourceMappingURL=data:...` comment
    pub fn to_inline_comment(&self) -> String {
        format!(
            "//# sourceMappingURL={}{}",
            INLINE_PREFIX,
            STANDARD.encode(self.to_json())
        )
    }

    /// Decode a `data:application/json;base64,` URL
    pub fn from_data_url(url: &str) -> Option<Self> {
        let payload = url.strip_prefix(INLINE_PREFIX)?;
        let bytes = STANDARD.decode(payload.trim()).ok()?;
        let json = String::from_utf8(bytes).ok()?;
        Self::from_json(&json).ok()
    }

    /// Whether the map carries any mapping at all
    pub fn has_mappings(&self) -> bool {
        self.mappings.bytes().any(|b| b != b';')
    }

    /// Chain this map onto `inner`, the map of the text this one was generated from
    ///
    /// The result maps the generated file straight to `inner`'s sources.
    /// Positions `inner` does not cover become unmapped.
    pub fn compose(&self, inner: &SourceMap) -> Result<SourceMap, MappingsError> {
        let outer = mappings::decode(&self.mappings)?;
        let inner_lines = mappings::decode(&inner.mappings)?;

        let mut names: Vec<String> = Vec::new();
        let mut name_index: HashMap<String, u32> = HashMap::new();
        let mut intern = |name: &str| -> u32 {
            *name_index.entry(name.to_string()).or_insert_with(|| {
                names.push(name.to_string());
                names.len() as u32 - 1
            })
        };

        let lines = outer
            .into_iter()
            .map(|segments| {
                segments
                    .into_iter()
                    .map(|segment| {
                        let original = segment.original.and_then(|at| {
                            let found = mappings::lookup(&inner_lines, at.line, at.column)?;
                            let name = found
                                .name
                                .and_then(|i| inner.names.get(i as usize))
                                .or_else(|| at.name.and_then(|i| self.names.get(i as usize)))
                                .map(|name| intern(name));
                            Some(Original { name, ..found })
                        });
                        Segment {
                            column: segment.column,
                            original,
                        }
                    })
                    .collect()
            })
            .collect();

        Ok(SourceMap {
            version: 3,
            file: self.file.clone(),
            source_root: inner.source_root.clone(),
            sources: inner.sources.clone(),
            sources_content: inner.sources_content.clone(),
            names,
            mappings: mappings::encode(&lines),
        })
    }

    /// Follow `edits` made to `old_text`, the generated file this map describes
    pub fn remap_edits(&mut self, old_text: &str, edits: &[TextEdit]) -> Result<(), MappingsError> {
        let lines = mappings::decode(&self.mappings)?;
        self.mappings = mappings::encode(&mappings::remap_generated(&lines, old_text, edits));
        Ok(())
    }
}

/// Where a file's `sourceMappingURL` comment points
#[derive(Debug, Clone, PartialEq)]
pub enum MappingUrl {
    Inline(SourceMap),
    External(String),
}

fn mapping_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(?://|/\*)[#@] sourceMappingURL=([^\s*]+)[ \t]*(?:\*/)?[ \t]*\r?\n?")
            .expect("static regex")
    })
}

/// Remove the last `sourceMappingURL` comment from `text`, returning what it referenced
pub fn strip_mapping_url(text: &str) -> (String, Option<MappingUrl>) {
    let Some(found) = mapping_url_regex().captures_iter(text).last() else {
        return (text.to_string(), None);
    };
    let whole = found.get(0).map(|m| m.range()).unwrap_or(0..0);
    let url = found.get(1).map(|m| m.as_str()).unwrap_or_default();

    let mut stripped = String::with_capacity(text.len());
    stripped.push_str(&text[..whole.start]);
    stripped.push_str(&text[whole.end..]);

    let target = if url.starts_with("data:") {
        SourceMap::from_data_url(url).map(MappingUrl::Inline)
    } else {
        Some(MappingUrl::External(url.to_string()))
    };
    (stripped, target)
}
