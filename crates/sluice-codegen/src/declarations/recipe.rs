//! The `monaco.d.ts.recipe` format
//!
//! ```text
//! declare namespace monaco {
//!     #include(vs/base/common/uri): URI, UriComponents
//!     #include(vs/editor/common/core/range;IRange=>Range): IRange
//!     #includeAll(vs/editor/common/model;editorCommon.=>): IDisposed
//! }
//! ```
//!
//! Lines other than directives are copied as they are.

use crate::error::DeclarationError;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// `#include`: exactly these names
    Only(Vec<String>),
    /// `#includeAll`: every export except these
    AllExcept(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Replacement {
    pattern: Regex,
    with: String,
}

impl Replacement {
    /// Whole-word replacement of `find`
    pub fn new(find: &str, with: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(find)))?;
        Ok(Self {
            pattern,
            with: with.to_string(),
        })
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, regex::NoExpand(&self.with))
            .into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct Directive {
    /// Leading whitespace of the directive line, applied to every included line
    pub indent: String,
    pub module_id: String,
    pub selection: Selection,
    pub replacements: Vec<Replacement>,
}

impl Directive {
    pub fn rewrite(&self, text: &str) -> String {
        self.replacements
            .iter()
            .fold(text.to_string(), |text, replacement| replacement.apply(&text))
    }
}

#[derive(Debug, Clone)]
pub enum RecipeLine {
    Text(String),
    Include(Directive),
}

fn directive_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\s*)#(include|includeAll)\(([^;)]*)(;[^)]*)?\):(.*)$").expect("static regex")
    })
}

fn names(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn replacements(raw: Option<&str>, line_no: usize) -> Result<Vec<Replacement>, DeclarationError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(';')
        .filter(|directive| !directive.is_empty())
        .map(|directive| {
            let (find, with) = directive.split_once("=>").ok_or_else(|| {
                DeclarationError::resolution("recipe", format!("line {}: expected `from=>to` in {:?}", line_no, directive))
            })?;
            Replacement::new(find, with)
                .map_err(|e| DeclarationError::resolution("recipe", format!("line {}: {}", line_no, e)))
        })
        .collect()
}

/// Parse recipe text into lines; line endings are not kept
pub fn parse_recipe(text: &str) -> Result<Vec<RecipeLine>, DeclarationError> {
    let mut lines = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if !line.trim_start().starts_with("#include") {
            lines.push(RecipeLine::Text(line.to_string()));
            continue;
        }

        let caps = directive_regex().captures(line).ok_or_else(|| {
            DeclarationError::resolution("recipe", format!("line {}: malformed directive {:?}", line_no, line.trim()))
        })?;
        let module_id = caps[3].trim().to_string();
        if module_id.is_empty() {
            return Err(DeclarationError::resolution(
                "recipe",
                format!("line {}: directive names no module", line_no),
            ));
        }

        let listed = names(&caps[5]);
        let selection = if &caps[2] == "includeAll" {
            Selection::AllExcept(listed)
        } else {
            Selection::Only(listed)
        };

        lines.push(RecipeLine::Include(Directive {
            indent: caps[1].to_string(),
            module_id,
            selection,
            replacements: replacements(caps.get(4).map(|m| &m.as_str()[1..]), line_no)?,
        }));
    }
    Ok(lines)
}
