//! Per-record transforms and the predicates that select them

pub mod bom;
pub mod css_nesting;
pub mod nls;
pub mod source_url;
pub mod sourcemaps;

pub use bom::PreserveBom;
pub use css_nesting::CssNesting;
pub use nls::Localize;
pub use source_url::AppendSourceUrl;
pub use sourcemaps::{LoadSourceMaps, WriteSourceMaps};

use crate::record::FileRecord;
use regex::Regex;
use std::sync::OnceLock;

fn utf8_test_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(/|\\)test(/|\\).*utf8").expect("static regex"))
}

fn in_fixtures(record: &FileRecord) -> bool {
    record.relative().contains("fixtures")
}

/// Test files whose byte order mark must survive the pipeline
///
/// Matched against the absolute path, so a `test` directory directly under the
/// base counts too.
pub fn is_utf8_test(record: &FileRecord) -> bool {
    let absolute = record.absolute();
    utf8_test_regex().is_match(&absolute.to_string_lossy())
}

pub fn is_runtime_js(record: &FileRecord) -> bool {
    record.has_suffix(".js") && !in_fixtures(record)
}

pub fn is_css(record: &FileRecord) -> bool {
    record.has_suffix(".css") && !in_fixtures(record)
}

pub fn is_typescript(record: &FileRecord) -> bool {
    record.has_suffix(".ts")
}

pub fn is_declaration(record: &FileRecord) -> bool {
    record.has_suffix(".d.ts")
}
