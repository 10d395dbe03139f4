//! Compiler options computed once per pipeline construction

use crate::record::to_file_uri;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment flag that disables source map emission entirely
pub const NO_SOURCEMAP_ENV: &str = "SLUICE_NO_SOURCEMAP";

/// Line ending style for emitted files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewLine {
    CrLf,
    Lf,
}

impl NewLine {
    /// Sniff the style used by `text`
    pub fn detect(text: &str) -> Self {
        if text.contains("\r\n") {
            NewLine::CrLf
        } else {
            NewLine::Lf
        }
    }

    pub fn platform() -> Self {
        if cfg!(windows) {
            NewLine::CrLf
        } else {
            NewLine::Lf
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NewLine::CrLf => "\r\n",
            NewLine::Lf => "\n",
        }
    }

    /// The value tsc expects for `--newLine`
    pub fn tsc_flag(self) -> &'static str {
        match self {
            NewLine::CrLf => "crlf",
            NewLine::Lf => "lf",
        }
    }
}

/// Fully enumerated compiler options for one pipeline
///
/// Invariant: `inline_source_map` is never set while `source_map` is off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerOptionsSet {
    pub root_dir: PathBuf,
    pub base_url: PathBuf,
    /// `file://` URI of the root directory
    pub source_root: String,
    pub source_map: bool,
    pub new_line: NewLine,
    pub inline_sources: bool,
    pub inline_source_map: bool,
    pub verbose: bool,
}

impl CompilerOptionsSet {
    /// Environment-derived baseline for a source root
    ///
    /// The newline style is sniffed from `reference` when it can be read.
    pub fn for_source(root_dir: &Path, reference: Option<&Path>) -> Self {
        let source_map = std::env::var_os(NO_SOURCEMAP_ENV).is_none();
        let new_line = reference
            .and_then(|path| std::fs::read_to_string(path).ok())
            .map(|text| NewLine::detect(&text))
            .unwrap_or_else(NewLine::platform);

        Self {
            root_dir: root_dir.to_path_buf(),
            base_url: root_dir.to_path_buf(),
            source_root: to_file_uri(root_dir),
            source_map,
            new_line,
            inline_sources: false,
            inline_source_map: false,
            verbose: false,
        }
    }

    /// Apply the per-invocation overrides for a build mode
    ///
    /// Build mode inlines original sources into external maps; dev/watch mode
    /// embeds the maps themselves into the emitted files.
    pub fn with_mode(mut self, build: bool) -> Self {
        self.inline_sources = build;
        self.inline_source_map = !build && self.source_map;
        self
    }

    /// Whether the compiler should hand back structured maps for external writing
    pub fn wants_external_maps(&self) -> bool {
        self.source_map && !self.inline_source_map
    }
}
