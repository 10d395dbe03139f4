//! Compiler backends a [`CompilationUnit`](crate::compilation_unit::CompilationUnit) can drive
//!
//! - [`TscBackend`]: the TypeScript compiler as a child process, with or without type checking
//! - `SwcBackend` (feature `swc`): in-process transpilation through deno_ast

pub mod tsc;

#[cfg(feature = "swc")]
pub mod swc;

pub use tsc::TscBackend;

#[cfg(feature = "swc")]
pub use swc::SwcBackend;

use crate::error::CompileResult;
use sluice_core::sourcemap::{strip_mapping_url, SourceMap};
use sluice_core::{CompilerOptionsSet, Diagnostic, FileRecord};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Everything one backend invocation produced
#[derive(Debug, Default)]
pub struct CompileOutput {
    pub records: Vec<FileRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Turns TypeScript records into emitted records
///
/// Implementations run on the blocking pool and should check `token` between
/// units of work. Diagnostics are data, not errors: an `Err` means the backend
/// itself could not run.
pub trait CompilerBackend: Send + Sync {
    fn name(&self) -> &str;

    fn compile(
        &self,
        inputs: &[FileRecord],
        options: &CompilerOptionsSet,
        token: &CancellationToken,
    ) -> CompileResult<CompileOutput>;
}

/// Attach an emitted map to `record` the way `options` ask for
///
/// Any `sourceMappingURL` comment the compiler left behind is removed first.
/// When the compiled input carried a map of its own, the emitted map is chained
/// onto it. Inline mode embeds the map as a data URL comment; otherwise the
/// structured map rides along for the source map writer.
pub fn attach_source_map(
    mut record: FileRecord,
    map: Option<SourceMap>,
    input_map: Option<&SourceMap>,
    options: &CompilerOptionsSet,
) -> FileRecord {
    if let Some(text) = record.contents_str() {
        let (stripped, _) = strip_mapping_url(text);
        record.contents = stripped.into_bytes();
    }

    let Some(mut map) = map.filter(|_| options.source_map) else {
        record.source_map = None;
        return record;
    };
    if let Some(input_map) = input_map.filter(|m| m.has_mappings()) {
        match map.compose(input_map) {
            Ok(composed) => map = composed,
            Err(e) => warn!("Keeping uncomposed map for {}: {}", record.relative(), e),
        }
    }

    if options.inline_source_map {
        if !record.contents.ends_with(b"\n") {
            record.contents.push(b'\n');
        }
        record.contents.extend_from_slice(map.to_inline_comment().as_bytes());
        record.source_map = None;
    } else {
        record.source_map = Some(map);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::NewLine;
    use std::path::PathBuf;

    fn options(source_map: bool, inline: bool) -> CompilerOptionsSet {
        CompilerOptionsSet {
            root_dir: PathBuf::from("/src"),
            base_url: PathBuf::from("/src"),
            source_root: "file:///src".to_string(),
            source_map,
            new_line: NewLine::Lf,
            inline_sources: false,
            inline_source_map: inline,
            verbose: false,
        }
    }

    #[test]
    fn test_inline_mode_embeds_comment() {
        let record = FileRecord::new("/src", "a.js", "var a;\n//# sourceMappingURL=a.js.map");
        let out = attach_source_map(record, Some(SourceMap::identity("a.ts", None)), None, &options(true, true));

        let text = out.contents_str().unwrap();
        assert!(text.starts_with("var a;\n//# sourceMappingURL=data:application/json;base64,"));
        assert!(out.source_map.is_none());
    }

    #[test]
    fn test_external_mode_keeps_structured_map() {
        let record = FileRecord::new("/src", "a.js", "var a;\n");
        let out = attach_source_map(record, Some(SourceMap::identity("a.ts", None)), None, &options(true, false));
        assert_eq!(out.contents_str().unwrap(), "var a;\n");
        assert_eq!(out.source_map.unwrap().sources, vec!["a.ts"]);
    }

    #[test]
    fn test_input_map_survives_compilation() {
        let record = FileRecord::new("/src", "a.js", "var a;\n");
        let emitted = SourceMap {
            mappings: "AAAA".to_string(),
            ..SourceMap::identity("a.ts", None)
        };
        let input = SourceMap {
            sources: vec!["../lib/a.src.ts".to_string()],
            mappings: "AAKA".to_string(),
            ..SourceMap::identity("a.ts", None)
        };

        let out = attach_source_map(record, Some(emitted), Some(&input), &options(true, false));
        let map = out.source_map.unwrap();
        assert_eq!(map.sources, vec!["../lib/a.src.ts"]);
        assert_eq!(map.mappings, "AAKA");
    }

    #[test]
    fn test_identity_input_map_is_not_composed() {
        let record = FileRecord::new("/src", "a.js", "var a;\n");
        let emitted = SourceMap {
            mappings: "AAAA".to_string(),
            ..SourceMap::identity("a.ts", None)
        };
        let input = SourceMap::identity("a.ts", Some("let a;"));

        let out = attach_source_map(record, Some(emitted.clone()), Some(&input), &options(true, false));
        assert_eq!(out.source_map.unwrap(), emitted);
    }

    #[test]
    fn test_disabled_maps_are_dropped() {
        let record = FileRecord::new("/src", "a.js", "var a;\n");
        let out = attach_source_map(record, Some(SourceMap::identity("a.ts", None)), None, &options(false, false));
        assert!(out.source_map.is_none());
    }
}
