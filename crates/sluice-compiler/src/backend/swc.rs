//! In-process transpilation through deno_ast (swc underneath)
//!
//! Each file is transpiled on its own with no type information, which is what
//! makes this path fast. Declaration inputs produce no output.

use super::{attach_source_map, CompileOutput, CompilerBackend};
use crate::error::CompileResult;
use deno_ast::{EmitOptions, MediaType, ModuleSpecifier, ParseParams, SourceMapOption};
use sluice_core::transforms::is_declaration;
use sluice_core::{CompilerOptionsSet, Diagnostic, FileRecord, SourceMap};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, Default)]
pub struct SwcBackend;

impl SwcBackend {
    fn transpile_one(&self, record: &FileRecord, options: &CompilerOptionsSet) -> Result<FileRecord, String> {
        let text = record
            .contents_str()
            .ok_or_else(|| "source is not valid UTF-8".to_string())?;
        let specifier = ModuleSpecifier::from_file_path(record.absolute())
            .map_err(|_| format!("cannot build a module specifier for {:?}", record.absolute()))?;

        let parsed = deno_ast::parse_module(ParseParams {
            specifier,
            text: text.into(),
            media_type: MediaType::TypeScript,
            capture_tokens: false,
            scope_analysis: false,
            maybe_syntax: None,
        })
        .map_err(|e| e.to_string())?;

        let emit = EmitOptions {
            source_map: if options.source_map {
                SourceMapOption::Separate
            } else {
                SourceMapOption::None
            },
            inline_sources: options.inline_sources,
            ..Default::default()
        };
        let transpiled = parsed
            .transpile(
                &deno_ast::TranspileOptions::default(),
                &deno_ast::TranspileModuleOptions::default(),
                &emit,
            )
            .map_err(|e| e.to_string())?
            .into_source();

        let map = transpiled
            .source_map
            .as_deref()
            .and_then(|json| SourceMap::from_json(json).ok())
            .map(|mut map| {
                map.sources = vec![record.relative().to_string()];
                map
            });

        let output = FileRecord::new(record.base(), record.relative(), transpiled.text).with_extension("js");
        Ok(attach_source_map(output, map, record.source_map.as_ref(), options))
    }
}

impl CompilerBackend for SwcBackend {
    fn name(&self) -> &str {
        "swc"
    }

    fn compile(
        &self,
        inputs: &[FileRecord],
        options: &CompilerOptionsSet,
        token: &CancellationToken,
    ) -> CompileResult<CompileOutput> {
        let mut output = CompileOutput::default();
        for record in inputs.iter().filter(|r| !is_declaration(r)) {
            if token.is_cancelled() {
                debug!("swc transpile cancelled after {} files", output.records.len());
                return Ok(CompileOutput::default());
            }
            match self.transpile_one(record, options) {
                Ok(emitted) => {
                    trace!("Transpiled {}", record.relative());
                    output.records.push(emitted);
                }
                Err(message) => output
                    .diagnostics
                    .push(Diagnostic::error(message).at(record.relative(), 1, 1)),
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_transpiles_and_skips_declarations() {
        let options = CompilerOptionsSet::for_source(Path::new("/repo/src"), None).with_mode(false);
        let inputs = vec![
            FileRecord::new("/repo/src", "vs/a.ts", "export const a: number = 1;\n"),
            FileRecord::new("/repo/src", "vs/a.d.ts", "export declare const a: number;\n"),
        ];

        let output = SwcBackend
            .compile(&inputs, &options, &CancellationToken::new())
            .unwrap();
        assert!(output.diagnostics.is_empty());
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].relative(), "vs/a.js");
        assert!(!output.records[0].contents_str().unwrap().contains(": number"));
    }

    #[test]
    fn test_syntax_errors_become_diagnostics() {
        let options = CompilerOptionsSet::for_source(Path::new("/repo/src"), None);
        let inputs = vec![FileRecord::new("/repo/src", "vs/bad.ts", "let = ;")];
        let output = SwcBackend
            .compile(&inputs, &options, &CancellationToken::new())
            .unwrap();
        assert!(output.records.is_empty());
        assert_eq!(output.diagnostics[0].file.as_deref(), Some("vs/bad.ts"));
    }
}
