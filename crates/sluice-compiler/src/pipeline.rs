//! Assembly of the compile pipeline
//!
//! [`create_compile`] fixes the options and the compilation unit once; the
//! returned [`Compile`] can then build any number of pipelines over different
//! inputs. Each pipeline runs these stages in order:
//!
//! 1. BOM preservation for UTF-8 test fixtures
//! 2. `sourceURL` comments on runtime JavaScript (dev builds only)
//! 3. CSS nesting flattening
//! 4. TypeScript sources split off from everything else
//! 5. source maps loaded, then compiled
//! 6. localization of emitted JavaScript (build only), declarations set aside
//! 7. external source maps written (unless transpiling only)
//! 8. non-TypeScript records merged back, reporter summary, cancellation gate

use crate::backend::CompilerBackend;
use crate::compilation_unit::{CompilationSettings, CompilationUnit};
use crate::error::{CompileError, CompileResult};
use sluice_core::fs::source_records;
use sluice_core::stream::{apply_transform, gate, partition, when, Partition, RecordStream};
use sluice_core::transforms::{
    is_css, is_declaration, is_runtime_js, is_typescript, is_utf8_test, AppendSourceUrl, CssNesting, LoadSourceMaps,
    Localize, PreserveBom, WriteSourceMaps,
};
use sluice_core::{CompilerOptionsSet, FileRecord, Reporter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How much of the compiler to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TranspileOnly {
    /// Full type-checking compile
    #[default]
    No,
    /// Per-file transpilation through tsc
    Yes,
    /// Per-file transpilation through swc
    Swc,
}

impl TranspileOnly {
    pub fn is_enabled(self) -> bool {
        !matches!(self, TranspileOnly::No)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileFlags {
    pub build: bool,
    pub emit_error: bool,
    pub transpile_only: TranspileOnly,
}

/// A configured compile, ready to produce pipelines
pub struct Compile {
    src: PathBuf,
    project_path: PathBuf,
    flags: CompileFlags,
    options: Arc<CompilerOptionsSet>,
    unit: Arc<CompilationUnit>,
    reporter: Reporter,
}

/// Configure a compile for the project rooted at `src`
pub fn create_compile(src: impl AsRef<Path>, flags: CompileFlags, reporter: Reporter) -> CompileResult<Compile> {
    let src = src.as_ref();
    if src.as_os_str().is_empty() {
        return Err(CompileError::InvalidSource(src.to_path_buf()));
    }
    let root = std::path::absolute(src).map_err(|e| CompileError::io(src, e))?;
    let project_path = root.join("tsconfig.json");

    let options = CompilerOptionsSet::for_source(&root, Some(&project_path)).with_mode(flags.build);
    debug!("Compiler options for {:?}: {:?}", root, options);
    let options = Arc::new(options);

    let settings = CompilationSettings {
        transpile_only: flags.transpile_only.is_enabled(),
        transpile_with_swc: flags.transpile_only == TranspileOnly::Swc,
        verbose: options.verbose,
    };
    let unit = CompilationUnit::new(&project_path, options.clone(), settings, reporter.clone());

    Ok(Compile {
        src: root,
        project_path,
        flags,
        options,
        unit: Arc::new(unit),
        reporter,
    })
}

impl Compile {
    /// Swap in a different compiler backend, keeping options and reporter
    pub fn with_backend(mut self, backend: Arc<dyn CompilerBackend>) -> Self {
        self.unit = Arc::new(CompilationUnit::with_backend(
            &self.project_path,
            self.options.clone(),
            backend,
            self.reporter.clone(),
        ));
        self
    }

    pub fn src(&self) -> &Path {
        &self.src
    }

    /// `<src>/tsconfig.json`
    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn flags(&self) -> CompileFlags {
        self.flags
    }

    pub fn options(&self) -> &CompilerOptionsSet {
        &self.options
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Every file of the project, read from disk
    pub fn project_sources(&self) -> RecordStream {
        source_records(&self.src)
    }

    /// Build one pipeline invocation over `input`
    ///
    /// Must be called from within a tokio runtime. With a `token`, nothing is
    /// emitted unless the whole invocation completes uncancelled.
    pub fn pipeline(&self, token: Option<CancellationToken>, input: RecordStream) -> RecordStream {
        let build = self.flags.build;

        let mut stream = apply_transform(input, Arc::new(when(is_utf8_test, PreserveBom)));
        if !build {
            stream = apply_transform(stream, Arc::new(when(is_runtime_js, AppendSourceUrl)));
        }
        stream = apply_transform(stream, Arc::new(when(is_css, CssNesting)));

        let Partition {
            matched: typescript,
            held: others,
        } = partition(stream, is_typescript);
        let typescript = apply_transform(typescript, Arc::new(LoadSourceMaps));
        let compiled = self.unit.run(token.clone().unwrap_or_default(), typescript);

        let Partition {
            matched: emitted,
            held: declarations,
        } = partition(compiled, |record: &FileRecord| !is_declaration(record));
        let emitted = if build {
            apply_transform(emitted, Arc::new(Localize))
        } else {
            emitted
        };
        let mut compiled = declarations.restore(emitted);

        if !self.flags.transpile_only.is_enabled() {
            let writer = WriteSourceMaps {
                include_content: build,
                source_root: self.options.source_root.clone(),
            };
            compiled = apply_transform(compiled, Arc::new(writer));
        }

        let output = self.reporter.end(others.restore(compiled), self.flags.emit_error);
        match token {
            Some(token) => gate(output, token),
            None => output,
        }
    }
}
