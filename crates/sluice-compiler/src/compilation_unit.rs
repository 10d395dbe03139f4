//! A reusable compilation unit bound to one project and one option set
//!
//! The unit is built once per pipeline and invoked on every pass, so whatever
//! the backend caches stays warm across watch cycles.

use crate::backend::{CompileOutput, CompilerBackend, TscBackend};
use futures::stream;
use futures::StreamExt;
use sluice_core::stream::RecordStream;
use sluice_core::{CompilerOptionsSet, CoreError, FileRecord, Reporter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How the unit should turn TypeScript into JavaScript
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilationSettings {
    pub transpile_only: bool,
    pub transpile_with_swc: bool,
    pub verbose: bool,
}

pub struct CompilationUnit {
    project_path: PathBuf,
    options: Arc<CompilerOptionsSet>,
    backend: Arc<dyn CompilerBackend>,
    reporter: Reporter,
}

impl CompilationUnit {
    /// Pick a backend for `settings`
    pub fn new(
        project_path: impl Into<PathBuf>,
        options: Arc<CompilerOptionsSet>,
        settings: CompilationSettings,
        reporter: Reporter,
    ) -> Self {
        let project_path = project_path.into();
        let backend = select_backend(&project_path, settings);
        if settings.verbose {
            info!("Compiling {:?} with {}", project_path, backend.name());
        }
        Self::with_backend(project_path, options, backend, reporter)
    }

    pub fn with_backend(
        project_path: impl Into<PathBuf>,
        options: Arc<CompilerOptionsSet>,
        backend: Arc<dyn CompilerBackend>,
        reporter: Reporter,
    ) -> Self {
        Self {
            project_path: project_path.into(),
            options,
            backend,
            reporter,
        }
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn options(&self) -> &CompilerOptionsSet {
        &self.options
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Compile everything `input` yields
    ///
    /// The whole input is drained before the backend runs. If `token` is
    /// cancelled at any point before the outputs are released, the stream
    /// ends without emitting anything.
    pub fn run(&self, token: CancellationToken, input: RecordStream) -> RecordStream {
        let backend = self.backend.clone();
        let options = self.options.clone();
        let reporter = self.reporter.clone();

        stream::once(async move {
            let mut records = Vec::new();
            let mut input = input;
            while let Some(item) = input.next().await {
                match item {
                    Ok(record) => records.push(record),
                    Err(e) => return vec![Err(e)],
                }
            }
            if token.is_cancelled() {
                debug!("Compilation cancelled before it started");
                return Vec::new();
            }

            let name = backend.name().to_string();
            let worker_token = token.clone();
            let joined = tokio::task::spawn_blocking(move || backend.compile(&records, &options, &worker_token)).await;

            let output: CompileOutput = match joined {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => return vec![Err(CoreError::stage(name, e.to_string()))],
                Err(e) => return vec![Err(CoreError::Stream(format!("{} worker failed: {}", name, e)))],
            };

            for diagnostic in output.diagnostics {
                reporter.report(diagnostic);
            }
            if token.is_cancelled() {
                debug!("Compilation cancelled, dropping {} outputs", output.records.len());
                return Vec::new();
            }
            output.records.into_iter().map(Ok).collect::<Vec<Result<FileRecord, CoreError>>>()
        })
        .flat_map(stream::iter)
        .boxed()
    }
}

fn select_backend(project_path: &Path, settings: CompilationSettings) -> Arc<dyn CompilerBackend> {
    if settings.transpile_with_swc {
        if let Some(backend) = swc_backend() {
            return backend;
        }
    }
    Arc::new(TscBackend::new(project_path, !settings.transpile_only))
}

#[cfg(feature = "swc")]
fn swc_backend() -> Option<Arc<dyn CompilerBackend>> {
    Some(Arc::new(crate::backend::SwcBackend))
}

#[cfg(not(feature = "swc"))]
fn swc_backend() -> Option<Arc<dyn CompilerBackend>> {
    tracing::warn!("swc support is not compiled in, transpiling with tsc");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileResult;
    use sluice_core::stream::{collect_records, from_records};
    use sluice_core::Diagnostic;

    struct Echo;

    impl CompilerBackend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn compile(
            &self,
            inputs: &[FileRecord],
            _options: &CompilerOptionsSet,
            _token: &CancellationToken,
        ) -> CompileResult<CompileOutput> {
            Ok(CompileOutput {
                records: inputs.iter().map(|r| r.clone().with_extension("js")).collect(),
                diagnostics: vec![Diagnostic::error("unused").at("a.ts", 1, 1)],
            })
        }
    }

    fn unit(reporter: Reporter) -> CompilationUnit {
        let options = CompilerOptionsSet::for_source(Path::new("/src"), None);
        CompilationUnit::with_backend("/src/tsconfig.json", Arc::new(options), Arc::new(Echo), reporter)
    }

    #[test]
    fn test_backend_selection() {
        let options = Arc::new(CompilerOptionsSet::for_source(Path::new("/src"), None));
        let full = CompilationUnit::new("/src/tsconfig.json", options.clone(), CompilationSettings::default(), Reporter::new());
        assert_eq!(full.backend_name(), "tsc");

        let settings = CompilationSettings {
            transpile_only: true,
            ..Default::default()
        };
        let transpile = CompilationUnit::new("/src/tsconfig.json", options, settings, Reporter::new());
        assert_eq!(transpile.backend_name(), "tsc-transpile");
    }

    #[tokio::test]
    async fn test_outputs_and_diagnostics() {
        let reporter = Reporter::new();
        let out = unit(reporter.clone()).run(
            CancellationToken::new(),
            from_records(vec![FileRecord::new("/src", "a.ts", "")]),
        );
        let records = collect_records(out).await.unwrap();
        assert_eq!(records[0].relative(), "a.js");
        assert_eq!(reporter.error_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_emits_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let out = unit(Reporter::new()).run(token, from_records(vec![FileRecord::new("/src", "a.ts", "")]));
        assert!(collect_records(out).await.unwrap().is_empty());
    }
}
