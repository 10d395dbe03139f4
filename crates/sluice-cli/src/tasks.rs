//! Build tasks: compile, transpile, watch, and the API proposal manifest

use crate::config::SluiceConfig;
use anyhow::{Context, Result};
use sluice_codegen::declarations::resolver::RECIPE_PATH;
use sluice_codegen::{generate_api_proposal_names, DeclarationError, DeclarationGenerator, GeneratorConfig};
use sluice_compiler::{
    create_compile, ensure_memory, rewrite_stage, CompileFlags, ContentRewriter, MemoryProbe, SystemMemory,
    TranspileOnly,
};
use sluice_core::fs::{source_records, write_records, WriteSummary};
use sluice_core::Reporter;
use sluice_daemon::{debounce, DeclarationService, Debounced, FileChange, FileWatcher, IncrementalBuild, WatcherConfig};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Folder holding the proposed API declarations, relative to the source root
pub const PROPOSALS_DIR: &str = "vscode-dts";

/// `<kind>-<basename of src>`, e.g. `compile-src`
pub fn task_name(kind: &str, src: &Path) -> String {
    let base = src
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| src.to_string_lossy().into_owned());
    format!("{}-{}", kind, base)
}

/// Whether `src` is the repository source folder that owns `monaco.d.ts`
fn is_repository_src(src: &Path) -> bool {
    src.file_name().is_some_and(|name| name == "src")
}

pub struct CompileTaskOptions {
    pub disable_mangle: bool,
    pub rewriter: Option<Arc<dyn ContentRewriter>>,
    pub memory: Arc<dyn MemoryProbe>,
}

impl Default for CompileTaskOptions {
    fn default() -> Self {
        Self {
            disable_mangle: false,
            rewriter: None,
            memory: Arc::new(SystemMemory),
        }
    }
}

/// Full compile of `src` into `out`
pub async fn compile_task(src: &Path, out: &Path, build: bool, options: CompileTaskOptions) -> Result<WriteSummary> {
    let name = task_name("compile", src);
    if build {
        ensure_memory(options.memory.as_ref()).with_context(|| format!("'{}' cannot start", name))?;
    }
    let started = Instant::now();

    let flags = CompileFlags {
        build,
        emit_error: true,
        transpile_only: TranspileOnly::No,
    };
    let compile = create_compile(src, flags, Reporter::named(&name))?;

    if is_repository_src(src) {
        let mut generator = DeclarationGenerator::new(GeneratorConfig {
            src_root: compile.src().to_path_buf(),
            is_watch: false,
        });
        match generator.execute() {
            Ok(outcome) => debug!("[monaco.d.ts] {:?}", outcome),
            Err(e @ DeclarationError::Stale) => return Err(e.into()),
            Err(e) => return Err(e).context("monaco.d.ts must be generated before compiling"),
        }
    }

    let mut input = compile.project_sources();
    if build && !options.disable_mangle {
        match options.rewriter {
            Some(rewriter) => input = rewrite_stage(input, rewriter),
            None => debug!("[mangler] no rewriter configured"),
        }
    }

    let output = compile.pipeline(None, input);
    let summary = write_records(output, out)
        .await
        .with_context(|| format!("'{}' failed", name))?;
    info!(
        "Finished '{}' after {} ms ({} files)",
        name,
        started.elapsed().as_millis(),
        summary.len()
    );
    Ok(summary)
}

/// Per-file transpilation of `src` into `out`, without type checking
pub async fn transpile_task(src: &Path, out: &Path, swc: bool) -> Result<WriteSummary> {
    let name = task_name("transpile", src);
    let flags = CompileFlags {
        build: false,
        emit_error: true,
        transpile_only: if swc { TranspileOnly::Swc } else { TranspileOnly::Yes },
    };
    let compile = create_compile(src, flags, Reporter::named(&name))?;

    let output = compile.pipeline(None, compile.project_sources());
    let summary = write_records(output, out)
        .await
        .with_context(|| format!("'{}' failed", name))?;
    info!("Finished '{}' ({} files)", name, summary.len());
    Ok(summary)
}

/// Rebuild `src` into `out` on every change until `shutdown`
///
/// `monaco.d.ts` is kept current alongside when `src` has a recipe.
pub async fn watch_task(src: &Path, out: &Path, build: bool, config: &SluiceConfig, shutdown: CancellationToken) -> Result<()> {
    let name = task_name("watch", src);
    let flags = CompileFlags {
        build,
        emit_error: false,
        transpile_only: TranspileOnly::No,
    };
    let compile = create_compile(src, flags, Reporter::named(&name))?;

    let (mut watcher, changes) = FileWatcher::new(WatcherConfig::default())?;
    watcher.watch(compile.src())?;

    let declarations = if compile.src().join(RECIPE_PATH).is_file() {
        let service = DeclarationService::new(compile.src())?.with_delay(config.debounce());
        Some(tokio::spawn(service.run(shutdown.clone())))
    } else {
        debug!("No recipe under {:?}, not generating monaco.d.ts", compile.src());
        None
    };

    info!("Starting '{}'", name);
    IncrementalBuild::new(compile, out)
        .with_read_delay(config.read_delay())
        .watch(changes, shutdown.clone())
        .await?;

    if let Some(handle) = declarations {
        shutdown.cancel();
        handle.await.context("declaration service panicked")??;
    }
    Ok(())
}

/// Write the API proposal manifest for `<src>/vscode-dts` into `src`
pub async fn compile_api_proposal_names(src: &Path) -> Result<WriteSummary> {
    let reporter = Reporter::named("api-proposal-names");
    let input = source_records(&src.join(PROPOSALS_DIR));
    let output = reporter.end(generate_api_proposal_names(input, src), true);
    write_records(output, src)
        .await
        .context("[api-proposal-names] failed to write the manifest")
}

/// Manifest regeneration driven by changes under the proposals folder
struct ProposalWatch {
    src: PathBuf,
}

impl Debounced for ProposalWatch {
    type Change = FileChange;

    fn accept(&mut self, change: FileChange) -> bool {
        change.path.starts_with(self.src.join(PROPOSALS_DIR))
    }

    fn run(&mut self) -> impl Future<Output = ()> + Send {
        let src = self.src.clone();
        async move {
            if let Err(e) = compile_api_proposal_names(&src).await {
                error!("{:#}", e);
            }
        }
    }
}

/// Regenerate the manifest once proposal changes settle
pub async fn watch_api_proposal_names(src: &Path, config: &SluiceConfig, shutdown: CancellationToken) -> Result<()> {
    compile_api_proposal_names(src).await?;

    let (mut watcher, mut changes) = FileWatcher::new(WatcherConfig::default())?;
    watcher.watch(src.join(PROPOSALS_DIR))?;

    let mut proposals = ProposalWatch { src: src.to_path_buf() };
    let runs = debounce(&mut proposals, &mut changes, config.debounce(), &shutdown).await;
    debug!("[api-proposal-names] stopped after {} regenerations", runs);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_names_use_the_source_basename() {
        assert_eq!(task_name("compile", Path::new("src")), "compile-src");
        assert_eq!(task_name("transpile", Path::new("/repo/extensions/git")), "transpile-git");
        assert_eq!(task_name("watch", Path::new("./build/lib/")), "watch-lib");
    }

    #[tokio::test(start_paused = true)]
    async fn test_proposal_burst_rewrites_manifest_once() {
        use sluice_codegen::PROPOSALS_MANIFEST;
        use sluice_daemon::FileChangeKind;
        use std::time::Duration;

        let src = tempfile::tempdir().unwrap();
        let dts = src.path().join(PROPOSALS_DIR);
        std::fs::create_dir_all(&dts).unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        for name in ["vscode.proposed.one.d.ts", "vscode.proposed.two.d.ts"] {
            std::fs::write(dts.join(name), "").unwrap();
            tx.send(FileChange::new(dts.join(name), FileChangeKind::Created)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(FileChange::new(src.path().join("vs/other.ts"), FileChangeKind::Modified))
            .await
            .unwrap();
        drop(tx);

        let mut proposals = ProposalWatch {
            src: src.path().to_path_buf(),
        };
        let runs = debounce(&mut proposals, &mut rx, Duration::from_millis(20), &CancellationToken::new()).await;
        assert_eq!(runs, 1);

        let manifest = std::fs::read_to_string(src.path().join(PROPOSALS_MANIFEST)).unwrap();
        assert!(manifest.contains("\tone: '"));
        assert!(manifest.contains("\ttwo: '"));
    }

    #[test]
    fn test_repository_src_detection() {
        assert!(is_repository_src(Path::new("src")));
        assert!(is_repository_src(Path::new("/repo/src")));
        assert!(!is_repository_src(Path::new("/repo/extensions/git")));
    }
}
