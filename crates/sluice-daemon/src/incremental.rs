//! Incremental rebuilds: one full pass, then one pass per batch of changes

use crate::watcher::{next_batch, FileChange, FileChangeKind};
use anyhow::Result;
use futures::stream;
use futures::StreamExt;
use sluice_compiler::Compile;
use sluice_core::fs::{write_records, WriteSummary};
use sluice_core::{FileRecord, RecordStream};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Quiet period collecting changes into one batch
pub const READ_DELAY: Duration = Duration::from_millis(200);

pub struct IncrementalBuild {
    compile: Arc<Compile>,
    out_dir: PathBuf,
    read_delay: Duration,
}

/// What a pass covers
#[derive(Debug, Clone, PartialEq, Eq)]
enum PassScope {
    Full,
    Paths(BTreeSet<PathBuf>),
}

impl PassScope {
    /// Union with a scope whose pass never completed
    fn absorb(self, unfinished: PassScope) -> PassScope {
        match (self, unfinished) {
            (PassScope::Paths(mut paths), PassScope::Paths(more)) => {
                paths.extend(more);
                PassScope::Paths(paths)
            }
            _ => PassScope::Full,
        }
    }
}

struct InFlight {
    scope: PassScope,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl IncrementalBuild {
    pub fn new(compile: Compile, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            compile: Arc::new(compile),
            out_dir: out_dir.into(),
            read_delay: READ_DELAY,
        }
    }

    pub fn with_read_delay(mut self, read_delay: Duration) -> Self {
        self.read_delay = read_delay;
        self
    }

    pub fn compile(&self) -> &Compile {
        &self.compile
    }

    /// Run the pipeline over `input` and write what it emits
    pub async fn run_pass(&self, input: RecordStream, token: CancellationToken) -> Result<WriteSummary> {
        pass(&self.compile, &self.out_dir, input, token).await
    }

    /// Full pass, then a pass per change batch until `shutdown`
    ///
    /// A new batch cancels the pass still running for the previous one and
    /// takes over its scope, so only complete passes reach the output
    /// directory and no change is lost.
    pub async fn watch(self, mut changes: mpsc::Receiver<FileChange>, shutdown: CancellationToken) -> Result<()> {
        let mut in_flight = self.spawn(PassScope::Full);

        loop {
            let batch = tokio::select! {
                _ = shutdown.cancelled() => break,
                batch = next_batch(&mut changes, self.read_delay) => batch,
            };
            let Some(batch) = batch else {
                break;
            };

            let mut scope = PassScope::Paths(changed_paths(self.compile.src(), &batch));
            if !in_flight.handle.is_finished() {
                in_flight.token.cancel();
                let _ = in_flight.handle.await;
                scope = scope.absorb(in_flight.scope);
            } else {
                let _ = in_flight.handle.await;
            }
            debug!("Change batch of {} paths, rebuilding {:?}", batch.len(), scope);
            in_flight = self.spawn(scope);
        }

        in_flight.token.cancel();
        let _ = in_flight.handle.await;
        info!("Watch stopped");
        Ok(())
    }

    fn spawn(&self, scope: PassScope) -> InFlight {
        let input = match &scope {
            PassScope::Full => self.compile.project_sources(),
            PassScope::Paths(paths) => {
                let src = self.compile.src().to_path_buf();
                let records: Vec<_> = paths.iter().map(|path| FileRecord::read(&src, path)).collect();
                stream::iter(records).boxed()
            }
        };
        let label = match scope {
            PassScope::Full => "full",
            PassScope::Paths(_) => "incremental",
        };

        let token = CancellationToken::new();
        let compile = self.compile.clone();
        let out_dir = self.out_dir.clone();
        let pass_token = token.clone();

        let handle = tokio::spawn(async move {
            match pass(&compile, &out_dir, input, pass_token.clone()).await {
                Ok(_) if pass_token.is_cancelled() => debug!("{} pass superseded", label),
                Ok(summary) => info!("Finished {} pass: {} files", label, summary.len()),
                Err(e) => error!("{} pass failed: {:#}", label, e),
            }
        });
        InFlight { scope, token, handle }
    }
}

async fn pass(compile: &Compile, out_dir: &Path, input: RecordStream, token: CancellationToken) -> Result<WriteSummary> {
    let output = compile.pipeline(Some(token), input);
    Ok(write_records(output, out_dir).await?)
}

/// Created or modified files of `batch` that live under `src`
fn changed_paths(src: &Path, batch: &[FileChange]) -> BTreeSet<PathBuf> {
    batch
        .iter()
        .filter(|change| change.kind != FileChangeKind::Removed)
        .filter(|change| change.path.starts_with(src) && change.path.is_file())
        .map(|change| change.path.clone())
        .collect()
}
