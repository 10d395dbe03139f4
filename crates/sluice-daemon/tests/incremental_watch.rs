//! Watch loop driven by a synthetic change feed

use sluice_compiler::{create_compile, CompileFlags, CompileOutput, CompileResult, CompilerBackend, TranspileOnly};
use sluice_core::{CompilerOptionsSet, FileRecord, Reporter};
use sluice_daemon::{FileChange, FileChangeKind, IncrementalBuild};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Copies every source to `<name>.js`
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
            diagnostics: Vec::new(),
        })
    }
}

async fn wait_for(path: &Path) -> bool {
    for _ in 0..250 {
        if path.is_file() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_initial_pass_then_changed_files() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    std::fs::write(src.path().join("a.ts"), "export const a = 1;").unwrap();

    let flags = CompileFlags {
        transpile_only: TranspileOnly::Yes,
        ..Default::default()
    };
    let compile = create_compile(src.path(), flags, Reporter::new())
        .unwrap()
        .with_backend(Arc::new(Echo));
    let src_root = compile.src().to_path_buf();

    let (tx, rx) = mpsc::channel(8);
    let shutdown = CancellationToken::new();
    let build = IncrementalBuild::new(compile, out.path()).with_read_delay(Duration::from_millis(20));
    let task = tokio::spawn(build.watch(rx, shutdown.clone()));

    assert!(wait_for(&out.path().join("a.js")).await);
    assert!(!out.path().join("b.js").exists());

    std::fs::write(src_root.join("b.ts"), "export const b = 2;").unwrap();
    tx.send(FileChange::new(src_root.join("b.ts"), FileChangeKind::Created))
        .await
        .unwrap();
    assert!(wait_for(&out.path().join("b.js")).await);

    shutdown.cancel();
    task.await.unwrap().unwrap();
}
