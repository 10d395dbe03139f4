//! Task-level behavior that needs no compiler on the host

use pretty_assertions::assert_eq;
use sluice::{compile_api_proposal_names, compile_task, CompileTaskOptions};
use sluice_codegen::PROPOSALS_MANIFEST;
use sluice_compiler::memory::FixedMemory;
use sluice_compiler::CompileError;
use std::fs;
use std::sync::Arc;

#[tokio::test]
async fn test_low_memory_build_fails_before_touching_disk() {
    let root = tempfile::tempdir().unwrap();
    let src = root.path().join("src");
    let out = root.path().join("out-build");

    let options = CompileTaskOptions {
        memory: Arc::new(FixedMemory(3_999_999_999)),
        ..Default::default()
    };
    let err = compile_task(&src, &out, true, options).await.unwrap_err();

    let cause = err.downcast_ref::<CompileError>().unwrap();
    assert!(matches!(cause, CompileError::InsufficientMemory { total: 3_999_999_999 }));
    assert_eq!(cause.to_string(), "compilation requires 4GB of RAM");
    assert!(!src.exists());
    assert!(!out.exists());
}

#[tokio::test]
async fn test_proposal_manifest_lists_sorted_names() {
    let src = tempfile::tempdir().unwrap();
    let dts = src.path().join("vscode-dts");
    fs::create_dir_all(&dts).unwrap();
    for name in ["vscode.proposed.b.d.ts", "vscode.proposed.a.d.ts", "vscode.d.ts"] {
        fs::write(dts.join(name), "declare module 'vscode' {}\n").unwrap();
    }

    let summary = compile_api_proposal_names(src.path()).await.unwrap();
    assert_eq!(summary.written, vec![PROPOSALS_MANIFEST.to_string()]);

    let manifest = fs::read_to_string(src.path().join(PROPOSALS_MANIFEST)).unwrap();
    let a = manifest.find("\ta: '").unwrap();
    let b = manifest.find("\tb: '").unwrap();
    assert!(a < b);
    assert_eq!(manifest.matches("vscode.proposed.").count(), 2);
}
