//! DeclarationGenerator against a scratch source tree

use sluice_codegen::{DeclarationError, DeclarationGenerator, ExecuteOutcome, GeneratorConfig};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const RECIPE: &str = "\
declare namespace monaco {

\t#include(vs/base/common/uri): URI
\t#include(vs/editor/common/standalone/enums): ScrollType
}
";

fn source_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "vs/monaco.d.ts.recipe", RECIPE);
    write(
        dir.path(),
        "vs/base/common/uri.ts",
        "export class URI {\n\treadonly scheme: string;\n\tprivate _formatted: string | null = null;\n\ttoString(): string {\n\t\treturn this.scheme;\n\t}\n}\n",
    );
    write(
        dir.path(),
        "vs/editor/common/standalone/enums.ts",
        "export const enum ScrollType {\n\tSmooth = 0,\n\tImmediate = 1\n}\n",
    );
    dir
}

fn write(root: &Path, path: &str, text: &str) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn watch_generator(root: &Path) -> DeclarationGenerator {
    DeclarationGenerator::new(GeneratorConfig {
        src_root: root.to_path_buf(),
        is_watch: true,
    })
}

#[test]
fn test_second_run_without_changes_writes_nothing() {
    let src = source_tree();
    let mut generator = watch_generator(src.path());

    assert!(matches!(generator.execute().unwrap(), ExecuteOutcome::Written { .. }));
    let declarations = fs::read_to_string(generator.declaration_path()).unwrap();
    assert!(declarations.contains("\texport class URI {"));
    assert!(declarations.contains("\t\ttoString(): string;"));
    assert!(!declarations.contains("_formatted"));

    let enums = fs::read_to_string(generator.enums_path()).unwrap();
    assert!(enums.contains("export enum ScrollType {"));

    assert_eq!(generator.execute().unwrap(), ExecuteOutcome::Unchanged);
}

#[test]
fn test_changed_module_is_reread_after_invalidation() {
    let src = source_tree();
    let mut generator = watch_generator(src.path());
    generator.execute().unwrap();

    let registered = generator.take_registrations();
    assert_eq!(registered.len(), 2);
    assert!(generator.take_registrations().is_empty());

    let (uri_path, module) = registered
        .iter()
        .find(|(_, module)| module == "vs/base/common/uri")
        .unwrap();
    assert_eq!(module, "vs/base/common/uri");

    write(
        src.path(),
        "vs/base/common/uri.ts",
        "export class URI {\n\treadonly scheme: string;\n\treadonly path: string;\n}\n",
    );
    // Unwatched files schedule nothing
    assert!(!generator.file_changed(&src.path().join("vs/other.ts")));
    assert!(generator.file_changed(uri_path));

    assert!(matches!(generator.execute().unwrap(), ExecuteOutcome::Written { .. }));
    let declarations = fs::read_to_string(generator.declaration_path()).unwrap();
    assert!(declarations.contains("\t\treadonly path: string;"));
    assert!(generator.file_changed(&generator.recipe_path()));
}

#[test]
fn test_build_mode_reports_stale_output_then_settles() {
    let src = source_tree();
    let mut generator = DeclarationGenerator::new(GeneratorConfig {
        src_root: src.path().to_path_buf(),
        is_watch: false,
    });

    let err = generator.execute().unwrap_err();
    assert!(matches!(err, DeclarationError::Stale));
    assert!(generator.declaration_path().is_file());
    assert!(generator.take_registrations().is_empty());

    assert_eq!(generator.execute().unwrap(), ExecuteOutcome::Unchanged);
}

#[test]
fn test_resolution_failure_depends_on_mode() {
    let src = source_tree();
    write(src.path(), "vs/monaco.d.ts.recipe", "#include(vs/base/common/missing): Nope\n");

    let mut watch = watch_generator(src.path());
    assert_eq!(watch.execute().unwrap(), ExecuteOutcome::Failed);

    let mut build = DeclarationGenerator::new(GeneratorConfig {
        src_root: src.path().to_path_buf(),
        is_watch: false,
    });
    let err = build.execute().unwrap_err();
    assert_eq!(err.to_string(), "monaco.d.ts generation error - Cannot continue");
}
