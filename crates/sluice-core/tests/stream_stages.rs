//! Integration tests for predicate-guarded stages and partition round trips

use proptest::prelude::*;
use sluice_core::stream::{apply_transform, collect_records, from_records, partition, when, Partition};
use sluice_core::transforms::{is_css, is_typescript, CssNesting, PreserveBom};
use sluice_core::FileRecord;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_css_nesting_applies_once_and_skips_fixtures() {
    let nested = ".a {\n\t.b { color: red; }\n}\n";
    let input = from_records(vec![
        FileRecord::new("/src", "vs/a.css", nested),
        FileRecord::new("/src", "vs/test/fixtures/a.css", nested),
    ]);

    let stage = Arc::new(when(is_css, CssNesting));
    let once = collect_records(apply_transform(input, stage.clone())).await.unwrap();

    assert!(once[0].contents_str().unwrap().contains(".a .b"));
    assert_eq!(once[1].contents_str().unwrap(), nested);

    // Flattened output has no nesting left, so a second pass is a no-op
    let twice = collect_records(apply_transform(from_records(once.clone()), stage))
        .await
        .unwrap();
    assert_eq!(twice, once);
}

#[tokio::test]
async fn test_bom_only_added_when_missing() {
    let mut with_bom = vec![0xEF, 0xBB, 0xBF];
    with_bom.extend_from_slice(b"hello");
    let input = from_records(vec![
        FileRecord::new("/repo/src", "vs/test/utf8/a.txt", "hello"),
        FileRecord::new("/repo/src", "vs/test/utf8/b.txt", with_bom.clone()),
    ]);

    let out = collect_records(apply_transform(input, Arc::new(PreserveBom)))
        .await
        .unwrap();
    assert_eq!(out[0].contents, with_bom);
    assert_eq!(out[1].contents, with_bom);
}

fn path_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        ("[a-z]{1,6}", prop::sample::select(vec!["ts", "d.ts", "js", "css", "svg"]))
            .prop_map(|(stem, ext)| format!("{}.{}", stem, ext)),
        0..24,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_nested_partitions_keep_every_record(paths in path_strategy()) {
        let records: Vec<FileRecord> = paths
            .iter()
            .enumerate()
            .map(|(i, p)| FileRecord::new("/src", format!("{}/{}", i, p), p.as_bytes().to_vec()))
            .collect();

        let out = runtime().block_on(async {
            let Partition { matched: ts, held: others } = partition(from_records(records.clone()), is_typescript);
            let Partition { matched: sources, held: declarations } =
                partition(ts, |r: &FileRecord| !r.has_suffix(".d.ts"));
            let ts = declarations.restore(sources);
            collect_records(others.restore(ts)).await.unwrap()
        });

        let mut expected: Vec<_> = records.iter().map(|r| r.relative().to_string()).collect();
        let mut actual: Vec<_> = out.iter().map(|r| r.relative().to_string()).collect();
        expected.sort();
        actual.sort();
        prop_assert_eq!(actual, expected);

        // Held records keep their relative order
        let held_in: Vec<_> = records.iter().filter(|r| !is_typescript(r)).map(|r| r.relative()).collect();
        let held_out: Vec<_> = out.iter().filter(|r| !is_typescript(r)).map(|r| r.relative()).collect();
        prop_assert_eq!(held_out, held_in);
    }
}
