//! File system producers and sinks for record streams

use crate::error::{CoreError, CoreResult};
use crate::record::FileRecord;
use crate::stream::RecordStream;
use futures::stream;
use futures::StreamExt;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Walk `root` and produce one record per file, relative to `root`
///
/// Files are read lazily as the stream is polled, in sorted path order.
pub fn source_records(root: &Path) -> RecordStream {
    let base = root.to_path_buf();
    let files: Vec<CoreResult<PathBuf>> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_file() => Some(Ok(entry.into_path())),
            Ok(_) => None,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| base.clone());
                Some(Err(CoreError::io(path, e.into())))
            }
        })
        .collect();

    debug!("Walked {} entries under {:?}", files.len(), root);

    stream::iter(files)
        .map(move |file| file.and_then(|path| FileRecord::read(&base, &path)))
        .boxed()
}

/// Records written by [`write_records`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteSummary {
    pub written: Vec<String>,
}

impl WriteSummary {
    pub fn len(&self) -> usize {
        self.written.len()
    }

    pub fn is_empty(&self) -> bool {
        self.written.is_empty()
    }
}

/// Write every record to `<out_dir>/<relative path>`
///
/// The first stream error aborts the write; a second record with an already
/// written path is rejected.
pub async fn write_records(mut input: RecordStream, out_dir: &Path) -> CoreResult<WriteSummary> {
    let mut seen = HashSet::new();
    let mut summary = WriteSummary::default();

    while let Some(item) = input.next().await {
        let record = item?;
        if !seen.insert(record.relative().to_string()) {
            return Err(CoreError::DuplicatePath(record.relative().to_string()));
        }

        let target = out_dir.join(record.relative());
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::io(parent, e))?;
        }
        tokio::fs::write(&target, &record.contents)
            .await
            .map_err(|e| CoreError::io(&target, e))?;
        summary.written.push(record.relative().to_string());
    }

    info!("Wrote {} files to {:?}", summary.len(), out_dir);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::from_records;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_walk_and_write() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        std::fs::create_dir_all(src.path().join("vs/base")).unwrap();
        std::fs::write(src.path().join("vs/base/a.ts"), "let a = 1;").unwrap();
        std::fs::write(src.path().join("readme.md"), "# hi").unwrap();

        let summary = write_records(source_records(src.path()), out.path())
            .await
            .unwrap();

        assert_eq!(summary.written, vec!["readme.md", "vs/base/a.ts"]);
        assert_eq!(
            std::fs::read_to_string(out.path().join("vs/base/a.ts")).unwrap(),
            "let a = 1;"
        );
    }

    #[tokio::test]
    async fn test_duplicate_paths_are_rejected() {
        let out = TempDir::new().unwrap();
        let input = from_records(vec![
            FileRecord::new("/src", "a.js", "1"),
            FileRecord::new("/other", "a.js", "2"),
        ]);
        let err = write_records(input, out.path()).await.unwrap_err();
        assert!(matches!(err, CoreError::DuplicatePath(p) if p == "a.js"));
    }
}
