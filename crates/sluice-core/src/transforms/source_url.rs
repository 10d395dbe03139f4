use crate::error::CoreResult;
use crate::record::{to_file_uri, FileRecord};
use crate::stream::RecordTransform;

/// Append a `//# sourceURL=` comment naming the record's own location
pub struct AppendSourceUrl;

impl RecordTransform for AppendSourceUrl {
    fn name(&self) -> &str {
        "source-url"
    }

    fn apply(&self, mut record: FileRecord) -> CoreResult<Vec<FileRecord>> {
        let comment = format!("\n//# sourceURL={}", to_file_uri(&record.absolute()));
        record.contents.extend_from_slice(comment.as_bytes());
        Ok(vec![record])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_own_path() {
        let record = FileRecord::new("/repo/src", "vs/loader.js", "define();");
        let out = AppendSourceUrl.apply(record).unwrap().remove(0);
        assert_eq!(
            out.contents_str().unwrap(),
            "define();\n//# sourceURL=file:///repo/src/vs/loader.js"
        );
    }
}
