//! Loading source maps onto records and writing them back out as files

use crate::error::{CoreError, CoreResult};
use crate::record::FileRecord;
use crate::sourcemap::{strip_mapping_url, MappingUrl, SourceMap};
use crate::stream::RecordTransform;
use tracing::trace;

/// Attach an existing inline or external source map to each record
///
/// The `sourceMappingURL` comment is removed from the contents. Records without
/// one get a map naming the record itself, with its current text as content.
pub struct LoadSourceMaps;

impl RecordTransform for LoadSourceMaps {
    fn name(&self) -> &str {
        "load-sourcemaps"
    }

    fn apply(&self, mut record: FileRecord) -> CoreResult<Vec<FileRecord>> {
        if record.source_map.is_some() {
            return Ok(vec![record]);
        }
        let Some(text) = record.contents_str() else {
            return Ok(vec![record]);
        };

        let (stripped, found) = strip_mapping_url(text);
        let map = match found {
            None => SourceMap::identity(record.relative(), Some(text)),
            Some(MappingUrl::Inline(map)) => map,
            Some(MappingUrl::External(url)) => {
                let absolute = record.absolute();
                let location = absolute.parent().unwrap_or(record.base()).join(&url);
                let json = std::fs::read_to_string(&location).map_err(|e| CoreError::io(&location, e))?;
                SourceMap::from_json(&json).map_err(|e| CoreError::SourceMap {
                    path: record.relative().to_string(),
                    message: e.to_string(),
                })?
            }
        };

        trace!("Loaded source map for {}", record.relative());
        record.contents = stripped.into_bytes();
        record.source_map = Some(map);
        Ok(vec![record])
    }
}

/// Write each record's source map as a sibling `.map` record
///
/// No `sourceMappingURL` comment is added to the record itself.
pub struct WriteSourceMaps {
    pub include_content: bool,
    pub source_root: String,
}

impl RecordTransform for WriteSourceMaps {
    fn name(&self) -> &str {
        "write-sourcemaps"
    }

    fn apply(&self, mut record: FileRecord) -> CoreResult<Vec<FileRecord>> {
        let Some(mut map) = record.source_map.take() else {
            return Ok(vec![record]);
        };

        map.file = Some(record.file_name().to_string());
        map.source_root = Some(self.source_root.clone());
        if !self.include_content {
            map.sources_content = None;
        }

        let map_path = format!("{}.map", record.relative());
        let map_record = FileRecord::new(record.base(), map_path, map.to_json());
        Ok(vec![record, map_record])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_identity_map_for_plain_file() {
        let record = FileRecord::new("/src", "vs/a.ts", "let a = 1;");
        let out = LoadSourceMaps.apply(record).unwrap().remove(0);
        let map = out.source_map.unwrap();
        assert_eq!(map.sources, vec!["vs/a.ts"]);
        assert_eq!(map.sources_content, Some(vec![Some("let a = 1;".to_string())]));
    }

    #[test]
    fn test_external_map_is_read_relative_to_record() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("vs")).unwrap();
        std::fs::write(
            dir.path().join("vs/a.ts.map"),
            r#"{"version":3,"sources":["orig.ts"],"names":[],"mappings":"AAAA"}"#,
        )
        .unwrap();

        let record = FileRecord::new(dir.path(), "vs/a.ts", "x;\n//# sourceMappingURL=a.ts.map\n");
        let out = LoadSourceMaps.apply(record).unwrap().remove(0);
        assert_eq!(out.contents_str().unwrap(), "x;\n");
        assert_eq!(out.source_map.unwrap().sources, vec!["orig.ts"]);
    }

    #[test]
    fn test_missing_external_map_is_an_error() {
        let record = FileRecord::new("/nowhere", "a.ts", "//# sourceMappingURL=gone.map\n");
        assert!(LoadSourceMaps.apply(record).is_err());
    }

    #[test]
    fn test_write_emits_sibling_map() {
        let mut record = FileRecord::new("/src", "vs/a.js", "var a;");
        record.source_map = Some(SourceMap::identity("vs/a.ts", Some("let a;")));

        let writer = WriteSourceMaps {
            include_content: false,
            source_root: "file:///src".to_string(),
        };
        let out = writer.apply(record).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].contents_str().unwrap(), "var a;");
        assert!(out[0].source_map.is_none());
        assert_eq!(out[1].relative(), "vs/a.js.map");

        let map = SourceMap::from_json(out[1].contents_str().unwrap()).unwrap();
        assert_eq!(map.file.as_deref(), Some("a.js"));
        assert_eq!(map.source_root.as_deref(), Some("file:///src"));
        assert!(map.sources_content.is_none());
    }
}
