use crate::error::CoreResult;
use crate::record::FileRecord;
use crate::stream::RecordTransform;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Make sure a record starts with a UTF-8 byte order mark
///
/// Test fixtures that exercise BOM handling lose the mark on the way through
/// the compiler otherwise.
pub struct PreserveBom;

impl RecordTransform for PreserveBom {
    fn name(&self) -> &str {
        "bom"
    }

    fn apply(&self, mut record: FileRecord) -> CoreResult<Vec<FileRecord>> {
        if !record.contents.starts_with(UTF8_BOM) {
            let mut contents = Vec::with_capacity(record.contents.len() + UTF8_BOM.len());
            contents.extend_from_slice(UTF8_BOM);
            contents.append(&mut record.contents);
            record.contents = contents;
        }
        Ok(vec![record])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adds_bom_once() {
        let record = FileRecord::new("/src", "test/utf8.txt", "hello");
        let once = PreserveBom.apply(record).unwrap().remove(0);
        let twice = PreserveBom.apply(once.clone()).unwrap().remove(0);

        assert_eq!(&once.contents[..3], UTF8_BOM);
        assert_eq!(once.contents, twice.contents);
    }
}
