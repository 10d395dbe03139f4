//! File records flowing through the pipeline
//!
//! A [`FileRecord`] is owned by exactly one stage at a time: stages receive it
//! by value from the upstream stream and hand it on by value, so a record can
//! never be mutated after it has been passed downstream.

use crate::error::{CoreError, CoreResult};
use crate::sourcemap::SourceMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A unit of data flowing through the pipeline
#[derive(Clone, PartialEq)]
pub struct FileRecord {
    /// Slash-normalized path relative to `base`
    path: String,
    /// Root directory the path is relative to
    base: PathBuf,
    pub contents: Vec<u8>,
    pub source_map: Option<SourceMap>,
}

impl FileRecord {
    pub fn new(base: impl Into<PathBuf>, path: impl AsRef<str>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: normalize_path(path.as_ref()),
            base: base.into(),
            contents: contents.into(),
            source_map: None,
        }
    }

    /// Read a file below `base` into a record
    pub fn read(base: &Path, file: &Path) -> CoreResult<Self> {
        let contents = std::fs::read(file).map_err(|e| CoreError::io(file, e))?;
        let relative = file.strip_prefix(base).unwrap_or(file);
        Ok(Self::new(base, relative.to_string_lossy(), contents))
    }

    /// The slash-normalized path relative to the base directory
    pub fn relative(&self) -> &str {
        &self.path
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Absolute (base-joined) location of this record
    pub fn absolute(&self) -> PathBuf {
        self.base.join(&self.path)
    }

    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        name.rfind('.').map(|idx| &name[idx + 1..])
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn has_suffix(&self, suffix: &str) -> bool {
        self.path.ends_with(suffix)
    }

    /// Move the record to a new relative path, keeping its base
    pub fn set_relative(&mut self, path: impl AsRef<str>) {
        self.path = normalize_path(path.as_ref());
    }

    /// Replace the extension (`a/b.ts` with `js` becomes `a/b.js`)
    pub fn with_extension(mut self, extension: &str) -> Self {
        let stem_end = self
            .path
            .rfind('.')
            .filter(|idx| !self.path[*idx..].contains('/'))
            .unwrap_or(self.path.len());
        self.path = format!("{}.{}", &self.path[..stem_end], extension);
        self
    }

    pub fn contents_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.contents).ok()
    }
}

impl fmt::Debug for FileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRecord")
            .field("path", &self.path)
            .field("base", &self.base)
            .field("bytes", &self.contents.len())
            .field("source_map", &self.source_map.is_some())
            .finish()
    }
}

/// Normalize separators to `/` and drop any leading `./`
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest.to_string();
    }
    normalized
}

/// Convert an absolute path into a `file://` URI
pub fn to_file_uri(path: &Path) -> String {
    let mut normalized = path.to_string_lossy().replace('\\', "/");
    // windows drive letters
    if normalized.len() > 1 && normalized.as_bytes()[1] == b':' {
        normalized = format!("/{}{}", normalized[..1].to_uppercase(), &normalized[1..]);
    }
    let encoded = normalized.replace(' ', "%20").replace('#', "%23");
    format!("file://{}", encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_windows_separators() {
        let record = FileRecord::new("/repo/src", "vs\\base\\common\\a.ts", "x");
        assert_eq!(record.relative(), "vs/base/common/a.ts");
        assert_eq!(record.file_name(), "a.ts");
        assert_eq!(record.extension(), Some("ts"));
    }

    #[test]
    fn test_with_extension() {
        let record = FileRecord::new("/repo", "a/b.ts", "").with_extension("js");
        assert_eq!(record.relative(), "a/b.js");

        let record = FileRecord::new("/repo", "dir.v2/README", "").with_extension("md");
        assert_eq!(record.relative(), "dir.v2/README.md");
    }

    #[test]
    fn test_file_uri() {
        assert_eq!(
            to_file_uri(Path::new("/repo/my src/a.ts")),
            "file:///repo/my%20src/a.ts"
        );
        assert_eq!(to_file_uri(Path::new("c:\\repo\\a.ts")), "file:///C:/repo/a.ts");
    }
}
