//! Core records, stream combinators and per-file transforms for sluice

pub mod error;
pub mod fingerprint;
pub mod fs;
pub mod mappings;
pub mod options;
pub mod record;
pub mod reporter;
pub mod sourcemap;
pub mod stream;
pub mod transforms;

pub use error::{CoreError, CoreResult};
pub use options::{CompilerOptionsSet, NewLine};
pub use record::FileRecord;
pub use reporter::{Diagnostic, Reporter, Severity};
pub use sourcemap::SourceMap;
pub use stream::{HeldRecords, Partition, RecordStream, RecordTransform};
