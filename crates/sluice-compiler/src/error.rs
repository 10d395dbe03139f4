use sluice_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("compilation requires 4GB of RAM")]
    InsufficientMemory { total: u64 },

    #[error("Invalid source folder: {0:?}")]
    InvalidSource(PathBuf),

    #[error("Found {errors} errors")]
    Diagnostics { errors: usize },

    #[error("Compiler backend '{backend}' failed: {message}")]
    Backend { backend: String, message: String },

    #[error(transparent)]
    Core(CoreError),

    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        CompileError::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CompileError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<CoreError> for CompileError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Diagnostics { errors } => CompileError::Diagnostics { errors },
            other => CompileError::Core(other),
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
