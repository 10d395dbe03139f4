use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Duplicate output path: {0}")]
    DuplicatePath(String),

    #[error("Invalid source map for {path}: {message}")]
    SourceMap { path: String, message: String },

    #[error("Invalid stylesheet {path}: {message}")]
    Stylesheet { path: String, message: String },

    #[error("Transform '{transform}' failed on {path}: {message}")]
    Transform {
        transform: String,
        path: String,
        message: String,
    },

    #[error("[{stage}] {message}")]
    Stage { stage: String, message: String },

    #[error("Found {errors} errors")]
    Diagnostics { errors: usize },

    #[error("Stream failed: {0}")]
    Stream(String),
}

impl CoreError {
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
