use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeclarationError {
    #[error("monaco.d.ts generation error - Cannot continue")]
    GenerationFailed,

    #[error("monaco.d.ts is no longer up to date. Please run the watch task and commit the new file.")]
    Stale,

    #[error("Cannot resolve {module}: {message}")]
    Resolution { module: String, message: String },

    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DeclarationError {
    pub fn resolution(module: impl Into<String>, message: impl Into<String>) -> Self {
        DeclarationError::Resolution {
            module: module.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DeclarationError::Io {
            path: path.into(),
            source,
        }
    }
}
