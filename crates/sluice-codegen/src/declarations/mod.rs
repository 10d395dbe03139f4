//! `monaco.d.ts` generation
//!
//! A [`DeclarationGenerator`] resolves `vs/monaco.d.ts.recipe` against the
//! source tree and rewrites `vs/monaco.d.ts` together with the standalone
//! enums file whenever the result differs from what is on disk. Scheduling
//! (watching and debouncing) belongs to the owner; the generator only keeps
//! track of which files each module was read from, so a change to one of them
//! invalidates exactly that module.

pub mod cache;
pub mod extract;
pub mod recipe;
pub mod resolver;

pub use resolver::{DeclarationResolver, DiskFs, FsProvider, RegisteringFs};

use crate::error::DeclarationError;
use sluice_core::fingerprint::ContentFingerprint;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Result of one resolution
#[derive(Debug, Clone)]
pub struct DeclarationArtifact {
    pub content: String,
    pub enums: String,
    pub fingerprint: ContentFingerprint,
    pub file_path: PathBuf,
    pub enums_path: PathBuf,
    /// Both outputs already match the files on disk
    pub is_the_same: bool,
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub src_root: PathBuf,
    pub is_watch: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    Unchanged,
    Written { elapsed: Duration },
    /// Resolution failed in watch mode; the error has been logged
    Failed,
}

pub struct DeclarationGenerator {
    config: GeneratorConfig,
    resolver: DeclarationResolver<RegisteringFs>,
    last: Option<ContentFingerprint>,
}

impl DeclarationGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let fs = RegisteringFs::new(config.is_watch);
        let resolver = DeclarationResolver::new(config.src_root.clone(), fs);
        Self {
            config,
            resolver,
            last: None,
        }
    }

    pub fn is_watch(&self) -> bool {
        self.config.is_watch
    }

    pub fn recipe_path(&self) -> PathBuf {
        self.resolver.recipe_path()
    }

    pub fn declaration_path(&self) -> PathBuf {
        self.config.src_root.join(resolver::DECLARATION_PATH)
    }

    pub fn enums_path(&self) -> PathBuf {
        self.config.src_root.join(resolver::ENUMS_PATH)
    }

    /// Fingerprint of the last successful resolution
    pub fn last_fingerprint(&self) -> Option<&ContentFingerprint> {
        self.last.as_ref()
    }

    /// Files read since the previous call, each with the module it backs
    pub fn take_registrations(&mut self) -> Vec<(PathBuf, String)> {
        self.resolver.fs_mut().take_pending()
    }

    /// Invalidate whatever `path` feeds; returns whether a run is due
    pub fn file_changed(&mut self, path: &Path) -> bool {
        if path == self.recipe_path() {
            return true;
        }
        let Some(module_id) = self.resolver.fs().files().module_for(path).map(str::to_string) else {
            return false;
        };
        debug!("[monaco.d.ts] {:?} changed, invalidating {}", path, module_id);
        self.resolver.invalidate_cache(&module_id);
        true
    }

    pub fn execute(&mut self) -> Result<ExecuteOutcome, DeclarationError> {
        let start = Instant::now();
        let artifact = match self.resolver.run() {
            Ok(artifact) => artifact,
            Err(e) => {
                error!("[monaco.d.ts] {}", e);
                if self.config.is_watch {
                    return Ok(ExecuteOutcome::Failed);
                }
                return Err(DeclarationError::GenerationFailed);
            }
        };

        let unchanged = artifact.is_the_same;
        self.last = Some(artifact.fingerprint.clone());
        if unchanged {
            return Ok(ExecuteOutcome::Unchanged);
        }

        write(&artifact.file_path, &artifact.content)?;
        write(&artifact.enums_path, &artifact.enums)?;
        let elapsed = start.elapsed();
        debug!("[monaco.d.ts] wrote generation {}", artifact.fingerprint.short_hash());
        info!("[monaco.d.ts] monaco.d.ts is changed - total time took {} ms", elapsed.as_millis());

        if !self.config.is_watch {
            return Err(DeclarationError::Stale);
        }
        Ok(ExecuteOutcome::Written { elapsed })
    }
}

fn write(path: &Path, contents: &str) -> Result<(), DeclarationError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DeclarationError::io(parent, e))?;
    }
    std::fs::write(path, contents).map_err(|e| DeclarationError::io(path, e))
}
