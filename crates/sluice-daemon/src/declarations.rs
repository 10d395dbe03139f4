//! Keeps `monaco.d.ts` current while sources change

use crate::debounce::{debounce, Debounced};
use crate::watcher::{FileChange, FileWatcher, WatchRegistry, WatcherConfig};
use anyhow::Result;
use sluice_codegen::{DeclarationGenerator, ExecuteOutcome, GeneratorConfig};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Delay between the last relevant change and regeneration
pub const DECLARATION_DEBOUNCE: Duration = Duration::from_millis(20);

/// A watch-mode generator together with the watches its inputs need
pub struct DeclarationWatch<W: WatchRegistry = FileWatcher> {
    generator: DeclarationGenerator,
    registry: W,
}

impl<W: WatchRegistry> DeclarationWatch<W> {
    pub fn new(generator: DeclarationGenerator, mut registry: W) -> Result<Self> {
        registry.watch_file(&generator.recipe_path())?;
        Ok(Self { generator, registry })
    }

    pub fn generator(&self) -> &DeclarationGenerator {
        &self.generator
    }

    pub fn registry(&self) -> &W {
        &self.registry
    }

    /// Generate once and watch every file read for the first time
    pub fn regenerate(&mut self) -> Option<ExecuteOutcome> {
        let outcome = match self.generator.execute() {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!("[monaco.d.ts] {}", e);
                None
            }
        };
        for (path, module_id) in self.generator.take_registrations() {
            if let Err(e) = self.registry.watch_file(&path) {
                warn!("[monaco.d.ts] cannot watch {} ({:?}): {:#}", module_id, path, e);
            }
        }
        outcome
    }
}

impl<W: WatchRegistry> Debounced for DeclarationWatch<W> {
    type Change = FileChange;

    fn accept(&mut self, change: FileChange) -> bool {
        self.generator.file_changed(&change.path)
    }

    fn run(&mut self) -> impl Future<Output = ()> + Send {
        self.regenerate();
        std::future::ready(())
    }
}

/// Long-running `monaco.d.ts` regeneration
pub struct DeclarationService {
    watch: DeclarationWatch<FileWatcher>,
    changes: mpsc::Receiver<FileChange>,
    delay: Duration,
}

impl DeclarationService {
    pub fn new(src_root: &Path) -> Result<Self> {
        let (watcher, changes) = FileWatcher::new(WatcherConfig::default())?;
        let generator = DeclarationGenerator::new(GeneratorConfig {
            src_root: src_root.to_path_buf(),
            is_watch: true,
        });
        Ok(Self {
            watch: DeclarationWatch::new(generator, watcher)?,
            changes,
            delay: DECLARATION_DEBOUNCE,
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Generate, then regenerate on changes until `token` is cancelled
    ///
    /// Resolution failures are logged and never end the service.
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        let DeclarationService {
            mut watch,
            mut changes,
            delay,
        } = self;

        info!("[monaco.d.ts] watching {:?}", watch.generator().recipe_path());
        watch.regenerate();
        let runs = debounce(&mut watch, &mut changes, delay, &token).await;
        info!("[monaco.d.ts] stopped after {} regenerations", runs);
        Ok(())
    }
}
