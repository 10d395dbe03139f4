//! File system watcher feeding change events into a tokio channel

use anyhow::{Context, Result};
use dashmap::DashMap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// File change event
#[derive(Debug, Clone)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: FileChangeKind,
    pub timestamp: Instant,
}

impl FileChange {
    pub fn new(path: impl Into<PathBuf>, kind: FileChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            timestamp: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    Created,
    Modified,
    Removed,
}

/// Configuration for the file watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Repeated events for one path inside this window are dropped
    pub dedupe_window: Duration,
    /// File extensions to report; empty reports everything
    pub extensions: Vec<String>,
    /// Directories to ignore
    pub ignore_dirs: Vec<String>,
    /// Maximum events to buffer
    pub buffer_size: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            dedupe_window: Duration::from_millis(5),
            extensions: Vec::new(),
            ignore_dirs: vec![".git".to_string(), "node_modules".to_string(), ".build".to_string()],
            buffer_size: 1000,
        }
    }
}

/// Registration of individual files with a watcher
pub trait WatchRegistry {
    fn watch_file(&mut self, path: &Path) -> Result<()>;
}

/// What a watcher reports
///
/// Single files are watched through their parent directory, so a file replaced
/// by a rename keeps being reported. Events for a directory's other entries
/// are dropped unless a recursive watch covers them.
#[derive(Debug, Default)]
struct WatchScope {
    roots: Vec<PathBuf>,
    files: HashSet<PathBuf>,
}

impl WatchScope {
    fn reports(&self, path: &Path, config: &WatcherConfig) -> bool {
        if self.files.contains(path) {
            return true;
        }
        self.roots.iter().any(|root| path.starts_with(root)) && !should_ignore(path, config)
    }
}

/// notify-backed watcher; events arrive on the receiver returned by [`FileWatcher::new`]
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    scope: Arc<std::sync::RwLock<WatchScope>>,
    file_dirs: HashSet<PathBuf>,
    watched: usize,
}

impl FileWatcher {
    pub fn new(config: WatcherConfig) -> Result<(Self, mpsc::Receiver<FileChange>)> {
        let (tx, rx) = mpsc::channel(config.buffer_size);
        let last_seen: Arc<DashMap<PathBuf, Instant>> = Arc::new(DashMap::new());
        let scope = Arc::new(std::sync::RwLock::new(WatchScope::default()));

        let filter = scope.clone();
        let watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => match filter.read() {
                    Ok(scope) => handle_event(event, &tx, &last_seen, &scope, &config),
                    Err(_) => warn!("Watch scope unavailable, dropping event"),
                },
                Err(e) => warn!("Watch error: {}", e),
            },
            Config::default(),
        )
        .context("Failed to create file watcher")?;

        let watcher = Self {
            watcher,
            scope,
            file_dirs: HashSet::new(),
            watched: 0,
        };
        Ok((watcher, rx))
    }

    fn update_scope(&self, update: impl FnOnce(&mut WatchScope)) -> Result<()> {
        let mut scope = self
            .scope
            .write()
            .map_err(|_| anyhow::anyhow!("watch scope lock poisoned"))?;
        update(&mut scope);
        Ok(())
    }

    /// Watch a directory tree
    pub fn watch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!("Watching path: {:?}", path);

        self.watcher
            .watch(path, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch path: {:?}", path))?;
        self.update_scope(|scope| scope.roots.push(path.to_path_buf()))?;
        self.watched += 1;
        Ok(())
    }

    pub fn unwatch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.watcher
            .unwatch(path)
            .with_context(|| format!("Failed to unwatch path: {:?}", path))?;
        self.update_scope(|scope| scope.roots.retain(|root| root != path))?;
        self.watched = self.watched.saturating_sub(1);
        Ok(())
    }

    /// Number of active watches
    pub fn len(&self) -> usize {
        self.watched
    }

    pub fn is_empty(&self) -> bool {
        self.watched == 0
    }
}

impl WatchRegistry for FileWatcher {
    fn watch_file(&mut self, path: &Path) -> Result<()> {
        debug!("Watching file: {:?}", path);
        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        if !self.file_dirs.contains(dir) {
            self.watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch directory of {:?}", path))?;
            self.file_dirs.insert(dir.to_path_buf());
        }

        let canonical = path.canonicalize().ok();
        self.update_scope(|scope| {
            scope.files.insert(path.to_path_buf());
            scope.files.extend(canonical);
        })?;
        self.watched += 1;
        Ok(())
    }
}

/// Wait for a change, then gather everything that arrives within `read_delay`
///
/// Returns `None` once the channel is closed and drained. Each path appears at
/// most once in a batch, carrying its latest event.
pub async fn next_batch(changes: &mut mpsc::Receiver<FileChange>, read_delay: Duration) -> Option<Vec<FileChange>> {
    let first = changes.recv().await?;
    let deadline = tokio::time::Instant::now() + read_delay;

    let mut order = vec![first.path.clone()];
    let mut latest = HashMap::from([(first.path.clone(), first)]);
    while let Ok(Some(change)) = tokio::time::timeout_at(deadline, changes.recv()).await {
        if !latest.contains_key(&change.path) {
            order.push(change.path.clone());
        }
        latest.insert(change.path.clone(), change);
    }

    Some(order.into_iter().filter_map(|path| latest.remove(&path)).collect())
}

fn handle_event(
    event: Event,
    tx: &mpsc::Sender<FileChange>,
    last_seen: &DashMap<PathBuf, Instant>,
    scope: &WatchScope,
    config: &WatcherConfig,
) {
    use notify::EventKind;

    let kind = match event.kind {
        EventKind::Create(_) => FileChangeKind::Created,
        EventKind::Modify(_) => FileChangeKind::Modified,
        EventKind::Remove(_) => FileChangeKind::Removed,
        _ => return,
    };

    for path in event.paths {
        if !scope.reports(&path, config) || should_dedupe(&path, last_seen, config.dedupe_window) {
            continue;
        }
        if let Err(e) = tx.try_send(FileChange::new(path, kind)) {
            warn!("Failed to send file change event: {}", e);
        }
    }
}

fn should_ignore(path: &Path, config: &WatcherConfig) -> bool {
    let ignored_dir = path
        .components()
        .any(|c| config.ignore_dirs.iter().any(|dir| c.as_os_str() == dir.as_str()));
    if ignored_dir {
        return true;
    }
    if config.extensions.is_empty() {
        return false;
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => !config.extensions.iter().any(|wanted| wanted == ext),
        None => true,
    }
}

fn should_dedupe(path: &Path, last_seen: &DashMap<PathBuf, Instant>, window: Duration) -> bool {
    let now = Instant::now();
    if let Some(seen) = last_seen.get(path) {
        if now.duration_since(*seen) < window {
            return true;
        }
    }
    last_seen.insert(path.to_path_buf(), now);
    false
}
