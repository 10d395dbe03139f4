//! Watch-mode services for sluice

pub mod debounce;
pub mod declarations;
pub mod incremental;
pub mod watcher;

pub use debounce::{debounce, DebounceState, Debounced, Debouncer};
pub use declarations::{DeclarationService, DeclarationWatch, DECLARATION_DEBOUNCE};
pub use incremental::{IncrementalBuild, READ_DELAY};
pub use watcher::{next_batch, FileChange, FileChangeKind, FileWatcher, WatchRegistry, WatcherConfig};
