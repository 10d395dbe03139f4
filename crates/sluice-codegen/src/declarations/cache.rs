//! Module cache and watched-file registry owned by the declaration resolver

use super::extract::ModuleDeclarations;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone)]
enum SlotState {
    Cached(Arc<ModuleDeclarations>),
    Invalidated,
}

/// One module's cache entry
///
/// Slots are never removed, only invalidated. `generation` counts how many
/// times the slot has been filled or cleared.
#[derive(Debug, Clone)]
pub struct CacheSlot {
    state: SlotState,
    generation: u64,
}

impl CacheSlot {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cached(&self) -> bool {
        matches!(self.state, SlotState::Cached(_))
    }
}

/// Parsed declarations by module id
#[derive(Debug, Default)]
pub struct ModuleCache {
    slots: HashMap<String, CacheSlot>,
}

impl ModuleCache {
    pub fn get(&self, module_id: &str) -> Option<Arc<ModuleDeclarations>> {
        match &self.slots.get(module_id)?.state {
            SlotState::Cached(declarations) => Some(declarations.clone()),
            SlotState::Invalidated => None,
        }
    }

    pub fn insert(&mut self, module_id: &str, declarations: ModuleDeclarations) -> Arc<ModuleDeclarations> {
        let declarations = Arc::new(declarations);
        let slot = self.slots.entry(module_id.to_string()).or_insert(CacheSlot {
            state: SlotState::Invalidated,
            generation: 0,
        });
        slot.state = SlotState::Cached(declarations.clone());
        slot.generation += 1;
        declarations
    }

    /// Clear a module's slot; returns whether anything was cached
    pub fn invalidate(&mut self, module_id: &str) -> bool {
        let Some(slot) = self.slots.get_mut(module_id) else {
            return false;
        };
        let was_cached = slot.is_cached();
        slot.state = SlotState::Invalidated;
        slot.generation += 1;
        trace!("Invalidated {} (generation {})", module_id, slot.generation);
        was_cached
    }

    pub fn slot(&self, module_id: &str) -> Option<&CacheSlot> {
        self.slots.get(module_id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Files read while resolving, each mapped to the module id it backs
///
/// Registration is idempotent: a path is recorded once and handed out once
/// through [`WatchedFileSet::take_pending`].
#[derive(Debug, Default)]
pub struct WatchedFileSet {
    watched: HashMap<PathBuf, String>,
    pending: Vec<(PathBuf, String)>,
}

impl WatchedFileSet {
    /// Record `path` as backing `module_id`; returns true the first time only
    pub fn register(&mut self, path: &Path, module_id: &str) -> bool {
        if self.watched.contains_key(path) {
            return false;
        }
        self.watched.insert(path.to_path_buf(), module_id.to_string());
        self.pending.push((path.to_path_buf(), module_id.to_string()));
        true
    }

    pub fn module_for(&self, path: &Path) -> Option<&str> {
        self.watched.get(path).map(String::as_str)
    }

    pub fn take_pending(&mut self) -> Vec<(PathBuf, String)> {
        std::mem::take(&mut self.pending)
    }

    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidate_then_refill() {
        let mut cache = ModuleCache::default();
        assert!(!cache.invalidate("vs/a"));

        cache.insert("vs/a", ModuleDeclarations::default());
        assert!(cache.get("vs/a").is_some());
        assert_eq!(cache.slot("vs/a").unwrap().generation(), 1);

        assert!(cache.invalidate("vs/a"));
        assert!(cache.get("vs/a").is_none());
        assert_eq!(cache.len(), 1);

        cache.insert("vs/a", ModuleDeclarations::default());
        assert_eq!(cache.slot("vs/a").unwrap().generation(), 3);
    }

    #[test]
    fn test_registration_is_idempotent() {
        let mut files = WatchedFileSet::default();
        assert!(files.register(Path::new("/src/vs/a.ts"), "vs/a"));
        assert!(!files.register(Path::new("/src/vs/a.ts"), "vs/a"));

        assert_eq!(files.take_pending().len(), 1);
        assert!(files.take_pending().is_empty());
        assert_eq!(files.module_for(Path::new("/src/vs/a.ts")), Some("vs/a"));
    }
}
