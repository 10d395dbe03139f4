//! Host memory precondition for full compiles

use crate::error::{CompileError, CompileResult};
use sysinfo::System;
use tracing::debug;

/// Physical memory a full build needs, in bytes
pub const REQUIRED_MEMORY: u64 = 4_000_000_000;

/// Source of the host's total memory figure
pub trait MemoryProbe: Send + Sync {
    fn total_memory(&self) -> u64;
}

/// Reads the real figure through sysinfo
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMemory;

impl MemoryProbe for SystemMemory {
    fn total_memory(&self) -> u64 {
        let mut system = System::new();
        system.refresh_memory();
        system.total_memory()
    }
}

/// A fixed figure, for hosts that report memory some other way
#[derive(Debug, Clone, Copy)]
pub struct FixedMemory(pub u64);

impl MemoryProbe for FixedMemory {
    fn total_memory(&self) -> u64 {
        self.0
    }
}

/// Fail fast when the host cannot hold a full compile
pub fn ensure_memory(probe: &dyn MemoryProbe) -> CompileResult<()> {
    let total = probe.total_memory();
    debug!("Host reports {} bytes of memory", total);
    if total < REQUIRED_MEMORY {
        return Err(CompileError::InsufficientMemory { total });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold() {
        let err = ensure_memory(&FixedMemory(REQUIRED_MEMORY - 1)).unwrap_err();
        assert_eq!(err.to_string(), "compilation requires 4GB of RAM");
        assert!(ensure_memory(&FixedMemory(REQUIRED_MEMORY)).is_ok());
    }
}
