//! TypeScript compilation for sluice: backends, compilation units and the
//! assembled compile pipeline

pub mod backend;
pub mod compilation_unit;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod rewrite;

pub use backend::{CompileOutput, CompilerBackend};
pub use compilation_unit::{CompilationSettings, CompilationUnit};
pub use error::{CompileError, CompileResult};
pub use memory::{ensure_memory, MemoryProbe, SystemMemory};
pub use pipeline::{create_compile, Compile, CompileFlags, TranspileOnly};
pub use rewrite::{rewrite_stage, ContentRewriter, RewriteTable, RewrittenFile};
