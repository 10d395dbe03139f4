//! Shared diagnostic reporter
//!
//! One reporter is shared by every compilation pass of a pipeline so that
//! sequential and concurrent passes aggregate into the same counts. The
//! reporter decides whether a finished pass failed.

use crate::error::CoreError;
use crate::stream::RecordStream;
use futures::stream;
use futures::StreamExt;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A compiler diagnostic with enough context to find the offending source
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub code: Option<String>,
    pub message: String,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            file: None,
            line: None,
            column: None,
            code: None,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32, column: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn warning(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}", file)?;
            if let (Some(line), Some(column)) = (self.line, self.column) {
                write!(f, "({},{})", line, column)?;
            }
            write!(f, ": ")?;
        }
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match &self.code {
            Some(code) => write!(f, "{} {}: {}", level, code, self.message),
            None => write!(f, "{}: {}", level, self.message),
        }
    }
}

#[derive(Debug, Default)]
struct ReporterState {
    errors: Vec<Diagnostic>,
    warnings: usize,
    started: Option<Instant>,
}

/// Aggregates diagnostics for one pipeline instance
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    id: Option<String>,
    state: Arc<Mutex<ReporterState>>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A reporter whose summary line names the task it reports for
    pub fn named(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn report(&self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => {
                error!("{}", diagnostic);
                self.lock().errors.push(diagnostic);
            }
            Severity::Warning => {
                warn!("{}", diagnostic);
                self.lock().warnings += 1;
            }
        }
    }

    pub fn error_count(&self) -> usize {
        self.lock().errors.len()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn errors(&self) -> Vec<Diagnostic> {
        self.lock().errors.clone()
    }

    /// Start a new pass: clear the counts and start the clock
    pub fn start(&self) {
        let mut state = self.lock();
        state.errors.clear();
        state.warnings = 0;
        state.started = Some(Instant::now());
    }

    /// Close a pass over `input`
    ///
    /// Counts are reset when the pass is set up. Once the input ends, a summary
    /// is logged; with `emit_error` set, a pass that reported errors ends in
    /// [`CoreError::Diagnostics`].
    pub fn end(&self, input: RecordStream, emit_error: bool) -> RecordStream {
        self.start();
        let reporter = self.clone();
        let tail = stream::once(async move { reporter.finish(emit_error) })
            .filter_map(|outcome| async move { outcome.err().map(Err) });
        input.chain(tail).boxed()
    }

    fn finish(&self, emit_error: bool) -> Result<(), CoreError> {
        let state = self.lock();
        let elapsed = state
            .started
            .map(|started| started.elapsed().as_millis())
            .unwrap_or_default();
        let label = self
            .id
            .as_deref()
            .map(|id| format!("'{}' ", id))
            .unwrap_or_default();
        info!(
            "Finished {}compilation with {} errors after {} ms",
            label,
            state.errors.len(),
            elapsed
        );

        if emit_error && !state.errors.is_empty() {
            return Err(CoreError::Diagnostics {
                errors: state.errors.len(),
            });
        }
        Ok(())
    }
}
