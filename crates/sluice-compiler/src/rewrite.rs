//! Whole-program source rewriting ahead of compilation
//!
//! A [`ContentRewriter`] computes new contents for a set of files once; every
//! record passing through [`rewrite_stage`] waits on that same computation and
//! picks up its replacement, if any.

use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream;
use futures::StreamExt;
use sluice_core::stream::RecordStream;
use sluice_core::{CoreError, CoreResult, FileRecord, SourceMap};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Replacement for one file
#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenFile {
    pub contents: String,
    /// Source map JSON mapping the new contents back to the old
    pub source_map: Option<String>,
}

/// New contents keyed by slash-normalized path relative to the source root
pub type RewriteTable = HashMap<String, RewrittenFile>;

pub trait ContentRewriter: Send + Sync {
    fn name(&self) -> &str;

    fn compute(&self) -> BoxFuture<'static, CoreResult<RewriteTable>>;
}

/// A rewriter whose table is already known
#[derive(Debug, Clone, Default)]
pub struct PrecomputedRewrites {
    table: RewriteTable,
}

impl PrecomputedRewrites {
    pub fn new(table: RewriteTable) -> Self {
        Self { table }
    }
}

impl ContentRewriter for PrecomputedRewrites {
    fn name(&self) -> &str {
        "precomputed"
    }

    fn compute(&self) -> BoxFuture<'static, CoreResult<RewriteTable>> {
        let table = self.table.clone();
        async move { Ok(table) }.boxed()
    }
}

type SharedTable = Shared<BoxFuture<'static, Result<Arc<RewriteTable>, String>>>;

fn apply_rewrite(mut record: FileRecord, table: &RewriteTable) -> CoreResult<FileRecord> {
    let Some(rewritten) = table.get(record.relative()) else {
        return Ok(record);
    };
    record.contents = rewritten.contents.clone().into_bytes();
    record.source_map = match &rewritten.source_map {
        Some(json) => Some(SourceMap::from_json(json).map_err(|e| CoreError::SourceMap {
            path: record.relative().to_string(),
            message: e.to_string(),
        })?),
        None => None,
    };
    Ok(record)
}

/// Replace contents of every record the rewriter has an entry for
///
/// The computation starts when the first record arrives. The table is released
/// once the stream ends.
pub fn rewrite_stage(input: RecordStream, rewriter: Arc<dyn ContentRewriter>) -> RecordStream {
    let name = rewriter.name().to_string();
    let table: SharedTable = rewriter
        .compute()
        .map(|result| result.map(Arc::new).map_err(|e| e.to_string()))
        .boxed()
        .shared();

    let stage_name = name.clone();
    let lookup = table.clone();
    let rewritten = input.then(move |item| {
        let table = lookup.clone();
        let stage_name = stage_name.clone();
        async move {
            let record = item?;
            match table.await {
                Ok(table) => apply_rewrite(record, &table),
                Err(message) => Err(CoreError::stage(stage_name, message)),
            }
        }
    });

    let release = stream::once(async move {
        if let Some(Ok(table)) = table.peek() {
            info!("[mangler] {} rewrote {} files, releasing", name, table.len());
        } else if let Some(Err(message)) = table.peek() {
            warn!("[mangler] {} failed: {}", name, message);
        }
        drop(table);
        None
    })
    .filter_map(|item: Option<CoreResult<FileRecord>>| async move { item });

    rewritten.chain(release).boxed()
}
