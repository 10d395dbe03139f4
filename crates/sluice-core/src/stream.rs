//! Stream primitives the pipeline is assembled from
//!
//! - [`RecordTransform`] and [`when`]: per-record stages, optionally guarded by a predicate
//! - [`partition`]: the filter/restore pair, expressed as a single [`Partition`] value
//! - [`gate`]: all-or-nothing visibility for a cancellable invocation
//!
//! Records travel as `Result<FileRecord, CoreError>` so a stage can end the
//! stream in an error state without panicking the consumer.

use crate::error::{CoreError, CoreResult};
use crate::record::FileRecord;
use futures::channel::mpsc;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A stream of file records
pub type RecordStream = BoxStream<'static, CoreResult<FileRecord>>;

/// Predicate over a record, shared between stages
pub type RecordPredicate = Arc<dyn Fn(&FileRecord) -> bool + Send + Sync>;

/// A named per-record stage
///
/// A transform may emit more than one record (a companion `.map` file for
/// instance) or none at all.
pub trait RecordTransform: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, record: FileRecord) -> CoreResult<Vec<FileRecord>>;
}

/// Build a stream from in-memory records
pub fn from_records(records: Vec<FileRecord>) -> RecordStream {
    stream::iter(records.into_iter().map(Ok)).boxed()
}

/// Drain a stream, stopping at the first error
pub async fn collect_records(mut input: RecordStream) -> CoreResult<Vec<FileRecord>> {
    let mut records = Vec::new();
    while let Some(item) = input.next().await {
        records.push(item?);
    }
    Ok(records)
}

/// Lift a transform onto a stream, preserving order
pub fn apply_transform(input: RecordStream, transform: Arc<dyn RecordTransform>) -> RecordStream {
    input
        .flat_map(move |item| {
            let out: Vec<CoreResult<FileRecord>> = match item {
                Ok(record) => match transform.apply(record) {
                    Ok(records) => records.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                },
                Err(e) => vec![Err(e)],
            };
            stream::iter(out)
        })
        .boxed()
}

/// Conditional-apply: run `inner` only on records matching the predicate
pub struct When {
    predicate: RecordPredicate,
    inner: Arc<dyn RecordTransform>,
}

pub fn when<P, T>(predicate: P, inner: T) -> When
where
    P: Fn(&FileRecord) -> bool + Send + Sync + 'static,
    T: RecordTransform + 'static,
{
    When {
        predicate: Arc::new(predicate),
        inner: Arc::new(inner),
    }
}

impl RecordTransform for When {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn apply(&self, record: FileRecord) -> CoreResult<Vec<FileRecord>> {
        if (self.predicate)(&record) {
            self.inner.apply(record)
        } else {
            Ok(vec![record])
        }
    }
}

/// The two halves of a filter: records that continue down the pipeline and
/// the ones set aside until [`HeldRecords::restore`]
pub struct Partition {
    pub matched: RecordStream,
    pub held: HeldRecords,
}

/// Records diverted out of the active path by a [`partition`]
pub struct HeldRecords {
    rx: mpsc::UnboundedReceiver<FileRecord>,
}

impl HeldRecords {
    /// Merge the held records back in after `processed`
    ///
    /// Each side keeps its own arrival order; the interleaving between the two
    /// follows whichever side is ready first.
    pub fn restore(self, processed: RecordStream) -> RecordStream {
        stream::select(processed, self.rx.map(Ok::<FileRecord, CoreError>)).boxed()
    }
}

/// Split a stream on `predicate`
///
/// A router task moves each upstream record into one of two unbounded
/// channels, so draining the matched side never blocks on the held side.
/// Upstream errors travel on the matched side. The router stops reading
/// upstream once both sides have been dropped.
pub fn partition<P>(input: RecordStream, predicate: P) -> Partition
where
    P: Fn(&FileRecord) -> bool + Send + Sync + 'static,
{
    let (matched_tx, matched_rx) = mpsc::unbounded();
    let (held_tx, held_rx) = mpsc::unbounded();

    tokio::spawn(async move {
        let mut input = input;
        loop {
            if matched_tx.is_closed() && held_tx.is_closed() {
                debug!("partition consumers dropped, stopping");
                break;
            }
            let Some(item) = input.next().await else {
                break;
            };
            let routed = match item {
                Ok(record) if predicate(&record) => matched_tx.unbounded_send(Ok(record)).is_ok(),
                Ok(record) => held_tx.unbounded_send(record).is_ok(),
                Err(e) => matched_tx.unbounded_send(Err(e)).is_ok(),
            };
            if !routed {
                debug!("partition consumer dropped, discarding record");
            }
        }
    });

    Partition {
        matched: matched_rx.boxed(),
        held: HeldRecords { rx: held_rx },
    }
}

/// Buffer a whole invocation and release it only if `token` was not cancelled
pub fn gate(input: RecordStream, token: CancellationToken) -> RecordStream {
    stream::once(async move {
        let items: Vec<CoreResult<FileRecord>> = input.collect().await;
        if token.is_cancelled() {
            debug!("invocation cancelled, suppressing {} records", items.len());
            Vec::new()
        } else {
            items
        }
    })
    .flat_map(stream::iter)
    .boxed()
}

/// Turn an error into a one-item stream
pub fn fail(error: CoreError) -> RecordStream {
    stream::once(async move { Err(error) }).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl RecordTransform for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn apply(&self, mut record: FileRecord) -> CoreResult<Vec<FileRecord>> {
            record.contents = record.contents.to_ascii_uppercase();
            Ok(vec![record])
        }
    }

    fn records(paths: &[&str]) -> Vec<FileRecord> {
        paths
            .iter()
            .map(|p| FileRecord::new("/src", p, p.as_bytes().to_vec()))
            .collect()
    }

    #[tokio::test]
    async fn test_when_preserves_order() {
        let input = from_records(records(&["a.ts", "b.css", "c.ts", "d.css"]));
        let stage = Arc::new(when(|r: &FileRecord| r.has_suffix(".css"), Upper));
        let out = collect_records(apply_transform(input, stage)).await.unwrap();

        let contents: Vec<_> = out.iter().map(|r| r.contents_str().unwrap().to_string()).collect();
        assert_eq!(contents, vec!["a.ts", "B.CSS", "c.ts", "D.CSS"]);
    }

    #[tokio::test]
    async fn test_partition_restores_held_records() {
        let input = from_records(records(&["a.ts", "readme.md", "b.ts", "logo.svg"]));
        let Partition { matched, held } = partition(input, |r| r.has_suffix(".ts"));

        let processed = apply_transform(matched, Arc::new(Upper));
        let out = collect_records(held.restore(processed)).await.unwrap();

        let ts: Vec<_> = out
            .iter()
            .filter(|r| r.has_suffix(".ts"))
            .map(|r| r.contents_str().unwrap())
            .collect();
        let others: Vec<_> = out
            .iter()
            .filter(|r| !r.has_suffix(".ts"))
            .map(|r| r.contents_str().unwrap())
            .collect();
        assert_eq!(ts, vec!["A.TS", "B.TS"]);
        assert_eq!(others, vec!["readme.md", "logo.svg"]);
    }

    #[tokio::test]
    async fn test_upstream_error_surfaces_on_matched_side() {
        let input = stream::iter(vec![
            Ok(FileRecord::new("/src", "a.ts", "")),
            Err(CoreError::stage("walk", "boom")),
        ])
        .boxed();
        let Partition { matched, held } = partition(input, |_| false);
        let err = collect_records(held.restore(matched)).await.unwrap_err();
        assert!(matches!(err, CoreError::Stage { .. }));
    }

    #[tokio::test]
    async fn test_router_stops_once_both_sides_are_dropped() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let input = stream::iter(0..10_000)
            .then(move |i| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    Ok::<_, CoreError>(FileRecord::new("/src", format!("{}.ts", i), ""))
                }
            })
            .boxed();

        let Partition { mut matched, held } = partition(input, |_: &FileRecord| true);
        assert!(matched.next().await.is_some());
        drop(matched);
        drop(held);

        for _ in 0..100 {
            tokio::task::yield_now().await;
        }
        let settled = pulled.load(Ordering::SeqCst);
        for _ in 0..100 {
            tokio::task::yield_now().await;
        }
        assert_eq!(pulled.load(Ordering::SeqCst), settled);
        assert!(settled < 10_000);
    }

    #[tokio::test]
    async fn test_gate_suppresses_cancelled_invocation() {
        let token = CancellationToken::new();
        token.cancel();
        let out = collect_records(gate(from_records(records(&["a.js"])), token))
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_gate_releases_live_invocation() {
        let out = collect_records(gate(
            from_records(records(&["a.js", "b.js"])),
            CancellationToken::new(),
        ))
        .await
        .unwrap();
        assert_eq!(out.len(), 2);
    }
}
