//! Bounded-concurrency execution of the fetch plan.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::StreamExt;
use futures_util::stream;
use tracing::{debug, error, warn};

use fhirlake_client::{MirrorClient, SourceClient};
use fhirlake_core::{Bundle, RawResource};
use fhirlake_sink::{ParquetSink, SinkError};

use crate::plan::{FetchTask, SearchSegment};

/// Counters shared between the executor and the pipeline, so a cancelled
/// run still reports what it managed to do.
#[derive(Debug, Default)]
pub struct RunCounters {
    pub fetched: AtomicU64,
    pub failed_segments: AtomicU64,
    pub uploaded: AtomicU64,
    pub upload_failures: AtomicU64,
    fatal_sink: std::sync::Mutex<Option<SinkError>>,
}

impl RunCounters {
    /// Record a fatal sink failure; only the first one is kept.
    fn record_fatal(&self, error: SinkError) {
        self.fatal_sink
            .lock()
            .expect("fatal error slot poisoned")
            .get_or_insert(error);
    }

    pub fn take_fatal(&self) -> Option<SinkError> {
        self.fatal_sink
            .lock()
            .expect("fatal error slot poisoned")
            .take()
    }
}

/// Fetches segments and id batches with bounded parallelism and fans the
/// resources out to the Parquet sink and the optional mirror server.
///
/// Segments are independent: a segment that fails permanently is counted
/// and skipped. A sink failure is fatal: the stop flag flips and the
/// remaining tasks drain as no-ops.
pub struct SegmentExecutor {
    client: Arc<SourceClient>,
    mirror: Option<Arc<MirrorClient>>,
    sink: Arc<ParquetSink>,
    worker_count: usize,
}

impl SegmentExecutor {
    pub fn new(
        client: Arc<SourceClient>,
        mirror: Option<Arc<MirrorClient>>,
        sink: Arc<ParquetSink>,
        worker_count: usize,
    ) -> Self {
        Self {
            client,
            mirror,
            sink,
            worker_count: worker_count.max(1),
        }
    }

    /// Process every task. At most `worker_count` fetches are in flight;
    /// no ordering is promised across tasks. Within one task, resources
    /// land in bundle order.
    pub async fn run(&self, tasks: Vec<FetchTask>, counters: Arc<RunCounters>, stop: Arc<AtomicBool>) {
        stream::iter(tasks)
            .map(|task| {
                let counters = counters.clone();
                let stop = stop.clone();
                async move {
                    if stop.load(Ordering::Acquire) {
                        return;
                    }
                    self.process(task, &counters, &stop).await;
                }
            })
            .buffer_unordered(self.worker_count)
            .collect::<Vec<()>>()
            .await;
    }

    async fn process(&self, task: FetchTask, counters: &RunCounters, stop: &AtomicBool) {
        let label = task_label(&task);
        let bundle = match self.fetch(&task).await {
            Ok(bundle) => bundle,
            Err(e) => {
                counters.failed_segments.fetch_add(1, Ordering::Relaxed);
                warn!(segment = %label, error = %e, "segment failed permanently, skipping");
                return;
            }
        };

        let entry_count = bundle.entry_count() as u64;
        counters.fetched.fetch_add(entry_count, Ordering::Relaxed);
        debug!(segment = %label, resources = entry_count, "fetched segment");

        for entry in bundle.entries() {
            let resource = match RawResource::new(entry.clone()) {
                Ok(resource) => resource,
                Err(e) => {
                    warn!(segment = %label, error = %e, "skipping malformed bundle entry");
                    continue;
                }
            };
            if let Err(e) = self.sink.write(&resource).await {
                error!(segment = %label, error = %e, "sink failure is fatal, stopping intake");
                counters.record_fatal(e);
                stop.store(true, Ordering::Release);
                return;
            }
        }

        if let Some(mirror) = &self.mirror {
            let outcome = mirror.upload_bundle(&bundle).await;
            counters.uploaded.fetch_add(outcome.uploaded, Ordering::Relaxed);
            counters
                .upload_failures
                .fetch_add(outcome.failed, Ordering::Relaxed);
        }
    }

    async fn fetch(&self, task: &FetchTask) -> fhirlake_client::Result<Bundle> {
        match task {
            FetchTask::Page(SearchSegment {
                page_token: Some(token),
                offset,
                count,
                ..
            }) => self.client.search_by_page(token, *count, *offset as u32).await,
            FetchTask::Page(SearchSegment {
                page_token: None,
                resource_type,
                count,
                ..
            }) => {
                self.client
                    .search_for_resource(resource_type, *count, false)
                    .await
            }
            FetchTask::Ids(batch) => {
                self.client
                    .batch_get_by_ids(&batch.resource_type, &batch.ids)
                    .await
            }
        }
    }
}

fn task_label(task: &FetchTask) -> String {
    match task {
        FetchTask::Page(s) => format!("{}[{}+{}]", s.resource_type, s.offset, s.count),
        FetchTask::Ids(b) => format!("{}[{} ids]", b.resource_type, b.ids.len()),
    }
}
