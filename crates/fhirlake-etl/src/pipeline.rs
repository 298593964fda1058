//! The one-shot batch extraction pipeline.

use std::fs;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use fhirlake_client::{MirrorClient, SourceClient};
use fhirlake_sink::ParquetSink;

use crate::error::{PipelineError, Result};
use crate::executor::{RunCounters, SegmentExecutor};
use crate::plan::{FetchTask, plan_search_segments};
use crate::summary::RunSummary;

/// Side file listing the non-empty resource types of a warehouse root.
pub const TYPES_FILE: &str = "_types.txt";

const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub resource_types: Vec<String>,
    pub page_size: u32,
    pub worker_count: usize,
    /// How long in-flight segments may drain after an interrupt.
    pub shutdown_deadline: Duration,
}

impl PipelineConfig {
    pub fn new(resource_types: Vec<String>, page_size: u32, worker_count: usize) -> Self {
        Self {
            resource_types,
            page_size,
            worker_count,
            shutdown_deadline: DEFAULT_SHUTDOWN_DEADLINE,
        }
    }
}

/// Composes planner, executor and sink into one run. Single-shot: build,
/// `run`, drop.
pub struct Pipeline {
    client: Arc<SourceClient>,
    mirror: Option<Arc<MirrorClient>>,
    sink: Arc<ParquetSink>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        client: Arc<SourceClient>,
        mirror: Option<Arc<MirrorClient>>,
        sink: Arc<ParquetSink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            client,
            mirror,
            sink,
            config,
        }
    }

    /// Plan via the search API, then extract.
    pub async fn run_search(self) -> Result<RunSummary> {
        let tasks =
            plan_search_segments(&self.client, &self.config.resource_types, self.config.page_size)
                .await?;
        self.run_tasks(tasks).await
    }

    /// Extract a pre-computed plan (the direct-database path hands its id
    /// batches in here).
    pub async fn run_tasks(self, tasks: Vec<FetchTask>) -> Result<RunSummary> {
        info!(
            tasks = tasks.len(),
            workers = self.config.worker_count,
            "starting extraction"
        );

        let executor = SegmentExecutor::new(
            self.client.clone(),
            self.mirror.clone(),
            self.sink.clone(),
            self.config.worker_count,
        );
        let counters = Arc::new(RunCounters::default());
        let stop = Arc::new(AtomicBool::new(false));
        let mut cancelled = false;

        {
            let exec_fut = executor.run(tasks, counters.clone(), stop.clone());
            tokio::pin!(exec_fut);
            tokio::select! {
                _ = &mut exec_fut => {}
                _ = tokio::signal::ctrl_c() => {
                    warn!("interrupt received, draining in-flight segments");
                    cancelled = true;
                    stop.store(true, Ordering::Release);
                    if tokio::time::timeout(self.config.shutdown_deadline, exec_fut)
                        .await
                        .is_err()
                    {
                        warn!("drain deadline exceeded, abandoning in-flight segments");
                    }
                }
            }
        }

        // Close before surfacing any error so every file has a footer.
        let close_result = self.sink.close_all().await;

        if let Some(fatal) = counters.take_fatal() {
            return Err(PipelineError::Sink(fatal));
        }
        close_result?;

        self.write_types_file()?;

        let summary = RunSummary {
            written: self.sink.written_counts(),
            fetched: counters.fetched.load(Ordering::Relaxed),
            failed_segments: counters.failed_segments.load(Ordering::Relaxed),
            uploaded: counters.uploaded.load(Ordering::Relaxed),
            upload_failures: counters.upload_failures.load(Ordering::Relaxed),
            cancelled,
        };
        info!(written = summary.total_written(), "extraction finished\n{summary}");
        Ok(summary)
    }

    fn write_types_file(&self) -> Result<()> {
        let types = self.sink.non_empty_types();
        fs::create_dir_all(self.sink.root())?;
        let mut file = fs::File::create(self.sink.root().join(TYPES_FILE))?;
        for ty in &types {
            writeln!(file, "{ty}")?;
        }
        Ok(())
    }
}
