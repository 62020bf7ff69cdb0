// THEORY:
// Comparisons are independent and CPU-bound, so a batch is simply spread over
// a pool of workers:
//
//   run(jobs) -> dispatcher --round robin--> worker 0..N (spawn_blocking)
//                                               |
//   results <------------- oneshot per job -----+
//
// Results come back in job order regardless of which worker finished first.
// The only shared resource is the file system, so jobs that would write to the
// same output directory are refused up front with `OutputConflict` instead of
// racing.

use crate::error::{Result, VisionError};
use crate::pipeline::{CompareRequest, ComparisonPipeline};
use crate::report::ComparisonResult;
use futures::future::join_all;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Absolute, lexically cleaned form of `path`, so `out`, `./out` and
/// `x/../out` claim the same directory. Symlinks are not resolved.
fn normalized(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}

pub struct CompareTask {
    pub request: CompareRequest,
    pub result_sender: oneshot::Sender<Result<ComparisonResult>>,
}

pub struct BatchRunner {
    pipeline: Arc<ComparisonPipeline>,
    workers: usize,
}

impl BatchRunner {
    pub fn new(pipeline: ComparisonPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            workers: num_cpus::get().max(1),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn pipeline(&self) -> &ComparisonPipeline {
        &self.pipeline
    }

    /// Runs every job; the i-th result belongs to the i-th job.
    pub async fn run(&self, jobs: Vec<CompareRequest>) -> Vec<Result<ComparisonResult>> {
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<CompareTask>();
        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..self.workers)
            .map(|_| mpsc::unbounded_channel::<CompareTask>())
            .unzip();

        let worker_count = self.workers;
        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        for (id, mut worker_receiver) in worker_receivers.into_iter().enumerate() {
            let pipeline = Arc::clone(&self.pipeline);
            tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    debug!(worker = id, baseline = %task.request.baseline, "job started");
                    let pipeline = Arc::clone(&pipeline);
                    let request = task.request;
                    let outcome = tokio::task::spawn_blocking(move || pipeline.compare(&request))
                        .await
                        .unwrap_or_else(|e| Err(VisionError::Worker(e.to_string())));
                    let _ = task.result_sender.send(outcome);
                }
            });
        }

        let mut claimed = HashSet::new();
        let mut pending = Vec::with_capacity(jobs.len());
        for request in jobs {
            let (result_sender, result_receiver) = oneshot::channel();
            let out_dir = self.pipeline.output_dir_for(&request);
            if !claimed.insert(normalized(&out_dir)) {
                warn!(path = %out_dir.display(), "output directory already used by an earlier job");
                let _ = result_sender.send(Err(VisionError::OutputConflict { path: out_dir }));
            } else if let Err(rejected) = task_sender.send(CompareTask {
                request,
                result_sender,
            }) {
                let _ = rejected
                    .0
                    .result_sender
                    .send(Err(VisionError::Worker("worker pool is closed".into())));
            }
            pending.push(result_receiver);
        }
        drop(task_sender);

        join_all(pending)
            .await
            .into_iter()
            .map(|received| {
                received.unwrap_or_else(|_| Err(VisionError::Worker("worker dropped the job".into())))
            })
            .collect()
    }
}
