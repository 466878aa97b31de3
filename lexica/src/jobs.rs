//! Background job queue
//!
//! Work that should not hold up a request (stale-while-revalidate refreshes,
//! scheduled regeneration runs, warming) is submitted here instead of being
//! spawned detached. A fixed pool of workers drains a bounded channel; each
//! submission returns a [`JobHandle`] that can be awaited or dropped.

use crate::error::LexicaError;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info};
use uuid::Uuid;

type BoxedJob = Pin<Box<dyn Future<Output = ()> + Send>>;

struct QueuedJob {
    id: Uuid,
    name: String,
    work: BoxedJob,
}

#[derive(Default)]
struct QueueCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
}

/// Counters for the admin stats view
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobQueueStats {
    pub workers: usize,
    pub submitted: u64,
    pub completed: u64,
    pub panicked: u64,
}

/// Bounded worker pool
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<QueuedJob>,
    workers: usize,
    counters: Arc<QueueCounters>,
}

impl JobQueue {
    /// Start `workers` workers (at least one) over a channel of `capacity`
    pub fn start(workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<QueuedJob>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(QueueCounters::default());

        for worker in 0..workers {
            let rx = Arc::clone(&rx);
            let counters = Arc::clone(&counters);
            tokio::spawn(async move {
                loop {
                    let next = { rx.lock().await.recv().await };
                    let Some(job) = next else {
                        debug!("Job worker {} stopping: queue closed", worker);
                        break;
                    };

                    debug!("Worker {} running job {} ({})", worker, job.name, job.id);
                    match AssertUnwindSafe(job.work).catch_unwind().await {
                        Ok(()) => {
                            counters.completed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            counters.panicked.fetch_add(1, Ordering::Relaxed);
                            error!("Job {} ({}) panicked", job.name, job.id);
                        }
                    }
                }
            });
        }

        info!("Started job queue with {} worker(s)", workers);
        Self {
            tx,
            workers,
            counters,
        }
    }

    /// Queue `work`; waits only if the channel is full
    pub async fn submit<F, T>(&self, name: &str, work: F) -> Result<JobHandle<T>, LexicaError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (job, handle) = package(name, work);
        self.tx
            .send(job)
            .await
            .map_err(|_| LexicaError::Job("job queue is closed".to_string()))?;

        self.queued(&handle);
        Ok(handle)
    }

    /// Queue `work` only if there is room right now. On failure the job is
    /// dropped without running.
    pub fn try_submit<F, T>(&self, name: &str, work: F) -> Result<JobHandle<T>, LexicaError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (job, handle) = package(name, work);
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                LexicaError::Job("job queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                LexicaError::Job("job queue is closed".to_string())
            }
        })?;

        self.queued(&handle);
        Ok(handle)
    }

    fn queued<T>(&self, handle: &JobHandle<T>) {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        debug!("Queued job {} ({})", handle.name, handle.id);
    }

    pub fn stats(&self) -> JobQueueStats {
        JobQueueStats {
            workers: self.workers,
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }
}

fn package<F, T>(name: &str, work: F) -> (QueuedJob, JobHandle<T>)
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let id = Uuid::new_v4();
    let (result_tx, result_rx) = oneshot::channel();
    let wrapped = async move {
        // Receiver may have been dropped; the caller did not want the result
        let _ = result_tx.send(work.await);
    };

    let job = QueuedJob {
        id,
        name: name.to_string(),
        work: Box::pin(wrapped),
    };
    let handle = JobHandle {
        id,
        name: name.to_string(),
        rx: result_rx,
    };
    (job, handle)
}

/// Result slot of a queued job
pub struct JobHandle<T> {
    id: Uuid,
    name: String,
    rx: oneshot::Receiver<T>,
}

impl<T> JobHandle<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the job's output
    pub async fn wait(self) -> Result<T, LexicaError> {
        self.rx.await.map_err(|_| {
            LexicaError::Job(format!("job {} ({}) ended without a result", self.name, self.id))
        })
    }

    /// Let the job run without observing its result
    pub fn detach(self) -> Uuid {
        self.id
    }
}
