//! Bounded-concurrency task runner with fail-fast cancellation.
//!
//! A fixed set of workers pull legacy IDs from a shared queue. The first
//! failure cancels the run: workers finish what they hold, then drain the
//! rest of the queue without starting it.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::error::TaskError;
use crate::progress::Progress;

/// One item that could not be imported.
#[derive(Debug)]
pub struct TaskFailure {
    pub legacy_id: i64,
    pub error: anyhow::Error,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "legacy ID {}: {:#}", self.legacy_id, self.error)
    }
}

/// Runs batches of per-ID tasks at a fixed concurrency.
#[derive(Clone)]
pub struct TaskPool {
    concurrency: usize,
    progress: Arc<Progress>,
    shutdown: CancellationToken,
}

impl TaskPool {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            progress: Arc::new(Progress::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Report into an existing progress handle.
    pub fn with_progress(mut self, progress: Arc<Progress>) -> Self {
        self.progress = progress;
        self
    }

    /// External cancellation. Cancelling `token` stops dispatch exactly like
    /// a failed item, without adding a failure.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn progress(&self) -> &Arc<Progress> {
        &self.progress
    }

    /// Run `task` once for every ID in `ids`.
    ///
    /// Returns every failure observed, ordered by legacy ID. Empty means
    /// every ID ran and succeeded, unless the shutdown token fired.
    pub async fn run<C, F, Fut>(&self, ids: Vec<i64>, ctx: Arc<C>, task: F) -> Vec<TaskFailure>
    where
        C: Send + Sync + 'static,
        F: Fn(Arc<C>, i64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if ids.is_empty() {
            return Vec::new();
        }

        let workers = self.concurrency.min(ids.len());
        self.progress.begin_pass(ids.len());

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::from(ids)),
            cancel: self.shutdown.child_token(),
            tripped: AtomicBool::new(false),
            failures: Mutex::new(Vec::new()),
            progress: self.progress.clone(),
        });
        let task = Arc::new(task);

        let mut set = JoinSet::new();
        for _ in 0..workers {
            set.spawn(worker(shared.clone(), ctx.clone(), task.clone()));
        }
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker aborted");
            }
        }

        let mut failures = std::mem::take(&mut *lock(&shared.failures));
        failures.sort_by_key(|f| f.legacy_id);
        failures
    }
}

/// Shorthand for a one-off [`TaskPool`] run.
pub async fn run_tasks<C, F, Fut>(
    ids: Vec<i64>,
    ctx: Arc<C>,
    task: F,
    concurrency: usize,
) -> Vec<TaskFailure>
where
    C: Send + Sync + 'static,
    F: Fn(Arc<C>, i64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    TaskPool::new(concurrency).run(ids, ctx, task).await
}

struct Shared {
    queue: Mutex<VecDeque<i64>>,
    cancel: CancellationToken,
    /// Set by the first failure only; later failures skip the cancel.
    tripped: AtomicBool,
    failures: Mutex<Vec<TaskFailure>>,
    progress: Arc<Progress>,
}

impl Shared {
    fn next(&self) -> Option<i64> {
        lock(&self.queue).pop_front()
    }

    fn record_failure(&self, legacy_id: i64, error: anyhow::Error) {
        self.progress.fail();
        if self
            .tripped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            warn!(legacy_id, error = %format!("{error:#}"), "Task failed, cancelling remaining work");
            self.cancel.cancel();
        }
        lock(&self.failures).push(TaskFailure { legacy_id, error });
    }
}

async fn worker<C, F, Fut>(shared: Arc<Shared>, ctx: Arc<C>, task: Arc<F>)
where
    F: Fn(Arc<C>, i64) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    while let Some(legacy_id) = shared.next() {
        if shared.cancel.is_cancelled() {
            shared.progress.drain();
            continue;
        }

        if legacy_id == 0 {
            shared.record_failure(legacy_id, TaskError::InvalidLegacyId(legacy_id).into());
            continue;
        }

        let ctx = ctx.clone();
        let task = task.clone();
        let outcome = AssertUnwindSafe(async move { (*task)(ctx, legacy_id).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => shared.progress.complete(),
            Ok(Err(error)) => shared.record_failure(legacy_id, error),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                shared.record_failure(legacy_id, TaskError::Panicked { legacy_id, message }.into());
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
