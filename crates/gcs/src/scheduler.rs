//! Bounded-concurrency action scheduler
//!
//! Executes independent transfer/delete actions in parallel, at most
//! `width` at a time (default: host parallelism). Every dispatched action
//! is awaited even when a sibling fails; results are collected per
//! submission index and the first error in submission order is re-raised
//! only after the whole run has drained. Actions must not depend on each
//! other's side effects.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use gs_core::{Error, Result};

#[derive(Debug, Clone)]
pub struct ConcurrentScheduler {
    width: usize,
}

impl ConcurrentScheduler {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
        }
    }

    /// Host parallelism, the default pool width
    pub fn default_width() -> usize {
        std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(4)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Run all jobs, returning their outputs in submission order
    pub async fn run<T, Fut>(&self, jobs: Vec<Fut>) -> Result<Vec<T>>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let total = jobs.len();
        let semaphore = Arc::new(Semaphore::new(self.width));
        let mut set = JoinSet::new();

        for (index, job) in jobs.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("scheduler semaphore is never closed");
                (index, job.await)
            });
        }

        let mut slots: Vec<Option<Result<T>>> = std::iter::repeat_with(|| None)
            .take(total)
            .collect();
        let mut join_failure: Option<Error> = None;

        // Drain everything before reporting: a failure must not cancel
        // in-flight siblings.
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => {
                    join_failure
                        .get_or_insert_with(|| Error::General(format!("worker task failed: {e}")));
                }
            }
        }

        let mut outputs = Vec::with_capacity(total);
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(Ok(output)) => outputs.push(output),
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(join_failure
                        .take()
                        .unwrap_or_else(|| Error::General(format!("action {index} vanished"))));
                }
            }
        }
        Ok(outputs)
    }
}

impl Default for ConcurrentScheduler {
    fn default() -> Self {
        Self::new(Self::default_width())
    }
}
