//! Deferred task execution.
//!
//! Tasks run on their own, detached from the request that scheduled them.
//! Nothing is locked across the delay, so a task must re-check whatever it
//! depends on when it finally runs.

use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::debug;

/// Runs a task once `delay` has elapsed. There is no way to take it back.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>);
}

/// Scheduler backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) {
        debug!("Scheduling deferred task in {:?}", delay);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }
}
