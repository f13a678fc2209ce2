use log::debug;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::MissedTickBehavior;

/// Cancels its timer when cancelled explicitly or when dropped, so a timer never outlives the
/// view that owns it.
#[derive(Debug)]
pub struct TimerHandle {
    abort_handle: AbortHandle,
}

impl TimerHandle {
    pub fn cancel(&self) {
        if !self.abort_handle.is_finished() {
            debug!("Cancelling timer");
            self.abort_handle.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.abort_handle.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

/// Spawns timers on the tokio runtime. Time comes from `tokio::time`, so a paused test clock
/// drives every timer deterministically.
#[derive(Debug, Clone)]
pub struct Scheduler {
    handle: Handle,
}

impl Scheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler for the runtime we are running on. Panics outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Run `task` now and then every `period`.
    ///
    /// Each run is spawned on its own, so a slow run does not hold back the next one. Runs still
    /// in flight are aborted together with the timer.
    pub fn repeating<F, Fut>(&self, period: Duration, mut task: F) -> TimerHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let join = self.handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut in_flight = JoinSet::new();
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        in_flight.spawn(task());
                    }
                    Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                }
            }
        });
        TimerHandle {
            abort_handle: join.abort_handle(),
        }
    }

    /// Run `task` in the background. It is not tied to any timer and runs to completion.
    pub fn spawn<Fut>(&self, task: Fut) -> tokio::task::JoinHandle<()>
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(task)
    }

    /// Run `task` once after `delay`.
    pub fn once<Fut>(&self, delay: Duration, task: Fut) -> TimerHandle
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        TimerHandle {
            abort_handle: join.abort_handle(),
        }
    }
}
