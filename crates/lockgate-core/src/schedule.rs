//! Cancellable repeating tasks

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Returned by a repeating task body to keep going or stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Stop,
}

/// Handle to a task that runs a closure every `period`
///
/// The first call happens immediately. Dropping the handle cancels the task.
#[derive(Debug)]
pub struct RepeatingTask {
    handle: JoinHandle<()>,
}

impl RepeatingTask {
    /// Spawn on the current tokio runtime
    pub fn spawn<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> Tick + Send + 'static,
    {
        let period = period.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if on_tick() == Tick::Stop {
                    break;
                }
            }
        });

        Self { handle }
    }

    /// Stop the task; no further ticks run after this returns
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Whether the task has stopped, either on its own or by cancellation
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
