//! Timer-mode countdown, run by the host only.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Countdown output, delivered into the owner's inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Seconds left after this tick.
    Tick(u32),
    Expired,
}

#[derive(Debug, Default)]
pub struct MatchTimer {
    task: Option<JoinHandle<()>>,
}

impl MatchTimer {
    /// Count down from `secs`, one `Tick` per `step`, then one `Expired`.
    pub fn start<E>(handle: &Handle, secs: u32, step: Duration, tx: mpsc::UnboundedSender<E>) -> Self
    where
        E: From<TimerEvent> + Send + 'static,
    {
        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(step);
            // First tick completes immediately.
            ticker.tick().await;
            let mut remaining = secs;
            while remaining > 0 {
                ticker.tick().await;
                remaining -= 1;
                if tx.send(TimerEvent::Tick(remaining).into()).is_err() {
                    return;
                }
            }
            let _ = tx.send(TimerEvent::Expired.into());
        });
        Self { task: Some(task) }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop counting. Cancelling a stopped timer is a no-op.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for MatchTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
