use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Spawns periodic timers whose tokens are children of one root token, so
/// cancelling the root stops every timer at once.
#[derive(Clone)]
pub struct Scheduler {
    root: CancellationToken,
}

impl Scheduler {
    pub fn new(root: CancellationToken) -> Self {
        Self { root }
    }

    /// Runs `tick` immediately and then once per `period` until the returned
    /// handle is cancelled or dropped. Must be called inside a tokio runtime.
    pub fn every<F>(&self, period: Duration, mut tick: F) -> TimerHandle
    where
        F: FnMut() + Send + 'static,
    {
        let token = self.root.child_token();
        let task_token = token.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = interval.tick() => {
                        if task_token.is_cancelled() {
                            break;
                        }
                        tick();
                    }
                }
            }
        });

        TimerHandle { token, task }
    }
}

/// Opaque handle to one periodic timer. Cancelling (or dropping) it
/// guarantees the timer is never polled again; a tick already running on
/// another worker may still finish.
pub struct TimerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn cancel(self) {
        drop(self);
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.token.cancel();
        self.task.abort();
    }
}
