use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Periodic callback task. Aborted when the handle is dropped.
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn cancel(self) {
        drop(self);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Call `on_tick` every `period`, first call one period from now.
/// The task ends when `on_tick` returns false.
pub fn spawn_ticker<F>(period: Duration, mut on_tick: F) -> TimerHandle
where
    F: FnMut() -> bool + Send + 'static,
{
    // interval_at panics on a zero period
    let period = period.max(MIN_PERIOD);
    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !on_tick() {
                break;
            }
        }
    });

    TimerHandle { task }
}
