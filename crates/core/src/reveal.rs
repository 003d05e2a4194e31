//! Progressive reveal of an already-downloaded series.
//!
//! The whole series is drawn over a fixed wall-clock duration, one point per tick, so the
//! tick interval is `duration / count`. The task is bound to a generation and stops as soon
//! as that generation is no longer current.

use crate::session::{Event, Generation, GenerationCounter};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Tick period for revealing `count` points over `total`. `None` for an empty series.
pub fn tick_interval(total: Duration, count: usize) -> Option<Duration> {
    if count == 0 {
        return None;
    }
    let divisor = u32::try_from(count).unwrap_or(u32::MAX);
    Some(total / divisor)
}

#[derive(Debug)]
pub struct Revealer {
    counter: GenerationCounter,
    total: Duration,
    task: Option<JoinHandle<()>>,
}

impl Revealer {
    pub fn new(counter: GenerationCounter, total: Duration) -> Self {
        Self {
            counter,
            total,
            task: None,
        }
    }

    /// Starts revealing `count` points for `generation`, cancelling any reveal in progress.
    ///
    /// Returns `false` without spawning anything when there is nothing to reveal.
    pub fn start(
        &mut self,
        generation: Generation,
        count: usize,
        events: mpsc::UnboundedSender<Event>,
    ) -> bool {
        self.cancel();

        let Some(period) = tick_interval(self.total, count) else {
            return false;
        };

        let counter = self.counter.clone();
        self.task = Some(tokio::spawn(async move {
            if period.is_zero() {
                if counter.is_current(generation) {
                    let _ = events.send(Event::Revealed { generation, count });
                }
                return;
            }

            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Burst);
            for shown in 1..=count {
                ticks.tick().await;
                if !counter.is_current(generation) {
                    tracing::debug!(generation, shown, "reveal superseded");
                    return;
                }
                if events.send(Event::Revealed { generation, count: shown }).is_err() {
                    return;
                }
            }
        }));
        true
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for Revealer {
    fn drop(&mut self) {
        self.cancel();
    }
}
