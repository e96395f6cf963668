//! Heartbeat, meter-sample and finishing timers of one session
//!
//! Each timer is a spawned task that pushes [`TimerTick`]s into the owning
//! session's tick channel. Every start bumps a generation counter; a tick is
//! only honoured while its timer slot still holds the same generation, so a
//! tick already queued when its timer was stopped is discarded.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Heartbeat,
    MeterSample,
    /// One-shot Finishing -> Available delay after a stop.
    Finishing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    pub kind: TimerKind,
    pub generation: u64,
}

/// Owned timer task; aborted when dropped.
#[derive(Debug)]
struct ScheduledTask {
    generation: u64,
    handle: JoinHandle<()>,
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug)]
pub struct Scheduler {
    ticks: mpsc::UnboundedSender<TimerTick>,
    generation: u64,
    heartbeat: Option<ScheduledTask>,
    meter: Option<ScheduledTask>,
    finishing: Option<ScheduledTask>,
}

impl Scheduler {
    pub fn new(ticks: mpsc::UnboundedSender<TimerTick>) -> Self {
        Self {
            ticks,
            generation: 0,
            heartbeat: None,
            meter: None,
            finishing: None,
        }
    }

    /// (Re)start the heartbeat timer. The first tick fires one period from now.
    pub fn start_heartbeat(&mut self, period: Duration) {
        let task = self.spawn_periodic(TimerKind::Heartbeat, period);
        self.heartbeat = Some(task);
    }

    /// (Re)start the meter-sample timer. The first tick fires one period from now.
    pub fn start_meter(&mut self, period: Duration) {
        let task = self.spawn_periodic(TimerKind::MeterSample, period);
        self.meter = Some(task);
    }

    /// Fire a single [`TimerKind::Finishing`] tick after `delay`.
    pub fn schedule_finishing(&mut self, delay: Duration) {
        let generation = self.next_generation();
        let ticks = self.ticks.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = ticks.send(TimerTick {
                kind: TimerKind::Finishing,
                generation,
            });
        });
        self.finishing = Some(ScheduledTask { generation, handle });
    }

    /// Stop one timer. Idempotent.
    pub fn stop(&mut self, kind: TimerKind) {
        if self.slot(kind).take().is_some() {
            debug!(?kind, "Timer stopped");
        }
    }

    /// Stop every timer. Idempotent.
    pub fn cancel_all(&mut self) {
        self.stop(TimerKind::Heartbeat);
        self.stop(TimerKind::MeterSample);
        self.stop(TimerKind::Finishing);
    }

    pub fn is_running(&self, kind: TimerKind) -> bool {
        match kind {
            TimerKind::Heartbeat => self.heartbeat.is_some(),
            TimerKind::MeterSample => self.meter.is_some(),
            TimerKind::Finishing => self.finishing.is_some(),
        }
    }

    /// `true` when `tick` comes from the timer currently occupying its slot.
    pub fn accepts(&self, tick: &TimerTick) -> bool {
        let current = match tick.kind {
            TimerKind::Heartbeat => &self.heartbeat,
            TimerKind::MeterSample => &self.meter,
            TimerKind::Finishing => &self.finishing,
        };
        current
            .as_ref()
            .is_some_and(|task| task.generation == tick.generation)
    }

    /// Release a one-shot timer once its tick has been handled.
    pub fn complete(&mut self, tick: &TimerTick) {
        if tick.kind == TimerKind::Finishing && self.accepts(tick) {
            self.finishing = None;
        }
    }

    fn slot(&mut self, kind: TimerKind) -> &mut Option<ScheduledTask> {
        match kind {
            TimerKind::Heartbeat => &mut self.heartbeat,
            TimerKind::MeterSample => &mut self.meter,
            TimerKind::Finishing => &mut self.finishing,
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    fn spawn_periodic(&mut self, kind: TimerKind, period: Duration) -> ScheduledTask {
        let generation = self.next_generation();
        let ticks = self.ticks.clone();
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if ticks.send(TimerTick { kind, generation }).is_err() {
                    break;
                }
            }
        });
        debug!(?kind, period_ms = period.as_millis() as u64, "Timer started");
        ScheduledTask { generation, handle }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
