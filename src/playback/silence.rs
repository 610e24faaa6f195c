use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

/// Keepalive burst scheduler
///
/// `needed` is set once real audio has been sent and cleared when a burst
/// starts, so every idle period gets at most one burst.
#[derive(Debug)]
pub struct SilenceScheduler {
    period: Duration,
    burst: u32,
    needed: bool,
    frames_left: u32,
    timer: Option<Interval>,
}

impl SilenceScheduler {
    /// Scheduler sending `burst` frames every `period` once armed
    #[must_use]
    pub fn new(period: Duration, burst: u32) -> Self {
        Self {
            period,
            burst,
            needed: false,
            frames_left: 0,
            timer: None,
        }
    }

    /// Whether a burst is running
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.timer.is_some()
    }

    /// Whether the next idle period owes a burst
    #[must_use]
    pub fn is_needed(&self) -> bool {
        self.needed
    }

    /// Frames left in the current burst
    #[must_use]
    pub fn frames_left(&self) -> u32 {
        self.frames_left
    }

    /// Real audio is flowing: stop any burst and owe one for the next idle period
    pub fn cancel(&mut self) {
        if self.needed {
            return;
        }
        self.timer = None;
        self.needed = true;
        self.frames_left = self.burst;
    }

    /// Audio stopped: start a burst if one is owed and none is running
    ///
    /// Returns whether a burst started.
    pub fn arm(&mut self) -> bool {
        if self.timer.is_some() || !self.needed || self.burst == 0 {
            return false;
        }

        self.needed = false;
        let mut timer = interval_at(Instant::now() + self.period, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(timer);
        tracing::trace!(frames = self.frames_left, "Keepalive burst armed");
        true
    }

    /// Stop the burst without owing another
    pub fn halt(&mut self) {
        self.timer = None;
        self.needed = false;
    }

    /// Wait for the next frame slot
    ///
    /// Returns the frames left after this one. Never completes while no burst
    /// is running. Cancel safe.
    pub async fn tick(&mut self) -> u32 {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending::<()>().await,
        }

        self.frames_left = self.frames_left.saturating_sub(1);
        if self.frames_left == 0 {
            self.timer = None;
        }
        self.frames_left
    }
}
