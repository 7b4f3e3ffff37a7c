//! Busy-wait pacing of producer threads.
//!
//! OS sleeps are too coarse for sub-millisecond pacing, so the controller
//! spins. Each 100ms window has an entry budget; the per-entry spin grows
//! sharply when a window overshoots and shrinks gently when it undershoots.

use std::time::{Duration, Instant};

pub const WINDOW: Duration = Duration::from_millis(100);
/// Windows per second.
const WINDOWS_PER_SEC: u64 = 1_000 / WINDOW.as_millis() as u64;
const OVER_BUDGET_STEP_NANOS: u64 = 5_000;
const OVER_BUDGET_PER_ENTRY_NANOS: u64 = 2;
const UNDER_BUDGET_STEP_NANOS: u64 = 500;

/// Paces one producer towards a target rate.
#[derive(Debug)]
pub struct RateController {
    budget: u64,
    window_start: Option<Instant>,
    in_window: u64,
    spin_nanos: u64,
}

impl RateController {
    /// `desired` entries per second. Zero is treated as one per window.
    pub fn new(desired: u64) -> Self {
        Self {
            budget: (desired / WINDOWS_PER_SEC).max(1),
            window_start: None,
            in_window: 0,
            spin_nanos: 0,
        }
    }

    /// Entries allowed per window.
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Current per-entry busy-wait.
    pub fn spin(&self) -> Duration {
        Duration::from_nanos(self.spin_nanos)
    }

    /// Blocks until the next entry may be produced.
    pub fn pace(&mut self) {
        let now = Instant::now();
        let window_start = *self.window_start.get_or_insert(now);

        if now.duration_since(window_start) >= WINDOW {
            self.close_window(self.in_window, now);
        } else if self.in_window >= self.budget {
            // The window is spent: wait it out and count it as over budget.
            spin_until(window_start + WINDOW);
            self.close_window(self.in_window + 1, Instant::now());
        }

        if self.spin_nanos > 0 {
            spin_for(Duration::from_nanos(self.spin_nanos));
        }
        self.in_window += 1;
    }

    fn close_window(&mut self, produced: u64, now: Instant) {
        self.adjust(produced);
        self.window_start = Some(now);
        self.in_window = 0;
    }

    fn adjust(&mut self, produced: u64) {
        if produced > self.budget {
            let excess = produced - self.budget;
            self.spin_nanos = self
                .spin_nanos
                .saturating_add(OVER_BUDGET_PER_ENTRY_NANOS.saturating_mul(excess))
                .saturating_add(OVER_BUDGET_STEP_NANOS);
        } else if produced < self.budget {
            self.spin_nanos = self.spin_nanos.saturating_sub(UNDER_BUDGET_STEP_NANOS);
        }
    }
}

fn spin_for(duration: Duration) {
    spin_until(Instant::now() + duration);
}

fn spin_until(deadline: Instant) {
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}
