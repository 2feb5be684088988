use std::time::Duration;

use tokio::time::Instant;

/// Where a countdown stands at one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Waiting { remaining_secs: u64 },
    Due,
}

/// Next backup target, advanced by a fixed interval from the previous target.
#[derive(Debug, Clone, Copy)]
pub struct Countdown {
    next: Instant,
    interval: Duration,
}

impl Countdown {
    pub fn start(now: Instant, interval: Duration) -> Self {
        Self {
            next: now + interval,
            interval,
        }
    }

    pub fn next(&self) -> Instant {
        self.next
    }

    pub fn tick(&self, now: Instant) -> Tick {
        if now >= self.next {
            return Tick::Due;
        }
        Tick::Waiting {
            remaining_secs: remaining_secs(now, self.next),
        }
    }

    /// Move to the first target after `now`. Targets missed while the host
    /// was suspended collapse into the run that just fired.
    pub fn advance(&mut self, now: Instant) {
        self.next += self.interval;
        while self.next <= now {
            self.next += self.interval;
        }
    }
}

/// Whole seconds left, rounded up so the display never shows 0 early.
pub fn remaining_secs(now: Instant, next: Instant) -> u64 {
    let remaining = next.saturating_duration_since(now);
    let secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 { secs + 1 } else { secs }
}
