use std::time::Duration;
use tokio::time::Instant;

/// The answer window for one shown question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub question_number: u32,
    pub duration: Duration,
    pub deadline: Instant,
}

impl Countdown {
    pub fn start(question_number: u32, duration: Duration) -> Self {
        Self::starting_at(question_number, duration, Instant::now())
    }

    pub fn starting_at(question_number: u32, duration: Duration, now: Instant) -> Self {
        Self {
            question_number,
            duration,
            deadline: now + duration,
        }
    }

    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }

    pub fn remaining(&self) -> Duration {
        self.remaining_at(Instant::now())
    }

    /// Whole seconds left, rounded up so the display reads 1 until the very end.
    pub fn seconds_left_at(&self, now: Instant) -> u64 {
        let remaining = self.remaining_at(now);
        remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
    }

    /// Fraction of the window still left, from 1.0 down to 0.0.
    pub fn progress_at(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 0.0;
        }
        (self.remaining_at(now).as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}
