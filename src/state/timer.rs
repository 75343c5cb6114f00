//! Countdown timer structures

use serde::{Deserialize, Serialize};

/// One-shot countdown for a single question phase.
///
/// Decrements once per `tick()` call, raises its expiry exactly once, and
/// never goes below zero. Host loops (the session clock task, or a test
/// harness) own the pacing; the timer itself has no notion of wall-clock time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Countdown {
    remaining: u64,
    paused: bool,
    expired: bool,
}

impl Countdown {
    /// Create a countdown armed with the full phase budget in seconds
    pub fn new(seconds: u64) -> Self {
        Self {
            remaining: seconds,
            paused: false,
            expired: false,
        }
    }

    /// Seconds left on this countdown
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Whether the countdown has already fired its expiry
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Hold the countdown; ticks are no-ops until `resume`
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Re-arm for a new phase budget, clearing pause and expiry
    pub fn reset(&mut self, seconds: u64) {
        self.remaining = seconds;
        self.paused = false;
        self.expired = false;
    }

    /// Apply one elapsed second.
    ///
    /// Returns `true` exactly once, on the tick that exhausts the budget.
    /// Paused timers and already-expired timers absorb ticks silently.
    pub fn tick(&mut self) -> bool {
        if self.paused || self.expired {
            return false;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.expired = true;
            return true;
        }
        false
    }
}

/// Global session clock state published on the watch channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockState {
    pub active: bool,
    pub remaining_seconds: Option<u64>,
}

impl ClockState {
    /// Create a new inactive clock state
    pub fn new() -> Self {
        Self {
            active: false,
            remaining_seconds: None,
        }
    }

    /// Create an active clock state with remaining seconds
    pub fn active(remaining_seconds: u64) -> Self {
        Self {
            active: true,
            remaining_seconds: Some(remaining_seconds),
        }
    }

    /// Create an inactive clock state
    pub fn inactive() -> Self {
        Self {
            active: false,
            remaining_seconds: None,
        }
    }
}

impl Default for ClockState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_to_zero_and_fires_once() {
        let mut timer = Countdown::new(3);
        assert!(!timer.tick());
        assert!(!timer.tick());
        assert!(timer.tick());
        assert_eq!(timer.remaining(), 0);
        assert!(timer.is_expired());
    }

    #[test]
    fn never_refires_or_goes_negative() {
        let mut timer = Countdown::new(1);
        assert!(timer.tick());
        for _ in 0..10 {
            assert!(!timer.tick());
        }
        assert_eq!(timer.remaining(), 0);
    }

    #[test]
    fn paused_timer_holds_its_value() {
        let mut timer = Countdown::new(5);
        timer.tick();
        timer.pause();
        for _ in 0..10 {
            assert!(!timer.tick());
        }
        assert_eq!(timer.remaining(), 4);
        timer.resume();
        assert!(!timer.tick());
        assert_eq!(timer.remaining(), 3);
    }

    #[test]
    fn reset_rearms_an_expired_timer() {
        let mut timer = Countdown::new(1);
        assert!(timer.tick());
        timer.reset(2);
        assert!(!timer.is_expired());
        assert!(!timer.tick());
        assert!(timer.tick());
    }

    #[test]
    fn zero_budget_fires_on_first_tick() {
        let mut timer = Countdown::new(0);
        assert!(timer.tick());
        assert!(!timer.tick());
    }
}
