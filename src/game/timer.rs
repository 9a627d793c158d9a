//! Level Countdown
//!
//! Whole-second countdown for the active level. The countdown only counts;
//! scheduling its ticks is the session driver's job.

use serde::{Serialize, Deserialize};

/// Outcome of one countdown tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountdownTick {
    /// Still running, with this many seconds left.
    Running(u32),
    /// Just reached zero.
    Expired,
    /// Not running; the tick was ignored.
    Stopped,
}

/// Countdown clock for a level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    limit_secs: u32,
    remaining_secs: u32,
    running: bool,
}

impl Countdown {
    /// A stopped countdown showing `limit_secs`.
    pub const fn new(limit_secs: u32) -> Self {
        Self {
            limit_secs,
            remaining_secs: limit_secs,
            running: false,
        }
    }

    /// Restart from `limit_secs`.
    pub fn reset(&mut self, limit_secs: u32) {
        self.limit_secs = limit_secs;
        self.remaining_secs = limit_secs;
        self.running = limit_secs > 0;
    }

    /// Stop without changing the remaining time.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Count down one second.
    pub fn tick(&mut self) -> CountdownTick {
        if !self.running {
            return CountdownTick::Stopped;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            self.running = false;
            CountdownTick::Expired
        } else {
            CountdownTick::Running(self.remaining_secs)
        }
    }

    /// Seconds left.
    #[inline]
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    /// Seconds the level started with.
    #[inline]
    pub fn limit_secs(&self) -> u32 {
        self.limit_secs
    }

    /// Whether ticks are being counted.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }
}

/// Format seconds as `m:ss`.
pub fn format_clock(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_down_to_expiry() {
        let mut countdown = Countdown::new(0);
        countdown.reset(3);

        assert_eq!(countdown.tick(), CountdownTick::Running(2));
        assert_eq!(countdown.tick(), CountdownTick::Running(1));
        assert_eq!(countdown.tick(), CountdownTick::Expired);
        assert_eq!(countdown.tick(), CountdownTick::Stopped);
        assert_eq!(countdown.remaining_secs(), 0);
    }

    #[test]
    fn test_stopped_countdown_ignores_ticks() {
        let mut countdown = Countdown::new(180);
        assert_eq!(countdown.tick(), CountdownTick::Stopped);

        countdown.reset(180);
        countdown.tick();
        countdown.stop();
        assert_eq!(countdown.tick(), CountdownTick::Stopped);
        assert_eq!(countdown.remaining_secs(), 179);
    }

    #[test]
    fn test_reset_restores_limit() {
        let mut countdown = Countdown::new(0);
        countdown.reset(10);
        countdown.tick();
        countdown.reset(210);
        assert_eq!(countdown.remaining_secs(), 210);
        assert_eq!(countdown.limit_secs(), 210);
        assert!(countdown.is_running());
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(180), "3:00");
        assert_eq!(format_clock(65), "1:05");
        assert_eq!(format_clock(9), "0:09");
    }
}
