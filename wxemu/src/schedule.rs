//! Output modes and the timing of continuous output.

use std::time::{Duration, Instant};

/// When a device sends measurement data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// No output except direct replies to commands.
    #[default]
    Stopped,
    /// Timer driven output every interval.
    Continuous,
    /// Output only on an explicit poll/send command.
    Polled,
}

/// Output mode, interval, and time of the last transmission of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchedule {
    mode: OutputMode,
    interval: Duration,
    last_sent: Option<Instant>,
}

impl OutputSchedule {
    /// Create a new schedule.
    pub fn new(mode: OutputMode, interval: Duration) -> Self {
        OutputSchedule {
            mode,
            interval,
            last_sent: None,
        }
    }

    /// Get the current output mode.
    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Set the output mode.
    ///
    /// Switching into continuous mode forgets the last transmission, so the first message goes out
    /// right away.
    pub fn set_mode(&mut self, mode: OutputMode) {
        if mode == OutputMode::Continuous && self.mode != OutputMode::Continuous {
            self.last_sent = None;
        }
        self.mode = mode;
    }

    /// Start continuous output.
    pub fn start(&mut self) {
        self.set_mode(OutputMode::Continuous);
    }

    /// Stop continuous output.
    pub fn stop(&mut self) {
        self.set_mode(OutputMode::Stopped);
    }

    /// Get the output interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Set the output interval.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Time of the last transmission, if any.
    pub fn last_sent(&self) -> Option<Instant> {
        self.last_sent
    }

    /// When the next transmission is due.
    ///
    /// `None` if the device is not in continuous mode or has a zero interval, i.e., the sender
    /// has to wait until it is signaled.
    pub fn next_due(&self, now: Instant) -> Option<Instant> {
        if self.mode != OutputMode::Continuous || self.interval.is_zero() {
            return None;
        }
        Some(match self.last_sent {
            Some(last) => last + self.interval,
            None => now,
        })
    }

    /// True if a transmission is due at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_due(now).is_some_and(|due| due <= now)
    }

    /// Record a transmission.
    pub fn mark_sent(&mut self, at: Instant) {
        self.last_sent = Some(at);
    }
}

impl Default for OutputSchedule {
    fn default() -> Self {
        OutputSchedule::new(OutputMode::Stopped, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[fixture]
    fn running() -> OutputSchedule {
        OutputSchedule::new(OutputMode::Continuous, Duration::from_secs(2))
    }

    #[rstest]
    fn test_first_output_is_due_immediately(running: OutputSchedule) {
        let now = Instant::now();
        assert_eq!(running.next_due(now), Some(now));
        assert!(running.is_due(now));
    }

    #[rstest]
    fn test_due_after_interval(mut running: OutputSchedule) {
        let now = Instant::now();
        running.mark_sent(now);
        assert!(!running.is_due(now + Duration::from_secs(1)));
        assert!(running.is_due(now + Duration::from_secs(2)));
        assert_eq!(running.next_due(now), Some(now + Duration::from_secs(2)));
    }

    #[rstest]
    #[case(OutputMode::Stopped)]
    #[case(OutputMode::Polled)]
    fn test_never_due_outside_continuous(#[case] mode: OutputMode) {
        let schedule = OutputSchedule::new(mode, Duration::from_secs(1));
        assert_eq!(schedule.next_due(Instant::now()), None);
    }

    #[rstest]
    fn test_zero_interval_never_due() {
        let schedule = OutputSchedule::new(OutputMode::Continuous, Duration::ZERO);
        assert_eq!(schedule.next_due(Instant::now()), None);
    }

    #[rstest]
    fn test_restart_resets_last_sent(mut running: OutputSchedule) {
        let now = Instant::now();
        running.mark_sent(now);
        running.stop();
        running.start();
        assert_eq!(running.last_sent(), None);
        // setting continuous again while running keeps the timer
        running.mark_sent(now);
        running.start();
        assert_eq!(running.last_sent(), Some(now));
    }
}
