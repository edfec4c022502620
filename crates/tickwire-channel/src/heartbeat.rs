use std::time::Duration;

/// Idle timer and missed-heartbeat counter for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatState {
    elapsed: Duration,
    missed: u32,
}

impl HeartbeatState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time accumulated since the last reset or heartbeat.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Heartbeats sent since inbound traffic last cleared the count.
    pub fn missed(&self) -> u32 {
        self.missed
    }

    /// Accumulate `delta`. When `interval` is reached the timer restarts,
    /// the missed count is incremented and its previous value returned: a
    /// heartbeat is due.
    pub fn tick(&mut self, delta: Duration, interval: Duration) -> Option<u32> {
        self.elapsed = self.elapsed.saturating_add(delta);
        if self.elapsed < interval {
            return None;
        }
        self.elapsed = Duration::ZERO;
        let previous = self.missed;
        self.missed = self.missed.saturating_add(1);
        Some(previous)
    }

    /// Clear the missed count, and the timer too when `full`.
    pub fn reset(&mut self, full: bool) {
        if full {
            self.elapsed = Duration::ZERO;
        }
        self.missed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(1);

    #[test]
    fn due_only_once_interval_reached() {
        let mut hb = HeartbeatState::new();
        assert_eq!(hb.tick(Duration::from_millis(400), INTERVAL), None);
        assert_eq!(hb.tick(Duration::from_millis(400), INTERVAL), None);
        assert_eq!(hb.tick(Duration::from_millis(200), INTERVAL), Some(0));
        assert_eq!(hb.elapsed(), Duration::ZERO);
        assert_eq!(hb.missed(), 1);
    }

    #[test]
    fn reports_count_before_increment() {
        let mut hb = HeartbeatState::new();
        assert_eq!(hb.tick(INTERVAL, INTERVAL), Some(0));
        assert_eq!(hb.tick(INTERVAL, INTERVAL), Some(1));
        assert_eq!(hb.tick(INTERVAL, INTERVAL), Some(2));
        assert_eq!(hb.missed(), 3);
    }

    #[test]
    fn full_reset_zeroes_both() {
        let mut hb = HeartbeatState::new();
        hb.tick(INTERVAL, INTERVAL);
        hb.tick(Duration::from_millis(300), INTERVAL);
        hb.reset(true);
        assert_eq!(hb.elapsed(), Duration::ZERO);
        assert_eq!(hb.missed(), 0);
    }

    #[test]
    fn partial_reset_keeps_elapsed() {
        let mut hb = HeartbeatState::new();
        hb.tick(INTERVAL, INTERVAL);
        hb.tick(Duration::from_millis(300), INTERVAL);
        hb.reset(false);
        assert_eq!(hb.elapsed(), Duration::from_millis(300));
        assert_eq!(hb.missed(), 0);
    }
}
