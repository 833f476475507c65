use std::time::Instant;

/// Host receive clock in seconds since the Unix epoch.
///
/// The wall clock is read once; later readings advance with the monotonic
/// clock, so receive times never step backwards when the system time is
/// adjusted.
#[derive(Debug, Clone, Copy)]
pub struct HostClock {
    origin: Instant,
    origin_unix: f64,
}

impl HostClock {
    pub fn new() -> Self {
        let now = jiff::Timestamp::now();
        Self {
            origin: Instant::now(),
            origin_unix: now.as_microsecond() as f64 / 1e6,
        }
    }

    pub fn now(&self) -> f64 {
        self.origin_unix + self.origin.elapsed().as_secs_f64()
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Wall time for a host clock reading.
pub fn wall_time(seconds: f64) -> Option<jiff::Timestamp> {
    if !seconds.is_finite() {
        return None;
    }
    jiff::Timestamp::from_microsecond((seconds * 1e6).round() as i64).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readings_are_monotonic_and_near_wall_time() {
        let clock = HostClock::new();

        let first = clock.now();
        let second = clock.now();
        let wall = jiff::Timestamp::now().as_microsecond() as f64 / 1e6;

        assert!(second >= first);
        assert!((wall - second).abs() < 1.0);
    }

    #[test]
    fn converts_to_wall_time() {
        let timestamp = wall_time(1_700_000_000.25).unwrap();

        assert_eq!(timestamp.as_millisecond(), 1_700_000_000_250);
        assert!(wall_time(f64::NAN).is_none());
    }
}
