use std::time::{Duration, Instant};

/// Minimum spacing between two requests to the same upstream
const MIN_REQUEST_INTERVAL_MS: u64 = 50;

/// Requests-per-minute limiter for the candle API
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum requests per minute
    rpm_limit: u32,
    /// Timestamp of last request
    last_request: Option<Instant>,
    /// Requests made in current window
    requests_in_window: u32,
    /// Window start time
    window_start: Instant,
}

impl RateLimiter {
    pub fn new(rpm_limit: u32) -> Self {
        Self {
            rpm_limit: rpm_limit.max(1),
            last_request: None,
            requests_in_window: 0,
            window_start: Instant::now(),
        }
    }

    /// Check if a request can be made at `now`, returns the wait if not
    pub fn check_at(&mut self, now: Instant) -> Option<Duration> {
        let elapsed = now.duration_since(self.window_start);

        // Reset window if a minute has passed
        if elapsed >= Duration::from_secs(60) {
            self.window_start = now;
            self.requests_in_window = 0;
        }

        if self.requests_in_window >= self.rpm_limit {
            return Some(Duration::from_secs(60).saturating_sub(elapsed));
        }

        if let Some(last) = self.last_request {
            let since_last = now.duration_since(last);
            let min_interval = Duration::from_millis(MIN_REQUEST_INTERVAL_MS);
            if since_last < min_interval {
                return Some(min_interval - since_last);
            }
        }

        None
    }

    pub fn check(&mut self) -> Option<Duration> {
        self.check_at(Instant::now())
    }

    pub fn record_at(&mut self, now: Instant) {
        self.last_request = Some(now);
        self.requests_in_window += 1;
    }

    pub fn record_request(&mut self) {
        self.record_at(Instant::now())
    }

    pub fn requests_in_window(&self) -> u32 {
        self.requests_in_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_passes() {
        let mut limiter = RateLimiter::new(10);
        assert!(limiter.check().is_none());
    }

    #[test]
    fn test_limit_reached_within_window() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(2);
        limiter.window_start = start;

        limiter.record_at(start);
        let later = start + Duration::from_secs(1);
        assert!(limiter.check_at(later).is_none());
        limiter.record_at(later);

        let wait = limiter.check_at(start + Duration::from_secs(2)).unwrap();
        assert_eq!(wait, Duration::from_secs(58));
    }

    #[test]
    fn test_window_resets_after_a_minute() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(1);
        limiter.window_start = start;
        limiter.record_at(start);

        assert!(limiter.check_at(start + Duration::from_secs(61)).is_none());
        assert_eq!(limiter.requests_in_window(), 0);
    }

    #[test]
    fn test_min_spacing() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(100);
        limiter.window_start = start;
        limiter.record_at(start);

        let wait = limiter.check_at(start + Duration::from_millis(10)).unwrap();
        assert_eq!(wait, Duration::from_millis(40));
    }
}
