use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::{Duration, Instant},
};

pub const MAX_FAILED_LOGINS: usize = 20;
pub const FAILED_LOGIN_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window counter of failed logins per account identifier.
#[derive(Debug)]
pub struct LoginLimiter {
    max_failures: usize,
    window: Duration,
    failures: Mutex<Failures>,
}

#[derive(Debug, Default)]
struct Failures {
    by_id: HashMap<String, VecDeque<Instant>>,
    last_sweep: Option<Instant>,
}

impl Failures {
    /// Drop identifiers whose newest failure has left the window. Runs at
    /// most once per window, so the map only holds recent identifiers.
    fn sweep(&mut self, now: Instant, window: Duration) {
        if self
            .last_sweep
            .is_some_and(|last| now.duration_since(last) < window)
        {
            return;
        }
        self.by_id.retain(|_, attempts| {
            attempts
                .back()
                .is_some_and(|t| now.duration_since(*t) < window)
        });
        self.last_sweep = Some(now);
    }
}

impl Default for LoginLimiter {
    fn default() -> Self {
        Self::new(MAX_FAILED_LOGINS, FAILED_LOGIN_WINDOW)
    }
}

impl LoginLimiter {
    pub fn new(max_failures: usize, window: Duration) -> Self {
        Self {
            max_failures,
            window,
            failures: Mutex::new(Failures::default()),
        }
    }

    /// `Err(retry_after)` once the identifier has used up its failures.
    pub fn check(&self, id: &str) -> Result<(), Duration> {
        self.check_at(id, Instant::now())
    }

    pub fn record_failure(&self, id: &str) {
        self.record_failure_at(id, Instant::now());
    }

    pub fn reset(&self, id: &str) {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        failures.by_id.remove(id);
    }

    fn check_at(&self, id: &str, now: Instant) -> Result<(), Duration> {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        let Some(attempts) = failures.by_id.get_mut(id) else {
            return Ok(());
        };
        while attempts
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            attempts.pop_front();
        }
        if attempts.is_empty() {
            failures.by_id.remove(id);
            return Ok(());
        }
        if attempts.len() >= self.max_failures {
            let oldest = attempts.front().copied().unwrap_or(now);
            return Err(self.window.saturating_sub(now.duration_since(oldest)));
        }
        Ok(())
    }

    fn record_failure_at(&self, id: &str, now: Instant) {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        failures.sweep(now, self.window);
        failures.by_id.entry(id.to_string()).or_default().push_back(now);
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .by_id
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_too_many_failures() {
        let limiter = LoginLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..3 {
            assert!(limiter.check_at("ann@example.com", start).is_ok());
            limiter.record_failure_at("ann@example.com", start);
        }
        let retry = limiter.check_at("ann@example.com", start + Duration::from_secs(10));
        assert_eq!(retry, Err(Duration::from_secs(50)));
        assert!(limiter.check_at("bob@example.com", start).is_ok());
    }

    #[test]
    fn window_slides() {
        let limiter = LoginLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        limiter.record_failure_at("ann", start);
        limiter.record_failure_at("ann", start + Duration::from_secs(30));
        assert!(limiter.check_at("ann", start + Duration::from_secs(45)).is_err());
        assert!(limiter.check_at("ann", start + Duration::from_secs(61)).is_ok());
    }

    #[test]
    fn stale_identifiers_are_forgotten() {
        let limiter = LoginLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();
        for n in 0..10_000 {
            limiter.record_failure_at(&format!("user{n}@example.com"), start);
        }
        assert_eq!(limiter.tracked(), 10_000);

        limiter.record_failure_at("2fa:u1", start + Duration::from_secs(3600));
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn sweeping_keeps_identifiers_inside_the_window() {
        let limiter = LoginLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        limiter.record_failure_at("ann", start);
        limiter.record_failure_at("bob", start + Duration::from_secs(50));
        limiter.record_failure_at("bob", start + Duration::from_secs(70));
        limiter.record_failure_at("cat", start + Duration::from_secs(75));
        assert_eq!(limiter.tracked(), 2);
        assert!(limiter.check_at("bob", start + Duration::from_secs(80)).is_err());
    }

    #[test]
    fn reset_clears_failures() {
        let limiter = LoginLimiter::new(1, Duration::from_secs(60));
        limiter.record_failure("ann");
        assert!(limiter.check("ann").is_err());
        limiter.reset("ann");
        assert!(limiter.check("ann").is_ok());
    }
}
