//! `CircuitBreaker` — Closed/Open/HalfOpen state machine (spec §4.I),
//! grounded in `original_source/src/core/utils/error_recovery.py`'s
//! `CircuitBreaker`.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
}

/// Thread-safe per-breaker circuit breaker. One instance guards one
/// collaborator boundary (ASR, translation, capture device, ...).
pub struct CircuitBreaker {
    name: &'static str,
    failure_threshold: u32,
    recovery_timeout: Duration,
    half_open_max_calls: u32,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, failure_threshold: u32, recovery_timeout: Duration, half_open_max_calls: u32) -> Self {
        Self {
            name,
            failure_threshold,
            recovery_timeout,
            half_open_max_calls,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Call `f` through the breaker. If the circuit is open and `fallback` is
    /// `Some`, the fallback's result is returned as-is instead of an error.
    pub fn call<T>(
        &self,
        f: impl FnOnce() -> Result<T, CoreError>,
        fallback: Option<impl FnOnce() -> T>,
    ) -> Result<T, CoreError> {
        {
            let mut inner = self.inner.lock();
            if inner.state == CircuitState::Open {
                let elapsed = inner.last_failure.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.recovery_timeout {
                    info!(circuit = self.name, "transitioning Open -> HalfOpen");
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                } else if let Some(fallback) = fallback {
                    return Ok(fallback());
                } else {
                    return Err(CoreError::CircuitOpen(self.name));
                }
            }
        }

        match f() {
            Ok(v) => {
                self.on_success();
                Ok(v)
            }
            Err(e) => {
                self.on_failure();
                Err(e)
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.success_count += 1;
            if inner.success_count >= self.half_open_max_calls {
                info!(circuit = self.name, "transitioning HalfOpen -> Closed");
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
            }
        } else {
            inner.failure_count = 0;
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        if inner.state == CircuitState::HalfOpen {
            warn!(circuit = self.name, "transitioning HalfOpen -> Open");
            inner.state = CircuitState::Open;
        } else if inner.failure_count >= self.failure_threshold {
            warn!(circuit = self.name, "transitioning Closed -> Open");
            inner.state = CircuitState::Open;
        }
    }

    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Open;
        inner.last_failure = Some(Instant::now());
    }

    pub fn force_close(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> Result<(), CoreError> {
        Ok(())
    }
    fn fail() -> Result<(), CoreError> {
        Err(CoreError::ConfigInvalid("boom".into()))
    }

    #[test]
    fn opens_after_failure_threshold() {
        let cb = CircuitBreaker::new("t", 3, Duration::from_secs(30), 2);
        for _ in 0..3 {
            let _ = cb.call(fail, None::<fn() -> ()>);
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn open_circuit_fast_fails_without_fallback() {
        let cb = CircuitBreaker::new("t", 1, Duration::from_secs(30), 2);
        let _ = cb.call(fail, None::<fn() -> ()>);
        let result = cb.call(ok, None::<fn() -> ()>);
        assert!(matches!(result, Err(CoreError::CircuitOpen(_))));
    }

    #[test]
    fn open_circuit_uses_fallback_when_supplied() {
        let cb = CircuitBreaker::new("t", 1, Duration::from_secs(30), 2);
        let _ = cb.call(fail, None::<fn() -> ()>);
        let result = cb.call(fail, Some(|| 42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn half_open_closes_after_enough_successes() {
        let cb = CircuitBreaker::new("t", 1, Duration::from_millis(1), 2);
        let _ = cb.call(fail, None::<fn() -> ()>);
        assert_eq!(cb.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(5));
        let _ = cb.call(ok, None::<fn() -> ()>); // -> HalfOpen, 1 success
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        let _ = cb.call(ok, None::<fn() -> ()>); // 2 successes -> Closed
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let cb = CircuitBreaker::new("t", 1, Duration::from_millis(1), 2);
        let _ = cb.call(fail, None::<fn() -> ()>);
        std::thread::sleep(Duration::from_millis(5));
        let _ = cb.call(fail, None::<fn() -> ()>); // HalfOpen probe fails -> Open
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn force_open_and_close_override_state() {
        let cb = CircuitBreaker::new("t", 5, Duration::from_secs(30), 2);
        cb.force_open();
        assert_eq!(cb.state(), CircuitState::Open);
        cb.force_close();
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
