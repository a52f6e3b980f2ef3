//! `HealthMonitor` — named health checks with edge-triggered alerts and a
//! worst-of-components overall status (spec §4.I), grounded in
//! `error_recovery.py`'s `HealthMonitor`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub component: &'static str,
    pub status: HealthStatus,
    pub message: String,
    pub last_check: Instant,
    pub response_time: Duration,
}

type CheckFn = Box<dyn Fn() -> (HealthStatus, String) + Send + Sync>;
type AlertFn = Box<dyn Fn(&HealthCheckResult) + Send + Sync>;

pub struct HealthMonitor {
    check_interval: Duration,
    checks: Mutex<HashMap<&'static str, CheckFn>>,
    results: Mutex<HashMap<&'static str, HealthCheckResult>>,
    alerts: Mutex<Vec<AlertFn>>,
    running: Arc<AtomicBool>,
}

impl HealthMonitor {
    pub fn new(check_interval: Duration) -> Self {
        Self {
            check_interval,
            checks: Mutex::new(HashMap::new()),
            results: Mutex::new(HashMap::new()),
            alerts: Mutex::new(Vec::new()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn register_check(&self, name: &'static str, check: impl Fn() -> (HealthStatus, String) + Send + Sync + 'static) {
        self.checks.lock().insert(name, Box::new(check));
    }

    pub fn register_alert(&self, callback: impl Fn(&HealthCheckResult) + Send + Sync + 'static) {
        self.alerts.lock().push(Box::new(callback));
    }

    /// Run every registered check once, firing alerts for any status-change
    /// edges and recording results.
    pub fn check_all(&self) {
        let names: Vec<&'static str> = self.checks.lock().keys().copied().collect();
        for name in names {
            self.check_one(name);
        }
    }

    fn check_one(&self, name: &'static str) {
        let (status, message, response_time) = {
            let checks = self.checks.lock();
            let Some(check) = checks.get(name) else {
                return;
            };
            let start = Instant::now();
            let (status, message) = check();
            (status, message, start.elapsed())
        };

        let result = HealthCheckResult {
            component: name,
            status,
            message,
            last_check: Instant::now(),
            response_time,
        };

        let changed = {
            let mut results = self.results.lock();
            let changed = results
                .get(name)
                .map(|prev| prev.status != result.status)
                .unwrap_or(false);
            results.insert(name, result.clone());
            changed
        };

        if changed {
            warn!(component = name, status = ?result.status, "health status changed");
            for alert in self.alerts.lock().iter() {
                alert(&result);
            }
        }
    }

    pub fn overall_status(&self) -> HealthStatus {
        let results = self.results.lock();
        if results.is_empty() {
            return HealthStatus::Unknown;
        }
        results
            .values()
            .map(|r| r.status)
            .max()
            .unwrap_or(HealthStatus::Unknown)
    }

    pub fn result(&self, name: &str) -> Option<HealthCheckResult> {
        self.results.lock().get(name).cloned()
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn mark_running(&self) {
        self.running.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_status_is_worst_of_components() {
        let monitor = HealthMonitor::new(Duration::from_secs(30));
        monitor.register_check("asr", || (HealthStatus::Healthy, String::new()));
        monitor.register_check("translator", || (HealthStatus::Degraded, String::new()));
        monitor.check_all();
        assert_eq!(monitor.overall_status(), HealthStatus::Degraded);
    }

    #[test]
    fn unknown_before_any_check_runs() {
        let monitor = HealthMonitor::new(Duration::from_secs(30));
        assert_eq!(monitor.overall_status(), HealthStatus::Unknown);
    }

    #[test]
    fn status_change_triggers_alert() {
        let monitor = HealthMonitor::new(Duration::from_secs(30));
        let flips = Arc::new(AtomicBool::new(false));
        monitor.register_check("asr", || (HealthStatus::Healthy, String::new()));
        let flips2 = Arc::clone(&flips);
        monitor.register_alert(move |_| flips2.store(true, Ordering::SeqCst));
        monitor.check_all(); // first run: Unknown -> Healthy isn't a "change" (no prior)
        assert!(!flips.load(Ordering::SeqCst));
    }
}
