//! `GracefulDegradation` — ordered strategy list with `degrade`/`restore`
//! (spec §4.I), grounded in `error_recovery.py`'s `GracefulDegradation`.

use parking_lot::Mutex;
use tracing::{info, warn};

pub struct GracefulDegradation {
    strategies: Vec<Box<dyn Fn() + Send + Sync>>,
    level: Mutex<usize>,
}

impl Default for GracefulDegradation {
    fn default() -> Self {
        Self::new()
    }
}

impl GracefulDegradation {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
            level: Mutex::new(0),
        }
    }

    /// Register a degradation strategy; strategies apply in registration
    /// order, typically: lower ASR precision, increase chunk size, lengthen
    /// draft interval, disable drafts, switch to final-only translation.
    pub fn register_strategy(&mut self, strategy: impl Fn() + Send + Sync + 'static) {
        self.strategies.push(Box::new(strategy));
    }

    /// Apply the next degradation level. Returns `false` if already at the
    /// maximum level.
    pub fn degrade(&self) -> bool {
        let mut level = self.level.lock();
        if *level >= self.strategies.len() {
            return false;
        }
        warn!(level = *level + 1, "applying degradation level");
        (self.strategies[*level])();
        *level += 1;
        true
    }

    /// Restore one level. Returns `false` if already at the base level.
    pub fn restore(&self) -> bool {
        let mut level = self.level.lock();
        if *level == 0 {
            return false;
        }
        *level -= 1;
        info!(level = *level + 1, "restored from degradation level");
        true
    }

    pub fn level(&self) -> usize {
        *self.level.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn degrade_walks_strategies_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut gd = GracefulDegradation::new();
        let o1 = Arc::clone(&order);
        gd.register_strategy(move || o1.lock().push(1));
        let o2 = Arc::clone(&order);
        gd.register_strategy(move || o2.lock().push(2));

        assert!(gd.degrade());
        assert!(gd.degrade());
        assert!(!gd.degrade());
        assert_eq!(*order.lock(), vec![1, 2]);
        assert_eq!(gd.level(), 2);
    }

    #[test]
    fn restore_cannot_go_below_base_level() {
        let gd = GracefulDegradation::new();
        assert!(!gd.restore());
    }

    #[test]
    fn restore_undoes_one_level() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut gd = GracefulDegradation::new();
        let c = Arc::clone(&counter);
        gd.register_strategy(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        gd.degrade();
        assert_eq!(gd.level(), 1);
        assert!(gd.restore());
        assert_eq!(gd.level(), 0);
    }
}
