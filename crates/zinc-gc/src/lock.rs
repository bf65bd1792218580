//! Scoped collector lock.

use crate::gc::Collector;

/// Holds the collector lock for its lifetime.
///
/// Raw [`NodeRef`](crate::NodeRef)s held in local variables are invisible
/// to the collector. Keep a `GcLock` alive while building a structure out of
/// several allocations, then root the result before releasing it. The lock
/// is released on every exit path, including early returns and unwinding.
///
/// ```
/// use zinc_gc::{Collector, GcLock};
///
/// let gc = Collector::new();
/// {
///     let _outer = GcLock::new(&gc);
///     let _inner = GcLock::new(&gc);
///     assert_eq!(gc.lock_count(), 2);
/// }
/// assert!(!gc.is_locked());
/// ```
#[must_use = "the collector is unlocked as soon as the guard is dropped"]
#[derive(Debug)]
pub struct GcLock<'a> {
    collector: &'a Collector,
}

impl<'a> GcLock<'a> {
    /// Lock `collector` until the guard is dropped.
    pub fn new(collector: &'a Collector) -> Self {
        collector.lock();
        Self { collector }
    }
}

impl Drop for GcLock<'_> {
    fn drop(&mut self) {
        self.collector.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use crate::error::GcError;

    fn locked_work(gc: &Collector, bail: bool) -> Result<(), GcError> {
        let _lock = GcLock::new(gc);
        if bail {
            return Err(GcError::NoCheckpoint);
        }
        Ok(())
    }

    #[test]
    fn released_on_early_return() {
        let gc = Collector::with_config(GcConfig::manual());
        assert!(locked_work(&gc, true).is_err());
        assert!(!gc.is_locked());
        assert!(locked_work(&gc, false).is_ok());
        assert!(!gc.is_locked());
    }

    #[test]
    fn released_on_unwind() {
        let gc = Collector::with_config(GcConfig::manual());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _lock = GcLock::new(&gc);
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(gc.lock_count(), 0);
    }

    #[test]
    fn trigger_fails_while_held() {
        let gc = Collector::with_config(GcConfig::manual());
        let lock = GcLock::new(&gc);
        assert_eq!(gc.try_trigger().unwrap_err(), GcError::Locked { depth: 1 });
        drop(lock);
        assert!(gc.try_trigger().is_ok());
    }
}
