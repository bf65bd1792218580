//! Collector configuration.
//!
//! Every [`Collector`](crate::Collector) is created from a [`GcConfig`]. The
//! process-wide default returned by [`default_config`] is what
//! [`Collector::new`](crate::Collector::new) uses, so a compiler driver can
//! set the policy once before spawning its workers.

use std::time::Duration;

use parking_lot::{const_rwlock, RwLock};

/// Initial allocation volume, in bytes, between automatic collections.
pub const DEFAULT_THRESHOLD: usize = 10 * 1024 * 1024;

/// Factor applied to the threshold when survivors fill more than half of it.
pub const DEFAULT_GROWTH_FACTOR: f64 = 2.0;

/// Tuning knobs of one collector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GcConfig {
    /// Bytes allocated since the last collection that make the next
    /// allocation collect. `usize::MAX` disables threshold collections.
    pub threshold: usize,
    /// Threshold growth factor, applied after a collection whose surviving
    /// bytes exceed half the threshold. Values `<= 1.0` keep it fixed.
    pub growth_factor: f64,
    /// Wall-clock time after which the next allocation collects, or `None`.
    pub timeout: Option<Duration>,
}

impl GcConfig {
    /// The built-in defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            timeout: None,
        }
    }

    /// Set the allocation threshold.
    #[must_use]
    pub const fn threshold(mut self, bytes: usize) -> Self {
        self.threshold = bytes;
        self
    }

    /// Set the threshold growth factor.
    #[must_use]
    pub const fn growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = factor;
        self
    }

    /// Set the timeout in milliseconds, 0 disables it.
    #[must_use]
    pub const fn timeout_ms(mut self, millis: u64) -> Self {
        self.timeout = timeout_from_millis(millis);
        self
    }

    /// Configuration that never collects automatically.
    #[must_use]
    pub const fn manual() -> Self {
        Self::new().threshold(usize::MAX).timeout_ms(0)
    }

    /// Threshold to use after a collection that left `surviving` bytes.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn next_threshold(&self, current: usize, surviving: usize) -> usize {
        if self.growth_factor <= 1.0 || current == usize::MAX || surviving <= current / 2 {
            return current;
        }
        let grown = current as f64 * self.growth_factor;
        if grown >= usize::MAX as f64 {
            usize::MAX
        } else {
            grown as usize
        }
    }
}

impl Default for GcConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) const fn timeout_from_millis(millis: u64) -> Option<Duration> {
    if millis == 0 {
        None
    } else {
        Some(Duration::from_millis(millis))
    }
}

static DEFAULT_CONFIG: RwLock<GcConfig> = const_rwlock(GcConfig::new());

/// The configuration new collectors start from.
#[must_use]
pub fn default_config() -> GcConfig {
    *DEFAULT_CONFIG.read()
}

/// Replace the configuration new collectors start from.
///
/// Collectors that already exist keep their own configuration.
pub fn set_default_config(config: GcConfig) {
    *DEFAULT_CONFIG.write() = config;
}
