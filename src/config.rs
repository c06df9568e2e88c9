//! Runtime-configurable tuning parameters.
//!
//! All values have sensible defaults. Override via environment variables
//! (prefixed `ADASUM_`) or by constructing a custom `AdasumConfig`.

use std::time::Duration;

/// Tuning parameters for transport and the reduction engine.
#[derive(Debug, Clone)]
pub struct AdasumConfig {
    /// Timeout for individual send/recv operations within collectives.
    pub collective_timeout: Duration,

    /// Timeout for forming the full peer mesh at startup.
    pub bootstrap_timeout: Duration,

    /// Squared-norm floor below which an Adasum scaling coefficient
    /// degrades to 1.0 (plain addition) instead of dividing by a
    /// vanishing norm.
    pub adasum_epsilon: f64,
}

impl Default for AdasumConfig {
    fn default() -> Self {
        Self {
            collective_timeout: Duration::from_secs(30),
            bootstrap_timeout: Duration::from_secs(30),
            adasum_epsilon: 1e-8,
        }
    }
}

impl AdasumConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `ADASUM_COLLECTIVE_TIMEOUT_SECS`
    /// - `ADASUM_BOOTSTRAP_TIMEOUT_SECS`
    /// - `ADASUM_EPSILON`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("ADASUM_COLLECTIVE_TIMEOUT_SECS") {
            if let Ok(s) = v.parse::<u64>() {
                cfg.collective_timeout = Duration::from_secs(s);
            }
        }
        if let Ok(v) = std::env::var("ADASUM_BOOTSTRAP_TIMEOUT_SECS") {
            if let Ok(s) = v.parse::<u64>() {
                cfg.bootstrap_timeout = Duration::from_secs(s);
            }
        }
        if let Ok(v) = std::env::var("ADASUM_EPSILON") {
            if let Ok(e) = v.parse::<f64>() {
                cfg.adasum_epsilon = e;
            }
        }

        cfg
    }
}
