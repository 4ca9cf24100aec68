//! Bridge configuration types.
//!
//! [`BridgeConfig`] is everything the stdio server needs at runtime.  `main`
//! builds it from the host's TOML file plus CLI overrides; tests build it
//! directly.

use std::time::Duration;

use printlink_host::infrastructure::storage::config::AppConfig;

/// Runtime configuration for the stdio bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Host settings (timeouts, identity tokens, worker count).
    pub app: AppConfig,

    /// Maximum number of facade operations running at once.
    pub max_concurrent: usize,

    /// How long to wait for in-flight operations after stdin closes before
    /// the remaining responses are abandoned.
    pub drain_timeout: Duration,
}

impl BridgeConfig {
    /// Takes the worker count from the `[workers]` section of `app`.
    pub fn from_app(app: AppConfig) -> Self {
        Self {
            max_concurrent: app.workers.max_concurrent,
            app,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for BridgeConfig {
    /// | Field           | Default   |
    /// |-----------------|-----------|
    /// | app             | defaults  |
    /// | max_concurrent  | 4         |
    /// | drain_timeout   | 5 seconds |
    fn default() -> Self {
        Self::from_app(AppConfig::default())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_worker_count_is_4() {
        // Arrange / Act
        let cfg = BridgeConfig::default();
        // Assert
        assert_eq!(cfg.max_concurrent, 4);
    }

    #[test]
    fn test_default_drain_timeout_is_5s() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.drain_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_worker_count_follows_app_config() {
        let mut app = AppConfig::default();
        app.workers.max_concurrent = 9;

        let cfg = BridgeConfig::from_app(app);

        assert_eq!(cfg.max_concurrent, 9);
        assert_eq!(cfg.app.workers.max_concurrent, 9);
    }
}
