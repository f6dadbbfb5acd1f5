//! crates/cv_builder_core/src/autosave/config.rs

use std::time::Duration;

use crate::domain::DEFAULT_TEMPLATE_ID;

/// Tuning knobs for one editor session.
#[derive(Debug, Clone)]
pub struct AutoSaveConfig {
    /// Period between scheduled save attempts.
    pub interval: Duration,
    /// Upper bound on a single flush, so the in-flight flag is always released.
    pub flush_timeout: Duration,
    /// How long `Saved` stays visible before reverting.
    pub saved_display: Duration,
    /// How long `Failed` stays visible before reverting.
    pub failed_display: Duration,
    /// Template recorded on newly created records.
    pub template_id: String,
}

impl AutoSaveConfig {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
    pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_SAVED_DISPLAY: Duration = Duration::from_secs(2);
    pub const DEFAULT_FAILED_DISPLAY: Duration = Duration::from_secs(5);

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            flush_timeout: Self::DEFAULT_FLUSH_TIMEOUT,
            saved_display: Self::DEFAULT_SAVED_DISPLAY,
            failed_display: Self::DEFAULT_FAILED_DISPLAY,
            template_id: DEFAULT_TEMPLATE_ID.to_string(),
        }
    }
}
