//! Centralized configuration for Ebbtide.
//!
//! All tunable parameters live here instead of being scattered through the
//! codebase. Supports environment variable overrides for runtime
//! customization.

use std::time::Duration;

/// Central configuration for all Ebbtide components.
#[derive(Debug, Clone, Default)]
pub struct EbbtideConfig {
    pub transfer: TransferConfig,
    pub storage: StorageConfig,
}

/// Bandwidth ceilings and rate-meter tuning.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Download bandwidth ceiling in bytes per second (None = uncapped)
    pub max_download_bps: Option<u64>,
    /// Upload bandwidth ceiling in bytes per second (None = uncapped)
    pub max_upload_bps: Option<u64>,
    /// Trailing window for the throughput estimators
    pub speed_window: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_download_bps: None, // Uncapped by default
            max_upload_bps: None,   // Uncapped by default
            speed_window: Duration::from_secs(3),
        }
    }
}

/// Storage layout configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// File name of the persisted catalog inside the storage root
    pub metadata_file_name: &'static str,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            metadata_file_name: "metadata.json",
        }
    }
}

impl EbbtideConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via `EBBTIDE_*` variables while
    /// keeping sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(limit) = std::env::var("EBBTIDE_MAX_DOWNLOAD_BPS")
            && let Ok(bytes) = limit.parse::<u64>()
        {
            config.transfer.max_download_bps = (bytes > 0).then_some(bytes);
        }

        if let Ok(limit) = std::env::var("EBBTIDE_MAX_UPLOAD_BPS")
            && let Ok(bytes) = limit.parse::<u64>()
        {
            config.transfer.max_upload_bps = (bytes > 0).then_some(bytes);
        }

        if let Ok(window) = std::env::var("EBBTIDE_SPEED_WINDOW_SECS")
            && let Ok(seconds) = window.parse::<u64>()
            && seconds > 0
        {
            config.transfer.speed_window = Duration::from_secs(seconds);
        }

        config
    }

    /// Creates a configuration optimized for testing: uncapped transfers
    /// and a short meter window so tests settle quickly.
    pub fn for_testing() -> Self {
        Self {
            transfer: TransferConfig {
                max_download_bps: None,
                max_upload_bps: None,
                speed_window: Duration::from_secs(1),
            },
            ..Default::default()
        }
    }
}
