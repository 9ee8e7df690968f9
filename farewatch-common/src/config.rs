//! Engine configuration loading
//!
//! Pipeline tuning lives in a TOML file merged over built-in defaults,
//! with `FAREWATCH_*` environment overrides applied last:
//! 1. Environment variable (highest priority)
//! 2. TOML config file
//! 3. Compiled default

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Fare API client settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FareApiConfig {
    /// Base URL of the one-way fare search endpoint
    pub base_url: String,
    /// Currency requested from the fare API
    pub currency: String,
    /// Minimum interval between upstream requests
    pub min_request_interval_ms: u64,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for FareApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://services-api.ryanair.com/farfnd/v4".to_string(),
            currency: "EUR".to_string(),
            min_request_interval_ms: 500,
            timeout_secs: 30,
        }
    }
}

/// Push notification channel settings (ntfy-style topic server)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NtfyConfig {
    /// Server base URL
    pub server: String,
    /// Topic to publish to. Unset disables push delivery entirely.
    pub topic: Option<String>,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for NtfyConfig {
    fn default() -> Self {
        Self {
            server: "https://ntfy.sh".to_string(),
            topic: None,
            timeout_secs: 10,
        }
    }
}

/// Pipeline tuning knobs
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineConfig {
    /// Per-origin cooldown between upstream fetches
    pub scan_cooldown_minutes: u64,
    /// How far ahead to scan for fares
    pub lookup_horizon_days: u32,
    /// Hours to widen strategy hour windows on each side
    pub hour_tolerance: u32,
    /// How often each profile is refreshed
    pub update_interval_minutes: u64,
    /// Scheduler tick interval
    pub poll_interval_seconds: u64,
    /// Flights observed longer ago than this are pruned
    pub flight_staleness_hours: u64,
    /// Scan log rows older than this are pruned
    pub scan_log_retention_days: u64,
    /// Required price drop before an already-notified deal re-arms.
    /// 0.0 means any strict decrease re-arms.
    pub renotify_drop: f64,
    /// Metro-area matching radius. 0.0 disables the cross-airport pass.
    pub nearby_radius_km: f64,
    /// Concurrent profile runs in the scheduler
    pub max_workers: usize,
    /// Local hour of the daily digest. Digest is only sent when a push
    /// topic is configured.
    pub digest_hour: u32,
    pub fare_api: FareApiConfig,
    pub ntfy: NtfyConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_cooldown_minutes: 30,
            lookup_horizon_days: 120,
            hour_tolerance: 0,
            update_interval_minutes: 180,
            poll_interval_seconds: 300,
            flight_staleness_hours: 24,
            scan_log_retention_days: 7,
            renotify_drop: 0.0,
            nearby_radius_km: 0.0,
            max_workers: 3,
            digest_hour: 8,
            fare_api: FareApiConfig::default(),
            ntfy: NtfyConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration: defaults, then the TOML file (if any), then
    /// environment overrides.
    ///
    /// When `path` is `None` the default location is probed and silently
    /// skipped if absent; an explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = default_config_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file. Unknown keys are rejected.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid config file {}: {}", path.display(), e)))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        override_from_env("FAREWATCH_SCAN_COOLDOWN_MINUTES", &mut self.scan_cooldown_minutes)?;
        override_from_env("FAREWATCH_LOOKUP_HORIZON_DAYS", &mut self.lookup_horizon_days)?;
        override_from_env("FAREWATCH_HOUR_TOLERANCE", &mut self.hour_tolerance)?;
        override_from_env("FAREWATCH_UPDATE_INTERVAL_MINUTES", &mut self.update_interval_minutes)?;
        override_from_env("FAREWATCH_POLL_INTERVAL_SECONDS", &mut self.poll_interval_seconds)?;
        override_from_env("FAREWATCH_FLIGHT_STALENESS_HOURS", &mut self.flight_staleness_hours)?;
        override_from_env("FAREWATCH_SCAN_LOG_RETENTION_DAYS", &mut self.scan_log_retention_days)?;
        override_from_env("FAREWATCH_RENOTIFY_DROP", &mut self.renotify_drop)?;
        override_from_env("FAREWATCH_NEARBY_RADIUS_KM", &mut self.nearby_radius_km)?;
        override_from_env("FAREWATCH_MAX_WORKERS", &mut self.max_workers)?;
        override_from_env("FAREWATCH_DIGEST_HOUR", &mut self.digest_hour)?;
        if let Ok(v) = std::env::var("FAREWATCH_FARE_API_BASE_URL") {
            self.fare_api.base_url = v;
        }
        if let Ok(v) = std::env::var("FAREWATCH_NTFY_SERVER") {
            self.ntfy.server = v;
        }
        if let Ok(v) = std::env::var("FAREWATCH_NTFY_TOPIC") {
            self.ntfy.topic = if v.is_empty() { None } else { Some(v) };
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::Config("max_workers must be at least 1".to_string()));
        }
        if self.lookup_horizon_days == 0 {
            return Err(Error::Config("lookup_horizon_days must be at least 1".to_string()));
        }
        if self.digest_hour >= 24 {
            return Err(Error::Config(format!(
                "digest_hour must be 0-23, got {}",
                self.digest_hour
            )));
        }
        if self.renotify_drop < 0.0 {
            return Err(Error::Config("renotify_drop cannot be negative".to_string()));
        }
        if self.nearby_radius_km < 0.0 {
            return Err(Error::Config("nearby_radius_km cannot be negative".to_string()));
        }
        Ok(())
    }

    pub fn scan_cooldown(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.scan_cooldown_minutes as i64)
    }

    pub fn update_interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.update_interval_minutes as i64)
    }

    pub fn flight_staleness(&self) -> chrono::Duration {
        chrono::Duration::hours(self.flight_staleness_hours as i64)
    }

    pub fn scan_log_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.scan_log_retention_days as i64)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

fn override_from_env<T: FromStr>(key: &str, field: &mut T) -> Result<()>
where
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(key) {
        *field = raw
            .parse()
            .map_err(|e| Error::Config(format!("invalid {}='{}': {}", key, raw, e)))?;
    }
    Ok(())
}

/// Default config file location: `~/.config/farewatch/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("farewatch").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("farewatch.toml"))
}

/// Default database location: `~/.local/share/farewatch/farewatch.db`
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("farewatch").join("farewatch.db"))
        .unwrap_or_else(|| PathBuf::from("farewatch.db"))
}
