//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub transit: TransitConfig,
    #[serde(default)]
    pub guest: GuestConfig,
}

impl Config {
    /// Load from a TOML file, or fall back to defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall timers or lock every guest out.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.transit.tick_ms == 0 {
            anyhow::bail!("transit.tick_ms must be positive");
        }
        if self.api.request_timeout_ms == 0 || self.api.route_timeout_ms == 0 {
            anyhow::bail!("api timeouts must be positive");
        }
        if self.guest.max_verify_attempts == 0 {
            anyhow::bail!("guest.max_verify_attempts must be at least 1");
        }
        Ok(())
    }
}

/// Remote services (directory, routing, OTP share one base URL)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the directory service
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for directory and OTP calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Timeout for safe-route calls
    #[serde(default = "default_route_timeout")]
    pub route_timeout_ms: u64,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn route_timeout(&self) -> Duration {
        Duration::from_millis(self.route_timeout_ms)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout(),
            route_timeout_ms: default_route_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Relief center poll interval
    #[serde(default = "default_centers_interval")]
    pub centers_interval_ms: u64,

    /// Aid request poll interval
    #[serde(default = "default_requests_interval")]
    pub requests_interval_ms: u64,

    /// Hazard zone poll interval (0 = fetch at init and on demand only)
    #[serde(default)]
    pub hazards_interval_ms: u64,

    /// SOS alert poll interval (0 = fetch at init and on demand only)
    #[serde(default)]
    pub sos_interval_ms: u64,

    /// Connectivity probe interval (0 = disabled)
    #[serde(default = "default_probe_interval")]
    pub probe_interval_ms: u64,

    /// Only poll requests addressed to this center
    #[serde(default)]
    pub request_center_id: Option<String>,

    /// Run one tick immediately when connectivity returns
    #[serde(default = "default_true")]
    pub refresh_on_reconnect: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            centers_interval_ms: default_centers_interval(),
            requests_interval_ms: default_requests_interval(),
            hazards_interval_ms: 0,
            sos_interval_ms: 0,
            probe_interval_ms: default_probe_interval(),
            request_center_id: None,
            refresh_on_reconnect: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the cache database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitConfig {
    /// Delay between two simulated vehicle steps
    #[serde(default = "default_tick")]
    pub tick_ms: u64,
}

impl TransitConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Default for TransitConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestConfig {
    /// Minimum digits a phone number must carry before a code is requested
    #[serde(default = "default_min_phone_digits")]
    pub min_phone_digits: usize,

    /// Mismatches tolerated per issued code before it is invalidated
    #[serde(default = "default_max_attempts")]
    pub max_verify_attempts: u32,

    /// Lifetime of an issued code
    #[serde(default = "default_code_ttl")]
    pub code_ttl_secs: u64,
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            min_phone_digits: default_min_phone_digits(),
            max_verify_attempts: default_max_attempts(),
            code_ttl_secs: default_code_ttl(),
        }
    }
}

// Defaults
fn default_base_url() -> String { "http://localhost:8000".to_string() }
fn default_request_timeout() -> u64 { 5000 }
fn default_route_timeout() -> u64 { 10_000 }
fn default_centers_interval() -> u64 { 10_000 }
fn default_requests_interval() -> u64 { 5000 }
fn default_probe_interval() -> u64 { 15_000 }
fn default_true() -> bool { true }
fn default_data_dir() -> PathBuf { PathBuf::from("./relief-data") }
fn default_tick() -> u64 { 200 }
fn default_min_phone_digits() -> usize { 10 }
fn default_max_attempts() -> u32 { 5 }
fn default_code_ttl() -> u64 { 300 }
