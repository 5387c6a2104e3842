//! # Configuration Management
//!
//! Loads runtime settings from `navis-env.toml`: upstream endpoints and
//! timeouts, the fusion deadline, schedule policy and where the reference
//! data lives. Every section has defaults, so a partial file (or none at all)
//! still yields a working configuration.
//!
//! Service keys are never stored in the TOML file. The `[credentials]`
//! section only names the environment variables that hold them; values are
//! read from the process environment (after `.env` is applied by
//! [`Credentials::from_env`]).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default config file name in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "navis-env.toml";

/// Application configuration loaded from navis-env.toml
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Outbound HTTP behaviour shared by every provider
    pub http: HttpConfig,
    /// Per-provider endpoints
    pub providers: ProvidersConfig,
    /// Environment variable names for service keys
    pub credentials: CredentialNames,
    pub fusion: FusionConfig,
    pub schedule: ScheduleConfig,
    /// JSON file with buoys, tide stations, fishing spots and coastal points
    pub reference_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    /// Extra attempts after a transport error or 5xx; 0 disables retry
    pub max_retries: u32,
    /// Base delay, doubled on each retry
    pub retry_backoff_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("navis-env/", env!("CARGO_PKG_VERSION")).to_string(),
            max_retries: 0,
            retry_backoff_ms: 250,
        }
    }
}

/// One upstream endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EndpointConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl EndpointConfig {
    fn new(base_url: &str, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.to_string(),
            timeout_secs,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FishingIndexConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// numOfRows per page request
    pub rows_per_page: u32,
    /// Pages fetched per category while pages come back full
    pub max_pages: u32,
}

impl FishingIndexConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FishingIndexConfig {
    fn default() -> Self {
        Self {
            base_url: "https://apis.data.go.kr/1192136/fcstFishing/GetFcstFishingApiService".to_string(),
            timeout_secs: 15,
            rows_per_page: 300,
            max_pages: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub fishing_index: FishingIndexConfig,
    pub buoy: EndpointConfig,
    pub nowcast: EndpointConfig,
    pub tide_station: EndpointConfig,
    pub lunar_calendar: EndpointConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            fishing_index: FishingIndexConfig::default(),
            buoy: EndpointConfig::new("http://www.khoa.go.kr/api/oceangrid/buObsRecent/search.do", 5),
            nowcast: EndpointConfig::new(
                "http://apis.data.go.kr/1360000/VilageFcstInfoService_2.0/getUltraSrtNcst",
                5,
            ),
            tide_station: EndpointConfig::new("https://www.khoa.go.kr/api/oceangrid/tideObsPreTab/search.do", 10),
            lunar_calendar: EndpointConfig::new(
                "http://apis.data.go.kr/B090041/openapi/service/LrsrCldInfoService/getLunCalInfo",
                10,
            ),
        }
    }
}

/// Names of the environment variables holding service keys.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialNames {
    /// Public data portal key (nowcast and fishing index)
    pub kma_key_var: String,
    /// KHOA ocean key (buoys and tide predictions)
    pub ocean_key_var: String,
    pub lunar_key_var: String,
}

impl Default for CredentialNames {
    fn default() -> Self {
        Self {
            kma_key_var: "KMA_SERVICE_KEY".to_string(),
            ocean_key_var: "OceanServiceKey".to_string(),
            lunar_key_var: "LUN_CAL_SERVICE_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Deadline over the whole fan-out, in seconds
    pub deadline_secs: u64,
    /// Estimate the lunar day locally when the lunar calendar feed fails
    pub offline_lunar_fallback: bool,
}

impl FusionConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            deadline_secs: 20,
            offline_lunar_fallback: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Status code marking a bookable slot
    pub open_status: String,
    /// Upper clamp for window queries
    pub max_window_days: u32,
}

impl ScheduleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.sunsang24.com/ship/schedule_fleet_list".to_string(),
            timeout_secs: 5,
            open_status: "ING".to_string(),
            max_window_days: 7,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            providers: ProvidersConfig::default(),
            credentials: CredentialNames::default(),
            fusion: FusionConfig::default(),
            schedule: ScheduleConfig::default(),
            reference_path: default_reference_path(),
        }
    }
}

impl Config {
    /// Load configuration from navis-env.toml
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::try_load_from_path(&path) {
            Ok(config) => {
                info!(path = %path.as_ref().display(), "loaded configuration");
                config
            }
            Err(ConfigError::Io(e)) => {
                info!(path = %path.as_ref().display(), error = %e, "no config file, using defaults");
                Self::default()
            }
            Err(e) => {
                warn!(path = %path.as_ref().display(), error = %e, "invalid config file, using defaults");
                Self::default()
            }
        }
    }

    /// Strict variant of [`Config::load_from_path`].
    pub fn try_load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        if config.reference_path.as_os_str().is_empty() {
            config.reference_path = default_reference_path();
        }
        Ok(config)
    }

    /// Write the configuration as pretty TOML.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self).map_err(|e| {
            ConfigError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        fs::write(&path, contents)?;
        info!(path = %path.as_ref().display(), "configuration saved");
        Ok(())
    }
}

fn default_reference_path() -> PathBuf {
    PathBuf::from("data/reference.json")
}

/// Service keys resolved from the environment.
///
/// A missing key is not an error here; the adapter that needs it reports
/// itself unavailable.
#[derive(Clone, Default, PartialEq)]
pub struct Credentials {
    pub kma: Option<String>,
    pub ocean: Option<String>,
    pub lunar: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("kma", &self.kma.is_some())
            .field("ocean", &self.ocean.is_some())
            .field("lunar", &self.lunar.is_some())
            .finish()
    }
}

impl Credentials {
    /// Apply `.env` if present, then read the named variables.
    pub fn from_env(names: &CredentialNames) -> Self {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                warn!(error = %e, "could not read .env");
            }
        }
        Self::from_lookup(names, |var| env::var(var).ok())
    }

    /// Read keys through `lookup`. Blank values count as missing.
    pub fn from_lookup(names: &CredentialNames, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |var: &str| {
            let value = lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
            if value.is_none() {
                warn!(variable = var, "service key not set");
            }
            value
        };
        Self {
            kma: read(&names.kma_key_var),
            ocean: read(&names.ocean_key_var),
            lunar: read(&names.lunar_key_var),
        }
    }
}
