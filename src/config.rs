//! Configuration for the Synheart Tier Digest.

use crate::analysis::AnalysisConfig;
use crate::core::tier::{Tier, TierWindows};
use crate::registry::DEFAULT_RECENCY_DAYS;
use crate::scheduler::DEFAULT_PARENT_SETTLE;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the digest agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Window lengths and which tiers run
    pub tiers: TierConfig,

    /// Where Base tier evidence comes from
    pub evidence: EvidenceConfig,

    /// External analysis service
    pub analysis: AnalysisConfig,

    /// Taxonomy context settings
    pub registry: RegistryConfig,

    /// Only run inside these local hours, if set
    pub active_hours: Option<ActiveHours>,

    /// Whether processing is currently paused
    pub paused: bool,

    /// Path for records, taxonomy and the status snapshot
    pub data_path: PathBuf,

    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("synheart-tier-digest");

        Self {
            tiers: TierConfig::default(),
            evidence: EvidenceConfig {
                capture_dir: data_dir.join("captures"),
                ..EvidenceConfig::default()
            },
            analysis: AnalysisConfig::default(),
            registry: RegistryConfig::default(),
            active_hours: None,
            paused: false,
            data_path: data_dir,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("synheart-tier-digest")
            .join("config.json")
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tiers.windows().check().map_err(ConfigError::Invalid)?;

        if self.evidence.max_count == 0 {
            return Err(ConfigError::Invalid(
                "evidence.max_count must be at least 1".to_string(),
            ));
        }
        if self.tiers.parent_settle_secs >= u64::from(self.tiers.base_minutes) * 60 {
            return Err(ConfigError::Invalid(
                "tiers.parent_settle_secs must be shorter than the base window".to_string(),
            ));
        }
        if self.analysis.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "analysis.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if let Some(hours) = &self.active_hours {
            hours.validate()?;
        }
        Ok(())
    }

    /// Root of the per-tier record directories.
    pub fn records_path(&self) -> PathBuf {
        self.data_path.join("records")
    }

    pub fn taxonomy_path(&self) -> PathBuf {
        self.data_path.join("taxonomy.json")
    }

    /// Where the scheduler writes its status snapshot.
    pub fn status_path(&self) -> PathBuf {
        self.data_path.join("status.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(self.records_path())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.evidence.capture_dir)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }
}

/// Tier window lengths and enable flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub base_minutes: u32,
    pub mid_minutes: u32,
    pub top_minutes: u32,
    pub base_enabled: bool,
    pub mid_enabled: bool,
    pub top_enabled: bool,
    /// Seconds a scheduled Mid/Top run waits for its child tier to finish
    /// the same boundary
    pub parent_settle_secs: u64,
}

impl Default for TierConfig {
    fn default() -> Self {
        let windows = TierWindows::default();
        Self {
            base_minutes: windows.base_minutes,
            mid_minutes: windows.mid_minutes,
            top_minutes: windows.top_minutes,
            base_enabled: true,
            mid_enabled: true,
            top_enabled: true,
            parent_settle_secs: DEFAULT_PARENT_SETTLE.as_secs(),
        }
    }
}

impl TierConfig {
    pub fn windows(&self) -> TierWindows {
        TierWindows {
            base_minutes: self.base_minutes,
            mid_minutes: self.mid_minutes,
            top_minutes: self.top_minutes,
        }
    }

    pub fn is_enabled(&self, tier: Tier) -> bool {
        match tier {
            Tier::Base => self.base_enabled,
            Tier::Mid => self.mid_enabled,
            Tier::Top => self.top_enabled,
        }
    }

    /// Parse tier names from a comma-separated string ("all" enables every tier).
    pub fn enabled_from_csv(&mut self, s: &str) {
        let names: Vec<String> = s.split(',').map(|s| s.trim().to_lowercase()).collect();
        let all = names.iter().any(|n| n == "all");

        self.base_enabled = all || names.iter().any(|n| n == "base");
        self.mid_enabled = all || names.iter().any(|n| n == "mid");
        self.top_enabled = all || names.iter().any(|n| n == "top");
    }

    /// Check if at least one tier is enabled.
    pub fn any_enabled(&self) -> bool {
        self.base_enabled || self.mid_enabled || self.top_enabled
    }
}

/// Evidence source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    /// Directory the external capture process writes into
    pub capture_dir: PathBuf,
    /// Maximum evidence items per Base window
    pub max_count: usize,
    /// Accepted capture file extensions
    pub extensions: Vec<String>,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            capture_dir: PathBuf::from("captures"),
            max_count: 5,
            extensions: vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()],
        }
    }
}

/// Taxonomy context settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Proposed behaviors unused for this many days are hidden from requests
    pub proposed_recency_days: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            proposed_recency_days: DEFAULT_RECENCY_DAYS,
        }
    }
}

/// Local hours during which tiers may run.
///
/// `start_hour` is inclusive and `end_hour` exclusive. A range with
/// `start_hour > end_hour` wraps past midnight; equal hours mean all day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveHours {
    pub start_hour: u32,
    pub end_hour: u32,
    /// IANA timezone name, e.g. "Europe/Berlin"
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl ActiveHours {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_hour > 23 || self.end_hour > 23 {
            return Err(ConfigError::Invalid(format!(
                "active hours must be between 0 and 23, got {}-{}",
                self.start_hour, self.end_hour
            )));
        }
        self.tz().map(|_| ())
    }

    fn tz(&self) -> Result<chrono_tz::Tz, ConfigError> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| ConfigError::Invalid(format!("unknown timezone '{}': {e}", self.timezone)))
    }

    /// Whether `now` falls inside the active hours.
    pub fn contains(&self, now: DateTime<Utc>) -> Result<bool, ConfigError> {
        let hour = now.with_timezone(&self.tz()?).hour();
        Ok(match self.start_hour.cmp(&self.end_hour) {
            std::cmp::Ordering::Equal => true,
            std::cmp::Ordering::Less => hour >= self.start_hour && hour < self.end_hour,
            std::cmp::Ordering::Greater => hour >= self.start_hour || hour < self.end_hour,
        })
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tiers.windows(), TierWindows::default());
        assert!(config.tiers.any_enabled());
        assert_eq!(config.evidence.max_count, 5);
        assert_eq!(config.registry.proposed_recency_days, 7);
        assert!(!config.paused);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tier_csv_parsing() {
        let mut tiers = TierConfig::default();
        tiers.enabled_from_csv("base,mid");
        assert!(tiers.base_enabled);
        assert!(tiers.mid_enabled);
        assert!(!tiers.top_enabled);

        tiers.enabled_from_csv("all");
        assert!(tiers.top_enabled);

        tiers.enabled_from_csv("nothing");
        assert!(!tiers.any_enabled());
    }

    #[test]
    fn test_validate_rejects_uneven_windows() {
        let mut config = Config::default();
        config.tiers.mid_minutes = 9;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.tiers.base_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_long_parent_settle() {
        let mut config = Config::default();
        assert_eq!(config.tiers.parent_settle_secs, 30);
        config.tiers.parent_settle_secs = 120;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"paused": true, "tiers": {"top_enabled": false}}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(config.paused);
        assert!(!config.tiers.top_enabled);
        assert_eq!(config.tiers.base_minutes, 2);

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_active_hours() {
        let hours = ActiveHours {
            start_hour: 9,
            end_hour: 17,
            timezone: "UTC".to_string(),
        };
        let at = |h| Utc.with_ymd_and_hms(2024, 3, 4, h, 30, 0).unwrap();
        assert!(hours.contains(at(9)).unwrap());
        assert!(!hours.contains(at(17)).unwrap());

        let overnight = ActiveHours {
            start_hour: 22,
            end_hour: 6,
            timezone: "UTC".to_string(),
        };
        assert!(overnight.contains(at(23)).unwrap());
        assert!(overnight.contains(at(2)).unwrap());
        assert!(!overnight.contains(at(12)).unwrap());
    }

    #[test]
    fn test_active_hours_timezone() {
        let hours = ActiveHours {
            start_hour: 9,
            end_hour: 17,
            timezone: "Asia/Tokyo".to_string(),
        };
        // 01:00 UTC is 10:00 in Tokyo
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 1, 0, 0).unwrap();
        assert!(hours.contains(now).unwrap());

        let bad = ActiveHours {
            timezone: "Mars/Olympus".to_string(),
            ..hours
        };
        assert!(bad.validate().is_err());
    }
}
