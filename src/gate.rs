//! Allowed-time gates consulted at the start of every tier run.

use crate::config::{ActiveHours, Config};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Mutex;

/// Decides whether a tier may run right now.
pub trait AllowedTimeGate: Send + Sync {
    fn is_allowed_now(&self, now: DateTime<Utc>) -> bool;
}

/// Gate that never blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAllowed;

impl AllowedTimeGate for AlwaysAllowed {
    fn is_allowed_now(&self, _now: DateTime<Utc>) -> bool {
        true
    }
}

/// The parts of [`Config`] the gate looks at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateSettings {
    pub paused: bool,
    pub active_hours: Option<ActiveHours>,
}

impl GateSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            paused: config.paused,
            active_hours: config.active_hours.clone(),
        }
    }

    pub fn allows(&self, now: DateTime<Utc>) -> bool {
        if self.paused {
            return false;
        }
        match &self.active_hours {
            None => true,
            Some(hours) => match hours.contains(now) {
                Ok(inside) => inside,
                Err(e) => {
                    tracing::warn!("Ignoring active hours: {}", e);
                    true
                }
            },
        }
    }
}

/// Gate driven by the config file, re-read on every check so that the
/// `pause` and `resume` commands take effect on a running agent.
///
/// If the file cannot be read the last settings that loaded are kept.
pub struct ConfigGate {
    path: PathBuf,
    last_good: Mutex<GateSettings>,
}

impl ConfigGate {
    pub fn new(path: impl Into<PathBuf>, initial: &Config) -> Self {
        Self {
            path: path.into(),
            last_good: Mutex::new(GateSettings::from_config(initial)),
        }
    }

    fn current(&self) -> GateSettings {
        let fallback = || {
            self.last_good
                .lock()
                .map(|s| s.clone())
                .unwrap_or_default()
        };

        match Config::load_from(&self.path) {
            Ok(config) => {
                let settings = GateSettings::from_config(&config);
                if let Ok(mut last) = self.last_good.lock() {
                    if *last != settings {
                        tracing::info!(paused = settings.paused, "Gate settings changed");
                    }
                    *last = settings.clone();
                }
                settings
            }
            Err(e) => {
                tracing::warn!(path = ?self.path, "Could not re-read config for gate: {}", e);
                fallback()
            }
        }
    }
}

impl AllowedTimeGate for ConfigGate {
    fn is_allowed_now(&self, now: DateTime<Utc>) -> bool {
        self.current().allows(now)
    }
}
