use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};
use tokio::sync::watch;

use crate::sensing::DutyCycleConfig;

/// User-tunable sampling parameters, stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SamplingSettings {
    pub sleep_between_measures_secs: u64,
    pub update_duration_secs: u64,
    pub min_location_time_secs: u64,
    pub min_location_distance_m: u64,
    /// Export file name, relative to the export root.
    pub export_name: String,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            sleep_between_measures_secs: 30,
            update_duration_secs: 30,
            min_location_time_secs: 60,
            min_location_distance_m: 50,
            export_name: "SignalStrength/data".into(),
        }
    }
}

impl SamplingSettings {
    pub fn duty_cycle(&self) -> DutyCycleConfig {
        DutyCycleConfig::new(
            Duration::from_secs(self.min_location_time_secs),
            self.min_location_distance_m as f64,
            Duration::from_secs(self.update_duration_secs),
            Duration::from_secs(self.sleep_between_measures_secs),
        )
    }
}

/// JSON-backed settings. Every update is written through and broadcast to
/// subscribers, which the sampler uses to restart itself.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<SamplingSettings>,
    changes: watch::Sender<SamplingSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings at {}: {err}", path.display());
                SamplingSettings::default()
            })
        } else {
            SamplingSettings::default()
        };

        let (changes, _) = watch::channel(data.clone());
        Ok(Self {
            path,
            data: RwLock::new(data),
            changes,
        })
    }

    pub fn sampling(&self) -> SamplingSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SamplingSettings> {
        self.changes.subscribe()
    }

    pub fn update_sampling(&self, settings: SamplingSettings) -> Result<()> {
        {
            let mut guard = match self.data.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            self.persist(&settings)?;
            *guard = settings.clone();
        }
        self.changes.send_replace(settings);
        Ok(())
    }

    fn persist(&self, data: &SamplingSettings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
