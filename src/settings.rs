use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
    time::Duration,
};

use crate::{
    bridge::OverlayGeometry,
    predictor::DEFAULT_CONFIDENCE_THRESHOLD,
    timer::TimerConfig,
};

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OverlaySettings {
    pub enabled: bool,
    pub width: u32,
    pub height: u32,
    pub always_on_top: bool,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        let geometry = OverlayGeometry::default();
        Self {
            enabled: true,
            width: geometry.width,
            height: geometry.height,
            always_on_top: geometry.always_on_top,
        }
    }
}

impl OverlaySettings {
    pub fn geometry(&self) -> Option<OverlayGeometry> {
        self.enabled.then_some(OverlayGeometry {
            width: self.width,
            height: self.height,
            always_on_top: self.always_on_top,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub predictor_url: String,
    pub feedback_url: String,
    pub http_timeout_secs: u64,
    pub confidence_threshold: f64,
    pub tick_interval_ms: u64,
    pub closure_poll_interval_ms: u64,
    pub overlay: OverlaySettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            predictor_url: "http://localhost:8000/api/v1/predict".into(),
            feedback_url: "http://localhost:8000/api/feedback".into(),
            http_timeout_secs: 5,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            tick_interval_ms: 1000,
            closure_poll_interval_ms: 1000,
            overlay: OverlaySettings::default(),
        }
    }
}

/// Values taken from the command line or environment. Never written back
/// to the settings file.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub predictor_url: Option<String>,
    pub feedback_url: Option<String>,
    pub no_overlay: bool,
}

impl AppSettings {
    pub fn apply(&mut self, overrides: &SettingsOverrides) {
        if let Some(url) = &overrides.predictor_url {
            self.predictor_url = url.clone();
        }
        if let Some(url) = &overrides.feedback_url {
            self.feedback_url = url.clone();
        }
        if overrides.no_overlay {
            self.overlay.enabled = false;
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn timer_config(&self) -> TimerConfig {
        TimerConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            closure_poll_interval: Duration::from_millis(self.closure_poll_interval_ms.max(1)),
            overlay: self.overlay.geometry(),
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<AppSettings>,
}

impl SettingsStore {
    /// Loads `path`, falling back to defaults when it is missing or
    /// malformed.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring malformed settings in {}: {err}", path.display());
                AppSettings::default()
            })
        } else {
            AppSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> AppSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update(&self, settings: AppSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &AppSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join(SETTINGS_FILE)).unwrap();
        assert_eq!(store.get(), AppSettings::default());
        assert_eq!(store.get().confidence_threshold, 0.7);
    }

    #[test]
    fn malformed_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "{ predictor_url: ").unwrap();
        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.get(), AppSettings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(
            &path,
            r#"{"predictor_url": "http://ml:9000/predict", "overlay": {"width": 320}}"#,
        )
        .unwrap();

        let settings = SettingsStore::new(path).unwrap().get();
        assert_eq!(settings.predictor_url, "http://ml:9000/predict");
        assert_eq!(settings.overlay.width, 320);
        assert_eq!(settings.overlay.height, 100);
        assert_eq!(settings.tick_interval_ms, 1000);
    }

    #[test]
    fn update_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.get();
        settings.http_timeout_secs = 12;
        settings.overlay.always_on_top = false;
        store.update(settings.clone()).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.get(), settings);
        assert_eq!(reopened.get().http_timeout_secs, 12);
    }

    #[test]
    fn overrides_win_over_file_values() {
        let mut settings = AppSettings::default();
        settings.apply(&SettingsOverrides {
            predictor_url: Some("http://other/predict".into()),
            feedback_url: None,
            no_overlay: true,
        });

        assert_eq!(settings.predictor_url, "http://other/predict");
        assert_eq!(settings.feedback_url, AppSettings::default().feedback_url);
        assert_eq!(settings.timer_config().overlay, None);
    }

    #[test]
    fn timer_config_follows_intervals() {
        let settings = AppSettings {
            tick_interval_ms: 250,
            ..Default::default()
        };
        let config = settings.timer_config();
        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.closure_poll_interval, Duration::from_secs(1));
        assert_eq!(config.overlay, Some(OverlayGeometry::default()));
    }
}
