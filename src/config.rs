use crate::controller::DEFAULT_FOCUS_LEVEL;
use crate::progress::DEFAULT_STORAGE_KEY;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when none is given
const DEFAULT_CONFIG_FILE: &str = "quest-map.toml";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub data_path: PathBuf,
    pub basemap_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub storage_key: String,
    pub default_city: String,
    pub focus_zoom_floor: u8,
    pub notice_ms: u64,
    pub pan_delay_ms: u64,
    pub pan_duration_ms: u64,
    /// Defaults to `quest-map.log` inside `storage_dir`
    pub log_file: Option<PathBuf>,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/places.json"),
            basemap_dir: PathBuf::from("data/basemap"),
            storage_dir: PathBuf::from(".quest-map"),
            storage_key: DEFAULT_STORAGE_KEY.into(),
            default_city: "kaliningrad".into(),
            focus_zoom_floor: DEFAULT_FOCUS_LEVEL,
            notice_ms: 2200,
            pan_delay_ms: 300,
            pan_duration_ms: 1200,
            log_file: None,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.storage_dir.join("quest-map.log"))
    }
}

/// Settings from the TOML file (explicit path must exist, the default one may
/// not), then `QUEST_MAP__*` environment overrides
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let mut settings = match explicit {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            parse_settings(&raw).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => match fs::read_to_string(DEFAULT_CONFIG_FILE) {
            Ok(raw) => parse_settings(&raw)
                .with_context(|| format!("parsing config {}", DEFAULT_CONFIG_FILE))?,
            Err(_) => Settings::default(),
        },
    };

    apply_env(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

fn parse_settings(raw: &str) -> Result<Settings> {
    Ok(toml::from_str(raw)?)
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("QUEST_MAP__DATA_PATH") {
        settings.data_path = v.into();
    }
    if let Some(v) = var("QUEST_MAP__BASEMAP_DIR") {
        settings.basemap_dir = v.into();
    }
    if let Some(v) = var("QUEST_MAP__STORAGE_DIR") {
        settings.storage_dir = v.into();
    }
    if let Some(v) = var("QUEST_MAP__LOG_FILTER") {
        settings.log_filter = v;
    }
}
