use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR_NAME: &str = "gitgraph-rs";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub layout_settings: LayoutSettings,
    pub animation_settings: AnimationSettings,
    pub load_settings: LoadSettings,
}

/// Geometry of the graph, in view units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    pub lane_offset: f64,
    pub lane_width: f64,
    pub main_radius: f64,
    pub side_radius: f64,
    pub header_band: f64, // room for the "new commit" affordance
    pub single_step: f64,
    pub double_step: f64,
    pub selected_extra_spacing: f64,
    pub edge_margin: f64,
    pub bottom_margin: f64,
    pub right_margin: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationSettings {
    pub duration_ms: u64,
    pub elastic_period: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadSettings {
    pub commit_limit: usize,
    pub show_more_step: usize,
    pub default_remote: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            layout_settings: LayoutSettings::default(),
            animation_settings: AnimationSettings::default(),
            load_settings: LoadSettings::default(),
        }
    }
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            lane_offset: 30.0,
            lane_width: 60.0,
            main_radius: 30.0,
            side_radius: 15.0,
            header_band: 60.0,
            single_step: 60.0,
            double_step: 120.0,
            selected_extra_spacing: 180.0,
            edge_margin: 4.0,
            bottom_margin: 80.0,
            right_margin: 60.0,
        }
    }
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self {
            duration_ms: 750,
            elastic_period: 0.3,
        }
    }
}

impl AnimationSettings {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            commit_limit: 100,
            show_more_step: 100,
            default_remote: "origin".to_string(),
        }
    }
}

impl GraphConfig {
    /// Path of the user config file, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Read a config file, falling back to defaults when it is missing or invalid.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(path) = Self::default_path() {
            self.save_to(&path)?;
        }
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
