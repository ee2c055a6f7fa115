use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::locator::MatchPolicy;

pub const DEFAULT_RADIUS: usize = 5;
pub const DEFAULT_ACCEPT_THRESHOLD: f32 = 0.75;
pub const DEFAULT_SCROLL_DEBOUNCE_MS: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Always take the best-scoring span.
    Lenient,
    /// Only take spans scoring above the accept threshold.
    #[default]
    Strict,
}

/// Construction-time settings for one viewer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub focal_page: usize,
    pub quote: String,
    pub radius: usize,
    pub accept_threshold: f32,
    pub match_mode: MatchMode,
    pub scroll_debounce_ms: u64,
    pub scale: f32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            focal_page: 1,
            quote: String::new(),
            radius: DEFAULT_RADIUS,
            accept_threshold: DEFAULT_ACCEPT_THRESHOLD,
            match_mode: MatchMode::default(),
            scroll_debounce_ms: DEFAULT_SCROLL_DEBOUNCE_MS,
            scale: 1.0,
        }
    }
}

impl ViewerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: ViewerConfig = toml::from_str(raw).context("failed to parse viewer config")?;
        Ok(config.normalized())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config file {:?}", path))
    }

    /// Clamps values into their usable ranges.
    pub fn normalized(mut self) -> Self {
        self.focal_page = self.focal_page.max(1);
        self.accept_threshold = if self.accept_threshold.is_finite() {
            self.accept_threshold.clamp(0.0, 1.0)
        } else {
            DEFAULT_ACCEPT_THRESHOLD
        };
        if !self.scale.is_finite() || self.scale <= 0.0 {
            self.scale = 1.0;
        }
        self
    }

    pub fn match_policy(&self) -> MatchPolicy {
        match self.match_mode {
            MatchMode::Lenient => MatchPolicy::BestEffort,
            MatchMode::Strict => MatchPolicy::Threshold(self.accept_threshold),
        }
    }

    pub fn scroll_debounce(&self) -> Duration {
        Duration::from_millis(self.scroll_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = ViewerConfig::from_toml_str("quote = \"hello\"\n").unwrap();
        assert_eq!(config.quote, "hello");
        assert_eq!(config.radius, DEFAULT_RADIUS);
        assert_eq!(config.focal_page, 1);
        assert_eq!(config.match_mode, MatchMode::Strict);
        assert_eq!(config.scroll_debounce(), Duration::from_millis(200));
    }

    #[test]
    fn values_are_clamped() {
        let config = ViewerConfig::from_toml_str(
            "focal_page = 0\naccept_threshold = 3.5\nscale = -2.0\nmatch_mode = \"lenient\"\n",
        )
        .unwrap();
        assert_eq!(config.focal_page, 1);
        assert_eq!(config.accept_threshold, 1.0);
        assert_eq!(config.scale, 1.0);
        assert_eq!(config.match_policy(), MatchPolicy::BestEffort);
    }

    #[test]
    fn strict_mode_carries_threshold() {
        let config = ViewerConfig {
            accept_threshold: 0.8,
            ..ViewerConfig::default()
        };
        assert_eq!(config.match_policy(), MatchPolicy::Threshold(0.8));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("viewer.toml");
        std::fs::write(&path, "focal_page = 7\nradius = 2\n").unwrap();

        let config = ViewerConfig::load(&path).unwrap();
        assert_eq!(config.focal_page, 7);
        assert_eq!(config.radius, 2);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempdir().unwrap();
        assert!(ViewerConfig::load(&dir.path().join("absent.toml")).is_err());
    }
}
