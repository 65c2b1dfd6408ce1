use std::io::ErrorKind;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::data::loader::LoadOptions;
use crate::state::Page;

/// File looked up in the working directory at startup.
pub const CONFIG_FILE: &str = "datavisualizer.json";

/// Startup settings. Every key is optional; missing keys keep their default.
///
/// ```json
/// { "title": "Sales explorer", "csv_delimiter": ";", "start_page": "log" }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub title: String,
    pub contributors: Vec<String>,
    pub window_size: [f32; 2],
    pub min_window_size: [f32; 2],
    pub csv_delimiter: char,
    pub start_page: Page,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "DataVisualizer".to_string(),
            contributors: vec![
                "Kushal Vadodaria - 60003210188".to_string(),
                "Isha Mistry - 60003210197".to_string(),
                "Kely Mistry - 60003210197".to_string(),
            ],
            window_size: [1200.0, 800.0],
            min_window_size: [600.0, 400.0],
            csv_delimiter: ',',
            start_page: Page::Home,
        }
    }
}

impl AppConfig {
    /// Read [`CONFIG_FILE`] from the working directory, falling back to
    /// defaults when it is absent or unusable.
    pub fn load() -> Self {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("No {} found, using default settings", path.display());
                return Self::default();
            }
            Err(e) => {
                log::warn!("Cannot read {}: {e}; using default settings", path.display());
                return Self::default();
            }
        };
        match Self::from_json(&text) {
            Ok(config) => {
                log::info!("Loaded settings from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Ignoring {}: {e:#}", path.display());
                Self::default()
            }
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(text).context("parsing settings")?;
        if !config.csv_delimiter.is_ascii() {
            bail!(
                "csv_delimiter must be a single ASCII character, got '{}'",
                config.csv_delimiter
            );
        }
        Ok(config)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            // Non-ASCII delimiters are rejected in `from_json`.
            csv_delimiter: u8::try_from(self.csv_delimiter).unwrap_or(b','),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_settings_keep_defaults() {
        let config = AppConfig::from_json(r#"{ "title": "Sales", "start_page": "log" }"#).unwrap();
        assert_eq!(config.title, "Sales");
        assert_eq!(config.start_page, Page::Log);
        assert_eq!(config.window_size, AppConfig::default().window_size);
        assert_eq!(config.load_options().csv_delimiter, b',');
    }

    #[test]
    fn default_contributors_carry_roll_numbers() {
        assert_eq!(
            AppConfig::default().contributors,
            vec![
                "Kushal Vadodaria - 60003210188",
                "Isha Mistry - 60003210197",
                "Kely Mistry - 60003210197",
            ]
        );
    }

    #[test]
    fn delimiter_feeds_load_options() {
        let config = AppConfig::from_json(r#"{ "csv_delimiter": ";" }"#).unwrap();
        assert_eq!(config.load_options().csv_delimiter, b';');
    }

    #[test]
    fn rejects_non_ascii_delimiter() {
        assert!(AppConfig::from_json(r#"{ "csv_delimiter": "§" }"#).is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = AppConfig::load_from(Path::new("does/not/exist.json"));
        assert_eq!(config, AppConfig::default());
    }
}
