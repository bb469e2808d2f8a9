use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Output settings of the PDF printing device.
/// Stored as `config.json` in the platform config directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    /// Version written in the PDF header.
    pub pdf_version: String,
    /// Flate-compress content streams. Off by default so the output stays
    /// readable; image and font streams are always compressed.
    pub compress_streams: bool,
    /// Producer entry used when the document options don't provide one.
    pub producer: String,
    /// Embed JPEG data as-is instead of rejecting it.
    pub jpeg_passthrough: bool,
    /// Periods laid out on each side of a wrapped gradient. Read through
    /// [`PrinterConfig::wrap_periods`].
    pub gradient_wrap_periods: u32,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            pdf_version: "1.5".to_string(),
            compress_streams: false,
            producer: concat!("pdfprinter ", env!("CARGO_PKG_VERSION")).to_string(),
            jpeg_passthrough: true,
            gradient_wrap_periods: 32,
        }
    }
}

/// Bounds of `gradient_wrap_periods`.
const WRAP_PERIODS: std::ops::RangeInclusive<u32> = 1..=256;

impl PrinterConfig {
    /// `gradient_wrap_periods`, clamped so a stitching function stays small.
    pub fn wrap_periods(&self) -> u32 {
        self.gradient_wrap_periods
            .clamp(*WRAP_PERIODS.start(), *WRAP_PERIODS.end())
    }

    /// Load from the platform config directory, falling back to defaults.
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            log::info!("No config directory available, using defaults");
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("{:#}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }
}

fn config_path() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("com", "LiveCode", "pdfprinter")?;
    Some(dirs.config_dir().join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: PrinterConfig = serde_json::from_str(r#"{ "compress_streams": true }"#).unwrap();
        assert!(config.compress_streams);
        assert_eq!(config.pdf_version, "1.5");
        assert!(config.jpeg_passthrough);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = PrinterConfig {
            producer: "Test Producer".to_string(),
            gradient_wrap_periods: 4,
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(PrinterConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn wrap_periods_are_clamped() {
        let periods = |gradient_wrap_periods| {
            PrinterConfig {
                gradient_wrap_periods,
                ..Default::default()
            }
            .wrap_periods()
        };
        assert_eq!(periods(0), 1);
        assert_eq!(periods(32), 32);
        assert_eq!(periods(u32::MAX), 256);
    }

    #[test]
    fn invalid_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        let err = PrinterConfig::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse"));
    }
}
