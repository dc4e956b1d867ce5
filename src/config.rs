use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub table_file: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub font_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_image_extensions")]
    pub image_extensions: HashSet<String>,
    #[serde(default)]
    pub pairing: Pairing,
    #[serde(default)]
    pub timestamps: TimestampSource,
    pub columns: ColumnConfig,
    pub clock: ClockConfig,
    #[serde(default)]
    pub watermark: WatermarkConfig,
    pub sheet: Option<SheetConfig>,
}

/// How table rows find their source image.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Pairing {
    /// i-th sorted image goes with the i-th surviving row.
    #[default]
    Positional,
    /// `<input_dir>/<identifier>.<ext>` per row.
    Identifier,
}

/// Which timestamp is authoritative for a row.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimestampSource {
    #[default]
    Synthesized,
    /// Table value when it parses, synthesized otherwise.
    Table,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ColumnConfig {
    pub file_name: String,
    pub coordinates: String,
    pub captured_at: Option<String>,
    pub identifier: Option<String>,
    pub watermark: ColumnRange,
    pub folders: Option<ColumnRange>,
}

/// Zero-based, end-exclusive range of header positions.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRange {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClockConfig {
    pub start: String,
    #[serde(default = "default_day_start_hour")]
    pub day_start_hour: u32,
    #[serde(default = "default_day_end_hour")]
    pub day_end_hour: u32,
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WatermarkConfig {
    pub margin: u32,
    pub line_padding: u32,
    pub bottom_clearance: u32,
    pub shadow_offset: i32,
    pub font_ratio: f32,
    pub min_font_px: u32,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            margin: 20,
            line_padding: 10,
            bottom_clearance: 64,
            shadow_offset: 2,
            font_ratio: 0.03,
            min_font_px: 16,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SheetConfig {
    pub workbook: PathBuf,
    pub name: String,
    pub output: PathBuf,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_jpeg_quality() -> u8 {
    90
}

fn default_image_extensions() -> HashSet<String> {
    ["jpg", "jpeg"].iter().map(|s| s.to_string()).collect()
}

fn default_day_start_hour() -> u32 {
    8
}

fn default_day_end_hour() -> u32 {
    16
}

impl AppConfig {
    /// Layers `config/default` (or `explicit`), `config/{RUN_MODE}`, `config/local`
    /// and `GEOSTAMP__*` environment variables.
    pub fn new(explicit: Option<&str>) -> Result<Self, ConfigError> {
        let env = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let base = match explicit {
            Some(path) => File::with_name(path),
            None => File::with_name("config/default"),
        };

        let s = Config::builder()
            .add_source(base)
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("GEOSTAMP").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;
        config.image_extensions = config
            .image_extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();
        Ok(config)
    }
}
