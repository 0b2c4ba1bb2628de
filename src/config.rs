//! Configuration module.
//!
//! Handles loading, validating, and merging `webpify.toml`. Stock defaults are
//! serialized to a TOML value, the user file is merged on top key-by-key, and
//! the merged value is deserialized and validated.
//!
//! ## Config File Location
//!
//! `--config <path>` names the file explicitly; otherwise `./webpify.toml` is
//! used when present. Without either, the stock defaults apply.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [conversion]
//! quality = 80              # Lossy quality (1-100)
//! scale = 100               # Resize percentage (1-200)
//! lossless = false
//! max_dimension = 8000      # Cap on either output edge (1-16383)
//! codec = "libwebp"         # "libwebp" or "image-rs" (lossless only)
//!
//! [server]
//! host = "127.0.0.1"
//! port = 3001               # PORT in the environment overrides this
//! max_upload_bytes = 10485760
//! allowed_types = ["image/jpeg", "image/png", "image/webp", "image/avif"]
//!
//! [session]
//! debounce_ms = 400         # Quiet period before an interactive conversion starts
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override just the values you want:
//!
//! ```toml
//! [conversion]
//! quality = 65
//! ```
//!
//! Unknown keys are rejected to catch typos early. Command-line flags override
//! whatever the file says.

use crate::imaging::{
    CodecKind, ConvertOptions, DEFAULT_MAX_DIMENSION, Quality, ScalePercent, WEBP_MAX_DIMENSION,
};
use crate::types::SourceFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// File name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "webpify.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `webpify.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebpifyConfig {
    /// Defaults for every conversion, whichever surface starts it.
    pub conversion: ConversionConfig,
    /// HTTP service settings.
    pub server: ServerConfig,
    /// Interactive session settings.
    pub session: SessionConfig,
}

impl WebpifyConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.conversion;
        if !(Quality::MIN..=Quality::MAX).contains(&c.quality) {
            return Err(ConfigError::Validation(format!(
                "conversion.quality must be {}-{}",
                Quality::MIN,
                Quality::MAX
            )));
        }
        if !(ScalePercent::MIN..=ScalePercent::MAX).contains(&c.scale) {
            return Err(ConfigError::Validation(format!(
                "conversion.scale must be {}-{}",
                ScalePercent::MIN,
                ScalePercent::MAX
            )));
        }
        if !(1..=WEBP_MAX_DIMENSION).contains(&c.max_dimension) {
            return Err(ConfigError::Validation(format!(
                "conversion.max_dimension must be 1-{WEBP_MAX_DIMENSION}"
            )));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::Validation(
                "server.max_upload_bytes must be non-zero".into(),
            ));
        }
        if self.server.allowed_types.is_empty() {
            return Err(ConfigError::Validation(
                "server.allowed_types must not be empty".into(),
            ));
        }
        if let Some(unknown) = self
            .server
            .allowed_types
            .iter()
            .find(|t| SourceFormat::from_mime(t).is_none())
        {
            return Err(ConfigError::Validation(format!(
                "server.allowed_types: '{unknown}' is not a supported image type"
            )));
        }
        Ok(())
    }
}

/// Conversion defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConversionConfig {
    /// Lossy encoding quality (1-100).
    pub quality: u32,
    /// Resize factor in percent (1-200).
    pub scale: u32,
    /// Encode losslessly; quality is then ignored.
    pub lossless: bool,
    /// Cap on either output dimension.
    pub max_dimension: u32,
    /// Which codec backend to use.
    pub codec: CodecKind,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            quality: Quality::default().value(),
            scale: ScalePercent::default().value(),
            lossless: false,
            max_dimension: DEFAULT_MAX_DIMENSION,
            codec: CodecKind::default(),
        }
    }
}

impl ConversionConfig {
    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            quality: Quality::new(self.quality),
            scale: ScalePercent::new(self.scale),
            lossless: self.lossless,
            max_dimension: self.max_dimension,
        }
    }
}

/// HTTP service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted upload, in bytes.
    pub max_upload_bytes: u64,
    /// MIME types accepted for the `image` field.
    pub allowed_types: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            max_upload_bytes: 10 * 1024 * 1024,
            allowed_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
                "image/avif".to_string(),
            ],
        }
    }
}

impl ServerConfig {
    /// Whether `mime` is one of the allowed types (case-insensitive, parameters ignored).
    pub fn allows(&self, mime: &str) -> bool {
        let essence = mime.split(';').next().unwrap_or("").trim();
        self.allowed_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(essence))
    }
}

/// Interactive session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Quiet period after a submit before conversion starts.
    pub debounce_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { debounce_ms: 400 }
    }
}

impl SessionConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(WebpifyConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge an optional overlay onto the stock defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<WebpifyConfig, ConfigError> {
    let base = stock_defaults_value();
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: WebpifyConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration.
///
/// An explicit path must exist. Without one, `webpify.toml` in `cwd` is used
/// if present, otherwise the stock defaults.
pub fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<WebpifyConfig, ConfigError> {
    let overlay = match explicit {
        Some(path) => Some(load_raw_config(path)?),
        None => {
            let default_path = cwd.join(CONFIG_FILE_NAME);
            if default_path.exists() {
                Some(load_raw_config(&default_path)?)
            } else {
                None
            }
        }
    };
    resolve_config(overlay)
}

/// Returns a fully-commented stock `webpify.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# webpify configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Looked up at --config <path>, or ./webpify.toml.
# Command-line flags override these values.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Conversion defaults (CLI, HTTP service and interactive sessions)
# ---------------------------------------------------------------------------
[conversion]
# Lossy WebP quality (1 = smallest, 100 = best). Ignored when lossless.
quality = 80

# Resize factor in percent of the source dimensions (1-200).
scale = 100

# Encode losslessly instead of lossy.
lossless = false

# Neither output edge may exceed this; larger results are shrunk to fit,
# keeping the aspect ratio. WebP itself cannot go past 16383.
max_dimension = 8000

# Codec backend:
#   "libwebp"  - libwebp encoder, lossy or lossless
#   "image-rs" - pure Rust encoder, lossless only
codec = "libwebp"

# ---------------------------------------------------------------------------
# HTTP service (webpify serve)
# ---------------------------------------------------------------------------
[server]
host = "127.0.0.1"

# The PORT environment variable overrides this.
port = 3001

# Largest accepted upload in bytes (10 MiB).
max_upload_bytes = 10485760

# MIME types accepted for the "image" form field.
allowed_types = ["image/jpeg", "image/png", "image/webp", "image/avif"]

# ---------------------------------------------------------------------------
# Interactive session
# ---------------------------------------------------------------------------
[session]
# Milliseconds to wait after a request before converting. A newer request
# arriving within this window replaces the pending one.
debounce_ms = 400
"##
}
