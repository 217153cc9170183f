//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MBOX2EML_CONFIG` (environment variable)
//! 2. `~/.config/mbox2eml/config.toml` (Linux/macOS)
//!    `%APPDATA%\mbox2eml\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Command-line flags override whatever the file says.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::convert::ConvertOptions;
use crate::error::Result;
use crate::export::batch::{BatchLimits, BatchOptions};
use crate::export::eml::{LineEnding, SerializeOptions, TextPolicy};
use crate::export::naming::{NamingMode, NamingOptions};
use crate::parser::mbox::{ReaderOptions, MAX_MESSAGE_SIZE, READ_BUFFER_SIZE};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// File naming.
    pub naming: NamingConfig,
    /// Import batch layout.
    pub batch: BatchConfig,
    /// Output defaults.
    pub output: OutputConfig,
    /// Performance tuning.
    pub performance: PerformanceConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// File naming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// "detailed" (`0001_subject_sender.eml`) or "simple" (`00001_subject.eml`).
    pub mode: NamingMode,
    pub subject_max_len: usize,
    pub sender_max_len: usize,
    pub simple_subject_max_len: usize,
}

/// Batch layout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Build import batches after converting.
    pub enabled: bool,
    /// Maximum messages per batch.
    pub max_messages: usize,
    /// Maximum batch size in MB.
    pub max_megabytes: u64,
    /// Pack smallest messages first.
    pub sort_by_size: bool,
}

/// Output defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output directory used when none is given on the command line.
    pub default_dir: PathBuf,
    /// "lf" or "crlf".
    pub line_ending: LineEnding,
    /// "replace" (U+FFFD for invalid UTF-8) or "preserve" (raw bytes).
    pub text_policy: TextPolicy,
    /// Undo mboxrd `>From ` quoting.
    pub unescape_from: bool,
}

/// Performance tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Read buffer size in bytes (default: 1048576 = 1 MB).
    pub read_buffer_size: usize,
    /// Maximum message size in bytes (default: 268435456 = 256 MB).
    pub max_message_size: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for NamingConfig {
    fn default() -> Self {
        let naming = NamingOptions::default();
        Self {
            mode: naming.mode,
            subject_max_len: naming.subject_max_len,
            sender_max_len: naming.sender_max_len,
            simple_subject_max_len: naming.simple_subject_max_len,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_messages: 50,
            max_megabytes: 100,
            sort_by_size: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_dir: PathBuf::from("eml_output"),
            line_ending: LineEnding::Lf,
            text_policy: TextPolicy::Replace,
            unescape_from: true,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: READ_BUFFER_SIZE,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl BatchConfig {
    /// Validated batch options.
    pub fn batch_options(&self) -> Result<BatchOptions> {
        Ok(BatchOptions {
            limits: BatchLimits::with_megabytes(self.max_messages, self.max_megabytes)?,
            sort_by_size: self.sort_by_size,
        })
    }
}

impl Config {
    /// Library options for a conversion run. Batch limits are validated here.
    pub fn convert_options(&self) -> Result<ConvertOptions> {
        let batch = if self.batch.enabled {
            Some(self.batch.batch_options()?)
        } else {
            None
        };
        Ok(ConvertOptions {
            naming: NamingOptions {
                mode: self.naming.mode,
                subject_max_len: self.naming.subject_max_len,
                sender_max_len: self.naming.sender_max_len,
                simple_subject_max_len: self.naming.simple_subject_max_len,
            },
            serialize: SerializeOptions {
                line_ending: self.output.line_ending,
                text_policy: self.output.text_policy,
            },
            reader: ReaderOptions {
                read_buffer_size: self.performance.read_buffer_size,
                max_message_size: self.performance.max_message_size,
                unescape_from: self.output.unescape_from,
            },
            batch,
        })
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MBOX2EML_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mbox2eml").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mbox2eml")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mbox2eml.log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.naming.mode, NamingMode::Detailed);
        assert_eq!(cfg.naming.subject_max_len, 100);
        assert_eq!(cfg.batch.max_messages, 50);
        assert_eq!(cfg.batch.max_megabytes, 100);
        assert!(!cfg.batch.enabled);
        assert_eq!(cfg.output.default_dir, PathBuf::from("eml_output"));
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.naming.mode, cfg.naming.mode);
        assert_eq!(parsed.output.line_ending, cfg.output.line_ending);
        assert_eq!(
            parsed.performance.read_buffer_size,
            cfg.performance.read_buffer_size
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[naming]
mode = "simple"

[output]
line_ending = "crlf"
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.naming.mode, NamingMode::Simple);
        assert_eq!(cfg.output.line_ending, LineEnding::Crlf);
        // Other fields use defaults
        assert_eq!(cfg.naming.simple_subject_max_len, 50);
        assert_eq!(cfg.output.text_policy, TextPolicy::Replace);
    }

    #[test]
    fn test_convert_options_from_config() {
        let mut cfg = Config::default();
        cfg.batch.enabled = true;
        cfg.batch.max_megabytes = 2;
        cfg.output.unescape_from = false;

        let options = cfg.convert_options().expect("valid config");
        let batch = options.batch.expect("batching enabled");
        assert_eq!(batch.limits.max_bytes(), 2 * 1024 * 1024);
        assert!(batch.sort_by_size);
        assert!(!options.reader.unescape_from);
    }

    #[test]
    fn test_invalid_batch_limits_rejected() {
        let mut cfg = Config::default();
        cfg.batch.enabled = true;
        cfg.batch.max_messages = 0;
        assert!(matches!(
            cfg.convert_options(),
            Err(ConvertError::Configuration(_))
        ));
    }
}
