use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;
use synaptic_core::SynapticError;

use crate::format::{parse_config, ConfigFormat};

/// Configuration source abstraction.
pub trait ConfigSource: Send + Sync {
    /// Fetch the current configuration content and its format.
    fn fetch(&self) -> Result<(String, ConfigFormat), SynapticError>;
}

/// Load configuration from a local file, auto-detecting format by extension.
pub struct FileConfigSource {
    path: PathBuf,
    format: Option<ConfigFormat>,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: None,
        }
    }

    /// Override the auto-detected format.
    pub fn with_format(mut self, format: ConfigFormat) -> Self {
        self.format = Some(format);
        self
    }
}

impl ConfigSource for FileConfigSource {
    fn fetch(&self) -> Result<(String, ConfigFormat), SynapticError> {
        let format = self
            .format
            .or_else(|| ConfigFormat::from_path(&self.path))
            .ok_or_else(|| {
                SynapticError::Config(format!(
                    "cannot detect config format from extension: {}",
                    self.path.display()
                ))
            })?;

        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            SynapticError::Config(format!("failed to read {}: {e}", self.path.display()))
        })?;

        Ok((content, format))
    }
}

/// Load configuration from an in-memory string.
pub struct StringConfigSource {
    content: String,
    format: ConfigFormat,
}

impl StringConfigSource {
    pub fn new(content: impl Into<String>, format: ConfigFormat) -> Self {
        Self {
            content: content.into(),
            format,
        }
    }
}

impl ConfigSource for StringConfigSource {
    fn fetch(&self) -> Result<(String, ConfigFormat), SynapticError> {
        Ok((self.content.clone(), self.format))
    }
}

/// Load and parse configuration from any [`ConfigSource`].
pub fn load_from_source<T: DeserializeOwned>(
    source: &dyn ConfigSource,
) -> Result<T, SynapticError> {
    let (content, format) = source.fetch()?;
    parse_config(&content, format)
}

/// Load and parse configuration from a file path.
pub fn load_from_file<T: DeserializeOwned>(path: &Path) -> Result<T, SynapticError> {
    load_from_source(&FileConfigSource::new(path))
}

/// Load one top-level table (e.g. `[mongodb]`) of a source as `T`.
pub fn load_section<T: DeserializeOwned>(
    source: &dyn ConfigSource,
    section: &str,
) -> Result<T, SynapticError> {
    let mut root: Value = load_from_source(source)?;
    let value = root
        .get_mut(section)
        .map(Value::take)
        .ok_or_else(|| SynapticError::Config(format!("missing config section '{section}'")))?;
    serde_json::from_value(value)
        .map_err(|e| SynapticError::Config(format!("invalid config section '{section}': {e}")))
}

const EXTENSIONS: &[&str] = &["toml", "json", "yaml", "yml"];

/// Search the default locations for a config file.
///
/// Search order:
/// 1. `./synaptic.{toml,json,yaml,yml}` in the current directory
/// 2. `~/.synaptic/config.{toml,json,yaml,yml}` in the home directory
pub fn find_config_file() -> Option<PathBuf> {
    for ext in EXTENSIONS {
        let candidate = PathBuf::from(format!("./synaptic.{ext}"));
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let home = dirs::home_dir()?;
    EXTENSIONS
        .iter()
        .map(|ext| home.join(".synaptic").join(format!("config.{ext}")))
        .find(|candidate| candidate.exists())
}

/// Find the config file to use: the explicit `path` (which must exist), or
/// the first of [`find_config_file`]'s locations.
fn discover(path: Option<&Path>) -> Result<PathBuf, SynapticError> {
    if let Some(p) = path {
        if p.exists() {
            return Ok(p.to_path_buf());
        }
        return Err(SynapticError::Config(format!(
            "config file not found: {}",
            p.display()
        )));
    }

    find_config_file().ok_or_else(|| {
        SynapticError::Config(
            "no config file found: tried ./synaptic.{toml,json,yaml} and ~/.synaptic/config.{toml,json,yaml}".to_string(),
        )
    })
}

/// Discover a configuration file and load it as `T`.
pub fn discover_and_load<T: DeserializeOwned>(path: Option<&Path>) -> Result<T, SynapticError> {
    load_from_file(&discover(path)?)
}

/// Discover a configuration file and load one of its top-level tables as `T`.
pub fn discover_section<T: DeserializeOwned>(
    path: Option<&Path>,
    section: &str,
) -> Result<T, SynapticError> {
    load_section(&FileConfigSource::new(discover(path)?), section)
}
