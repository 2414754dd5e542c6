//! Configuration loading for Synaptic integrations.
//!
//! Any `serde` type can be read from TOML, JSON or YAML. `${VAR}` references
//! are expanded from the environment before parsing, so secrets such as
//! connection strings stay out of config files.
//!
//! ```rust,no_run
//! use serde::Deserialize;
//! use synaptic_config::discover_section;
//!
//! #[derive(Deserialize)]
//! struct Settings {
//!     connection_string: String,
//! }
//!
//! # fn example() -> Result<(), synaptic_core::SynapticError> {
//! // Reads the `[mongodb]` table of ./synaptic.toml (or ~/.synaptic/config.toml).
//! let settings: Settings = discover_section(None, "mongodb")?;
//! # Ok(())
//! # }
//! ```

mod env;
mod format;
mod source;

pub use env::{expand_env, expand_env_with};
pub use format::{parse_config, ConfigFormat};
pub use source::{
    discover_and_load, discover_section, find_config_file, load_from_file, load_from_source,
    load_section, ConfigSource, FileConfigSource, StringConfigSource,
};
