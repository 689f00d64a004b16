//! # File Configuration
//!
//! Optional TOML configuration (`wavegraph.toml` by default). Every field
//! is optional; CLI flags win over file values, file values win over
//! built-in defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use wavegraph_core::WavegraphError;

/// Built-in defaults, applied after CLI flags and file values.
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATABASE: &str = "wavegraph.redb";
pub const DEFAULT_CONFIG_FILE: &str = "wavegraph.toml";

/// Values read from the configuration file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<PathBuf>,
}

impl FileConfig {
    /// Load the configuration at `path`.
    ///
    /// With `explicit` unset, a missing file is not an error — the default
    /// location is probed on every run.
    pub fn load(path: &Path, explicit: bool) -> Result<Self, WavegraphError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(WavegraphError::Io(format!(
                    "cannot read config '{}': {e}",
                    path.display()
                )));
            }
        };

        toml::from_str(&raw).map_err(|e| {
            WavegraphError::Serialization(format!(
                "malformed config '{}': {e}",
                path.display()
            ))
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
