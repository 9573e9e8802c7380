use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default cap on fixed-point iterations of a single resolution.
pub const DEFAULT_MAX_ITERATIONS: usize = 2000;

/// Global user configuration loaded from `~/.kiln/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub resolution: ResolutionConfig,
}

/// Resolution settings from `[resolution]` in global config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Maximum concurrent metadata fetches per resolution.
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    #[serde(default = "default_max_iterations", rename = "max-iterations")]
    pub max_iterations: usize,
    /// Reuse resolved graphs across resolutions of unchanged inputs.
    #[serde(default = "default_cache")]
    pub cache: bool,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            max_iterations: default_max_iterations(),
            cache: default_cache(),
        }
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_cache() -> bool {
    true
}

impl GlobalConfig {
    /// Load the global configuration from `~/.kiln/config.toml`, or return defaults if the file doesn't exist.
    pub fn load() -> miette::Result<Self> {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> miette::Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| kiln_util::errors::KilnError::Generic {
                message: format!("Failed to read global config: {e}"),
            })?;
        toml::from_str(&content).map_err(|e| {
            kiln_util::errors::KilnError::Generic {
                message: format!("Failed to parse global config: {e}"),
            }
            .into()
        })
    }

    /// Returns the default path to the global config file.
    pub fn default_path() -> PathBuf {
        dirs_path().join("config.toml")
    }
}

/// Returns the path to the Kiln data directory (`~/.kiln/`).
pub fn dirs_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".kiln")
}
