use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BitsplitError, BitsplitResult};

/// random.org query for four 16-bit integers, one per line.
pub const DEFAULT_REMOTE_URL: &str = concat!(
    "https://www.random.org/integers/",
    "?num=4&min=0&max=65535&col=1&base=10&format=plain&rnd=new"
);

/// Key sizes the AES-GCM cipher accepts.
pub const SUPPORTED_KEY_SIZES: [usize; 3] = [16, 24, 32];

/// Top-level configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BitsplitConfig {
    pub logging: LoggingConfig,
    pub lock: LockConfig,
    pub keystore: KeystoreConfig,
    pub entropy: EntropyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Size of the generated directory key in bytes (16, 24 or 32)
    pub key_size: usize,
    /// Name prefix of the staging snapshot created in the system temp dir
    pub snapshot_prefix: String,
    /// Mark the key file and lock marker hidden where the platform supports it
    pub hide_files: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystoreConfig {
    /// Extra key store directories, probed before removable volumes
    pub locations: Vec<PathBuf>,
    /// Append detected removable volumes to the candidate list
    pub probe_removable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntropyConfig {
    /// Mix numbers fetched from a public randomness service into the RNG seed
    pub remote_booster: bool,
    pub remote_url: String,
    pub timeout_secs: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            key_size: 32,
            snapshot_prefix: "bitsplit-snapshot-".into(),
            hide_files: true,
        }
    }
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            locations: Vec::new(),
            probe_removable: true,
        }
    }
}

impl Default for EntropyConfig {
    fn default() -> Self {
        Self {
            remote_booster: false,
            remote_url: DEFAULT_REMOTE_URL.into(),
            timeout_secs: 5,
        }
    }
}

impl BitsplitConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml(content: &str) -> BitsplitResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| BitsplitError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> BitsplitResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| BitsplitError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BitsplitResult<()> {
        if !SUPPORTED_KEY_SIZES.contains(&self.lock.key_size) {
            return Err(BitsplitError::Config(format!(
                "lock.key_size must be one of {:?}, got {}",
                SUPPORTED_KEY_SIZES, self.lock.key_size
            )));
        }
        if self.lock.snapshot_prefix.contains(std::path::is_separator) {
            return Err(BitsplitError::Config(
                "lock.snapshot_prefix must not contain a path separator".into(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(BitsplitError::Config(format!(
                "logging.format must be \"text\" or \"json\", got {:?}",
                self.logging.format
            )));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> BitsplitResult<String> {
        toml::to_string(self).map_err(|e| BitsplitError::Config(e.to_string()))
    }
}
