//! # Bridge configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no file
//! at all) yields a working configuration.
//!
//! ```toml
//! sharelib = "/usr/share/modbridge"
//! namespace = "ansible"
//! fuel = 5_000_000_000
//!
//! [env]
//! LANG = "C"
//!
//! [[mounts]]
//! host = "/var/tmp/modbridge"
//! guest = "/tmp"
//! writable = true
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

pub const DEFAULT_SHARELIB: &str = "/usr/share/modbridge";
pub const MODULES_DIR: &str = "modules";
pub const DEFAULT_NAMESPACE: &str = "ansible";
pub const DEFAULT_ARGS_KEY: &str = "ANSIBLE_MODULE_ARGS";
pub const DEFAULT_CAPTURE_LIMIT: usize = 16 * 1024 * 1024;
pub const DEFAULT_STDERR_LIMIT: usize = 64 * 1024;

#[derive(Debug)]
pub enum Error {
    Io(PathBuf, std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(path, e) => write!(f, "Cannot read config {}: {}", path.display(), e),
            Self::Parse(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Parse(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Host directory preopened inside the guest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mount {
    pub host: PathBuf,
    pub guest: String,
    #[serde(default)]
    pub writable: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Root of the shared module library.
    pub sharelib: PathBuf,
    /// Key the decoded module output is stored under in the envelope data.
    pub namespace: String,
    /// Key the arguments are wrapped under on the module's stdin.
    pub args_key: String,
    /// Stdout bytes kept per invocation. Output that reaches this size is
    /// reported as an overflow rather than decoded.
    pub capture_limit: usize,
    /// Stderr bytes kept per invocation. Anything past it is dropped.
    pub stderr_limit: usize,
    /// Instruction budget per invocation. Unbounded when absent.
    pub fuel: Option<u64>,
    pub env: BTreeMap<String, String>,
    pub mounts: Vec<Mount>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            sharelib: PathBuf::from(DEFAULT_SHARELIB),
            namespace: DEFAULT_NAMESPACE.to_string(),
            args_key: DEFAULT_ARGS_KEY.to_string(),
            capture_limit: DEFAULT_CAPTURE_LIMIT,
            stderr_limit: DEFAULT_STDERR_LIMIT,
            fuel: None,
            env: BTreeMap::new(),
            mounts: Vec::new(),
        }
    }
}

impl BridgeConfig {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Io(path.to_path_buf(), e))?;
        Self::parse(&text)
    }

    /// Directory builtin module identifiers resolve against.
    pub fn modules_dir(&self) -> PathBuf {
        self.sharelib.join(MODULES_DIR)
    }

    pub fn with_sharelib(mut self, sharelib: impl Into<PathBuf>) -> Self {
        self.sharelib = sharelib.into();
        self
    }

    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel = Some(fuel);
        self
    }
}
