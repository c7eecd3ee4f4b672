//! Hub configuration.
//!
//! Resolved in three layers:
//! - built-in defaults
//! - `<data_dir>/gogrepo-web.json`, if present
//! - environment: `GOGREPO_DATA_DIR`, `GOGREPO_PATH`, `PYTHON_BIN`

use std::path::{Path, PathBuf};
use std::time::Duration;

use gogrepo_jobs::RegistryConfig;
use gogrepo_metadata::MetadataConfig;
use gogrepo_supervisor::SupervisorConfig;
use gogrepo_tool::Tool;
use serde::{Deserialize, Serialize};

/// Name of the optional config file inside the data directory.
pub const CONFIG_FILE: &str = "gogrepo-web.json";

const DEFAULT_DATA_DIR: &str = "/data";
const DEFAULT_PYTHON: &str = "python3";

// ---------------------------------------------------------------------------
// On-disk file (gogrepo-web.json)
// ---------------------------------------------------------------------------

/// Every field is optional; absent fields keep their default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ConfigFile {
    gogrepo_path: Option<PathBuf>,
    python_bin: Option<String>,
    cache_dir: Option<PathBuf>,
    api_base: Option<String>,
    locale: Option<String>,
    cancel_grace_secs: Option<u64>,
    retention_mins: Option<u64>,
    broadcast_capacity: Option<usize>,
}

// ---------------------------------------------------------------------------
// Unified HubConfig
// ---------------------------------------------------------------------------

/// Effective hub configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubConfig {
    /// gogrepo's working directory: manifest, cookies, downloads.
    pub data_dir: PathBuf,

    /// Path to `gogrepo.py`.
    pub gogrepo_path: PathBuf,

    /// Interpreter used to run gogrepo.
    pub python_bin: String,

    /// Metadata cache directory.
    pub cache_dir: PathBuf,

    /// GOG products API base URL.
    pub api_base: String,

    /// Locale requested from the products API.
    pub locale: String,

    /// Seconds between SIGTERM and SIGKILL when a job is cancelled.
    pub cancel_grace_secs: u64,

    /// Minutes a finished job stays visible without subscribers.
    pub retention_mins: u64,

    /// Per-job event buffer for live observers.
    pub broadcast_capacity: usize,
}

fn default_gogrepo_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("gogrepo.py")))
        .unwrap_or_else(|| PathBuf::from("gogrepo.py"))
}

impl HubConfig {
    /// Defaults for a given data directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let metadata = MetadataConfig::new(data_dir.join("cache"));
        let supervisor = SupervisorConfig::default();
        let registry = RegistryConfig::default();
        Self {
            gogrepo_path: default_gogrepo_path(),
            python_bin: DEFAULT_PYTHON.into(),
            cache_dir: metadata.cache_dir,
            api_base: metadata.api_base,
            locale: metadata.locale,
            cancel_grace_secs: supervisor.grace.as_secs(),
            retention_mins: registry.retention.as_secs() / 60,
            broadcast_capacity: supervisor.broadcast_capacity,
            data_dir,
        }
    }

    /// Loads configuration from the file and the process environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Loads configuration with an explicit environment lookup.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let data_dir = var("GOGREPO_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into());
        let mut config = HubConfig::with_data_dir(data_dir);

        let path = config.file_path();
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<ConfigFile>(&content) {
                Ok(file) => config.apply(file),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                ),
            }
        }

        if let Some(path) = var("GOGREPO_PATH") {
            config.gogrepo_path = path.into();
        }
        if let Some(python) = var("PYTHON_BIN") {
            config.python_bin = python;
        }

        Ok(config)
    }

    fn apply(&mut self, file: ConfigFile) {
        if let Some(path) = file.gogrepo_path {
            self.gogrepo_path = path;
        }
        if let Some(python) = file.python_bin {
            self.python_bin = python;
        }
        if let Some(dir) = file.cache_dir {
            self.cache_dir = self.resolve(dir);
        }
        if let Some(base) = file.api_base {
            self.api_base = base;
        }
        if let Some(locale) = file.locale {
            self.locale = locale;
        }
        if let Some(secs) = file.cancel_grace_secs {
            self.cancel_grace_secs = secs;
        }
        if let Some(mins) = file.retention_mins {
            self.retention_mins = mins;
        }
        if let Some(capacity) = file.broadcast_capacity.filter(|c| *c > 0) {
            self.broadcast_capacity = capacity;
        }
    }

    /// Relative paths in the file are relative to the data directory.
    fn resolve(&self, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            path
        } else {
            self.data_dir.join(path)
        }
    }

    pub fn file_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir.join(gogrepo_manifest::MANIFEST_FILE)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn tool(&self) -> Tool {
        Tool::new(&self.python_bin, &self.gogrepo_path, &self.data_dir)
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            retention: Duration::from_secs(self.retention_mins.saturating_mul(60)),
            supervisor: SupervisorConfig {
                grace: Duration::from_secs(self.cancel_grace_secs),
                broadcast_capacity: self.broadcast_capacity,
                ..SupervisorConfig::default()
            },
        }
    }

    pub fn metadata_config(&self) -> MetadataConfig {
        let mut metadata = MetadataConfig::new(&self.cache_dir);
        metadata.api_base = self.api_base.clone();
        metadata.locale = self.locale.clone();
        metadata
    }
}
