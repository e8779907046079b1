//! Bridge configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use jsonc_parser::ParseOptions;
use jsonschema::Validator;
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

const SCHEMA_JSON: &str = include_str!("../../../schemas/v1/config.json");
static CONFIG_SCHEMA: OnceLock<Result<Validator, String>> = OnceLock::new();

/// How programs are isolated from the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    /// A dedicated thread per execution context.
    #[default]
    Thread,
    /// A child process per execution context.
    Process,
}

impl std::str::FromStr for Isolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thread" => Ok(Self::Thread),
            "process" => Ok(Self::Process),
            other => Err(format!("unknown isolation `{other}`, expected `thread` or `process`")),
        }
    }
}

/// Configuration for the backend facade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Engine WASM module, relative to the configuration file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<PathBuf>,

    /// Execution backend passed to the engine.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Isolation flavour for execution contexts.
    #[serde(default)]
    pub isolation: Isolation,

    /// Idle execution contexts kept for reuse.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Host-side run timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_timeout_ms: Option<u64>,

    /// Engine memory limit in 64 KiB pages.
    #[serde(default = "default_memory_max_pages")]
    pub memory_max_pages: u32,

    /// Engine-side call timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_timeout_ms: Option<u64>,

    /// Directory containing the configuration file.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

fn default_backend() -> String {
    "vm".to_string()
}

fn default_pool_size() -> usize {
    1
}

fn default_memory_max_pages() -> u32 {
    2048
}

impl BridgeConfig {
    /// Configuration file names, in lookup order.
    pub const CONFIG_FILES: [&'static str; 2] = [".spielplatz.jsonc", ".spielplatz.json"];

    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            engine: None,
            backend: default_backend(),
            isolation: Isolation::default(),
            pool_size: default_pool_size(),
            run_timeout_ms: None,
            memory_max_pages: default_memory_max_pages(),
            engine_timeout_ms: None,
            base_dir: None,
        }
    }

    /// Loads configuration from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            BridgeError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_jsonc(&content)?;
        if let Some(parent) = path.parent() {
            config.base_dir = Some(parent.to_path_buf());
        }
        Ok(config)
    }

    /// Parses configuration from JSON with comments, validating it
    /// against the embedded schema.
    pub fn from_jsonc(content: &str) -> Result<Self, BridgeError> {
        let value = jsonc_parser::parse_to_serde_value(content, &ParseOptions::default())
            .map_err(|e| BridgeError::config(format!("Invalid JSON: {}", e)))?
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));

        let schema = CONFIG_SCHEMA
            .get_or_init(|| {
                let schema_json: serde_json::Value = serde_json::from_str(SCHEMA_JSON)
                    .map_err(|e| format!("Invalid embedded config schema: {}", e))?;
                Validator::new(&schema_json).map_err(|e| format!("Invalid config schema: {}", e))
            })
            .as_ref()
            .map_err(|e| BridgeError::config(e.clone()))?;

        if let Err(e) = schema.validate(&value) {
            return Err(BridgeError::config(format!(
                "Config validation failed: {} at {}",
                e,
                e.instance_path()
            )));
        }

        serde_json::from_value(value).map_err(|e| BridgeError::config(format!("Invalid config: {}", e)))
    }

    /// Finds the configuration file in `dir`.
    pub fn discover(dir: impl AsRef<Path>) -> Option<PathBuf> {
        let dir = dir.as_ref();
        Self::CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Engine path resolved against the configuration file's directory.
    pub fn engine_path(&self) -> Option<PathBuf> {
        let engine = self.engine.as_ref()?;
        match &self.base_dir {
            Some(base) if engine.is_relative() => Some(base.join(engine)),
            _ => Some(engine.clone()),
        }
    }

    /// Host-side run timeout, if configured.
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }

    /// Engine-side call timeout, if configured.
    pub fn engine_timeout(&self) -> Option<Duration> {
        self.engine_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new()
    }
}
