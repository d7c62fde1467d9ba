//! Configuration management for CodeCLI
//!
//! Configuration is layered: built-in defaults, then the global file
//! `~/.codecli/config.json`, then the project file `./.codecli.json`, then
//! environment variables. Files are deep-merged as JSON trees so a project
//! file can override a single nested key without repeating its siblings.

mod types;

pub use types::*;

use crate::error::{CodeCliError, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// File name of the per-project configuration overlay.
pub const PROJECT_CONFIG_FILE: &str = ".codecli.json";

/// Which file a `config set` writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    /// `~/.codecli/config.json`
    Global,
    /// `./.codecli.json`
    Project,
}

impl Config {
    /// Returns the CodeCLI configuration directory path (~/.codecli)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".codecli")
    }

    /// Returns the path to the global config file (~/.codecli/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Returns the path to the project config file inside `cwd`
    pub fn project_path(cwd: &Path) -> PathBuf {
        cwd.join(PROJECT_CONFIG_FILE)
    }

    /// Returns the directory where session files are stored (~/.codecli/sessions)
    pub fn sessions_dir() -> PathBuf {
        Self::dir().join("sessions")
    }

    /// Load configuration from the default locations with environment overrides.
    ///
    /// Missing files are skipped. Environment variables win over both files.
    pub fn load(cwd: &Path) -> Result<Self> {
        Self::load_from_paths(&Self::path(), Some(&Self::project_path(cwd)))
    }

    /// Load configuration from explicit global and project paths.
    pub fn load_from_paths(global: &Path, project: Option<&Path>) -> Result<Self> {
        let mut merged = serde_json::to_value(Config::default())?;

        for path in std::iter::once(global).chain(project) {
            if let Some(layer) = read_layer(path)? {
                deep_merge(&mut merged, layer);
            }
        }

        let mut config: Config = serde_json::from_value(merged).map_err(|e| {
            CodeCliError::Config(format!("Invalid configuration: {}", e))
        })?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// CodeCLI-specific variables follow the pattern `CODECLI_SECTION_KEY`;
    /// the vendor variables (`AZURE_OPENAI_*`, `OLLAMA_*`, `GEMINI_*`) are
    /// honoured as well so existing shell setups keep working.
    fn apply_env_overrides(&mut self) {
        if let Some(val) = env_var("CODECLI_DEFAULT_PROVIDER").or_else(|| env_var("DEFAULT_PROVIDER"))
        {
            self.default_provider = val;
        }
        if let Some(val) = env_var("CODECLI_TEMPERATURE") {
            if let Ok(v) = val.parse() {
                self.temperature = v;
            }
        }
        if let Some(val) = env_var("CODECLI_AGENT_MAX_ITERATIONS") {
            if let Ok(v) = val.parse() {
                self.agent.max_iterations = v;
            }
        }

        self.apply_provider_env_overrides();
    }

    /// Apply provider-specific environment variable overrides
    fn apply_provider_env_overrides(&mut self) {
        let azure = &mut self.providers.azure_openai;
        if let Some(val) = env_var("AZURE_OPENAI_API_KEY") {
            azure.api_key = val;
        }
        if let Some(val) = env_var("AZURE_OPENAI_ENDPOINT") {
            azure.endpoint = val;
        }
        if let Some(val) = env_var("AZURE_OPENAI_DEPLOYMENT") {
            azure.deployment = val;
        }
        if let Some(val) = env_var("AZURE_OPENAI_API_VERSION") {
            azure.api_version = val;
        }

        let ollama = &mut self.providers.ollama;
        if let Some(val) = env_var("OLLAMA_HOST") {
            ollama.host = val;
        }
        if let Some(val) = env_var("OLLAMA_MODEL") {
            ollama.model = val;
        }

        let gemini = &mut self.providers.gemini;
        if let Some(val) = env_var("GEMINI_API_KEY") {
            gemini.api_key = val;
        }
        if let Some(val) = env_var("GEMINI_MODEL") {
            gemini.model = val;
        }
    }

    /// Look up a dotted key (e.g. `permissions.autoApproveWrite`) in the
    /// effective configuration.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        let root = serde_json::to_value(self).ok()?;
        lookup(&root, key).cloned()
    }

    /// Write a dotted key into the global or project config file.
    ///
    /// Only the target file is rewritten; other layers are left untouched.
    pub fn set_value(scope: ConfigScope, cwd: &Path, key: &str, value: Value) -> Result<()> {
        let path = match scope {
            ConfigScope::Global => Self::path(),
            ConfigScope::Project => Self::project_path(cwd),
        };
        set_value_in_file(&path, key, value)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Read one JSON layer. Unparseable files are reported, missing files skipped.
fn read_layer(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let value = serde_json::from_str(&content).map_err(|e| {
        CodeCliError::Config(format!("Failed to parse {}: {}", path.display(), e))
    })?;
    Ok(Some(value))
}

/// Recursively merge `overlay` into `base`. Objects merge key by key; any
/// other value (including arrays) replaces the base value.
pub(crate) fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                let nested = matches!(
                    (base_map.get(&key), &value),
                    (Some(Value::Object(_)), Value::Object(_))
                );
                if nested {
                    if let Some(existing) = base_map.get_mut(&key) {
                        deep_merge(existing, value);
                    }
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn lookup<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.')
        .try_fold(root, |node, part| node.as_object()?.get(part))
}

fn set_value_in_file(path: &Path, key: &str, value: Value) -> Result<()> {
    let mut root = read_layer(path)?.unwrap_or_else(|| Value::Object(Map::new()));
    let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
    let (last, parents) = parts
        .split_last()
        .ok_or_else(|| CodeCliError::Config("Empty configuration key".into()))?;

    let mut node = &mut root;
    for part in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let map = node
            .as_object_mut()
            .ok_or_else(|| CodeCliError::Config(format!("Cannot set key '{}'", key)))?;
        node = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Some(map) = node.as_object_mut() {
        map.insert(last.to_string(), value);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&root)?)?;
    Ok(())
}
