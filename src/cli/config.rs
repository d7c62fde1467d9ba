//! Config command handler.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use codecli::config::{Config, ConfigScope};

use super::ConfigAction;

/// List, read or write configuration values.
pub(crate) fn cmd_config(action: ConfigAction, config: &Config, cwd: &Path) -> Result<()> {
    match action {
        ConfigAction::List => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        ConfigAction::Get { key } => match config.get_value(&key) {
            Some(value) => println!("{}", display_value(&value)),
            None => anyhow::bail!("Unknown config key: {}", key),
        },
        ConfigAction::Set { key, value, global } => {
            let scope = if global {
                ConfigScope::Global
            } else {
                ConfigScope::Project
            };
            let parsed = parse_value(&value);
            Config::set_value(scope, cwd, &key, parsed.clone())
                .with_context(|| format!("Failed to set {}", key))?;
            println!("Set {} = {}", key, parsed);
        }
    }
    Ok(())
}

/// Values that parse as JSON are stored typed, anything else as a string.
pub(crate) fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Strings print bare, everything else as JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("0.2"), json!(0.2));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("[\"ls\"]"), json!(["ls"]));
        assert_eq!(parse_value("gemini"), json!("gemini"));
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("ollama")), "ollama");
        assert_eq!(display_value(&json!(25)), "25");
    }
}
