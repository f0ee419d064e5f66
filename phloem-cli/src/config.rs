//! Profile files
//!
//! A profile is a TOML file describing one run. Any value can be overridden from the command
//! line with dot-notation `--set` paths, applied to the parsed TOML before deserialization.

use anyhow::{bail, Context, Result};
use phloem_core::config::{ConnectionConfig, EngineConfig, RunConfig, WorkloadConfig};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level profile configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ProfileConfig {
    pub experiment: ExperimentConfig,
    pub target: TargetConfig,
    #[serde(default)]
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Experiment metadata
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ExperimentConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Master seed; a fixed default keeps runs reproducible when unset
    #[serde(default)]
    pub seed: Option<u64>,
    /// Seed from OS entropy instead
    #[serde(default)]
    pub randomize: bool,
}

/// Target server configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct TargetConfig {
    /// Server address, e.g. "127.0.0.1:6379"
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub connect_timeout: Duration,
    /// Per-request socket timeout
    #[serde(default = "default_io_timeout", with = "humantime_serde")]
    #[schemars(with = "Option<String>")]
    pub io_timeout: Option<Duration>,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_io_timeout() -> Option<Duration> {
    Some(Duration::from_secs(10))
}

/// Output configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct OutputConfig {
    /// Output format: text, json
    #[serde(default = "default_format")]
    pub format: String,
    /// Write the JSON summary here instead of stdout
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_format() -> String {
    "text".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { format: default_format(), file: None }
    }
}

impl ProfileConfig {
    /// Load profile from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_file_with_overrides(path, &[])
    }

    /// Load profile from TOML file with --set style overrides
    pub fn from_file_with_overrides<P: AsRef<Path>>(path: P, overrides: &[String]) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut value: toml::Value = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        for override_str in overrides {
            let (key, val) = parse_key_value(override_str)
                .with_context(|| format!("Invalid override format: {override_str}"))?;
            set_toml_path(&mut value, &key, &val)
                .with_context(|| format!("Failed to apply override: {override_str}"))?;
        }

        let mut config: ProfileConfig =
            value.try_into().context("Failed to deserialize configuration")?;
        config.resolve_paths(path);
        config.validate()?;
        Ok(config)
    }

    /// Relative replay paths are taken relative to the profile's directory
    fn resolve_paths(&mut self, profile: &Path) {
        let Some(replay) = self.workload.replay.as_mut() else {
            return;
        };
        if replay.path.is_relative() {
            if let Some(dir) = profile.parent() {
                replay.path = dir.join(&replay.path);
            }
        }
    }

    /// Checks owned by the profile itself; engine checks run in [`EngineConfig::validate`]
    pub fn validate(&self) -> Result<()> {
        if self.experiment.name.is_empty() {
            bail!("Experiment name cannot be empty");
        }

        match &self.target.address {
            Some(address) if address.is_empty() => bail!("Target address cannot be empty"),
            Some(_) => {}
            None => bail!("Target address must be specified (set target.address)"),
        }
        if self.target.connect_timeout.is_zero() {
            bail!("target.connect_timeout must be > 0");
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.output.format.as_str()) {
            bail!(
                "Invalid output format '{}'. Valid options: {}",
                self.output.format,
                valid_formats.join(", ")
            );
        }
        Ok(())
    }

    pub fn target_address(&self) -> &str {
        self.target.address.as_deref().unwrap_or_default()
    }

    /// Engine configuration described by this profile
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            seed: self.experiment.seed,
            randomize: self.experiment.randomize,
            workload: self.workload.clone(),
            connection: self.connection.clone(),
            run: self.run.clone(),
        }
    }
}

/// Parse a "key=value" string into (key, value) tuple
fn parse_key_value(override_str: &str) -> Result<(String, String)> {
    match override_str.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => bail!("Invalid override format '{override_str}'. Expected 'key=value'"),
    }
}

/// Path segment types
enum PathSegment {
    Key(String),
    Index(usize),
    Append,
}

/// Parse a path string into segments (handles "key", "0", "+")
fn parse_path(path: &str) -> Vec<PathSegment> {
    path.split('.')
        .filter(|part| !part.is_empty())
        .map(|part| {
            if part == "+" {
                PathSegment::Append
            } else if let Ok(idx) = part.parse::<usize>() {
                PathSegment::Index(idx)
            } else {
                PathSegment::Key(part.to_string())
            }
        })
        .collect()
}

/// Set a value in TOML using dot-notation path
fn set_toml_path(root: &mut toml::Value, path: &str, value_str: &str) -> Result<()> {
    let parts = parse_path(path);
    let Some((last, parents)) = parts.split_last() else {
        bail!("Empty path");
    };

    let mut current = root;
    for part in parents {
        current = match part {
            PathSegment::Key(key) => {
                let toml::Value::Table(table) = current else {
                    bail!("Cannot navigate through non-table value at key '{key}'");
                };
                table.entry(key.clone()).or_insert(toml::Value::Table(Default::default()))
            }
            PathSegment::Index(idx) => {
                let toml::Value::Array(arr) = current else {
                    bail!("Cannot index non-array value");
                };
                let len = arr.len();
                arr.get_mut(*idx)
                    .with_context(|| format!("Array index {idx} out of bounds (length: {len})"))?
            }
            PathSegment::Append => bail!("Append operation '+' can only be at the end of path"),
        };
    }

    let value = parse_value(value_str)?;
    // Appending to a missing key starts a new array
    if matches!(last, PathSegment::Append)
        && matches!(*current, toml::Value::Table(ref table) if table.is_empty())
    {
        *current = toml::Value::Array(Vec::new());
    }
    match (last, current) {
        (PathSegment::Key(key), toml::Value::Table(table)) => {
            table.insert(key.clone(), value);
        }
        (PathSegment::Key(key), _) => bail!("Cannot set key '{key}' on non-table value"),
        (PathSegment::Index(idx), toml::Value::Array(arr)) => {
            let len = arr.len();
            let slot = arr
                .get_mut(*idx)
                .with_context(|| format!("Array index {idx} out of bounds (length: {len})"))?;
            *slot = value;
        }
        (PathSegment::Append, toml::Value::Array(arr)) => arr.push(value),
        _ => bail!("Cannot index or append to non-array value"),
    }
    Ok(())
}

/// Parse a string value with type inference
fn parse_value(value_str: &str) -> Result<toml::Value> {
    let trimmed = value_str.trim();

    match trimmed {
        "true" => return Ok(toml::Value::Boolean(true)),
        "false" => return Ok(toml::Value::Boolean(false)),
        _ => {}
    }
    if let Ok(int_val) = trimmed.parse::<i64>() {
        return Ok(toml::Value::Integer(int_val));
    }
    if let Ok(float_val) = trimmed.parse::<f64>() {
        return Ok(toml::Value::Float(float_val));
    }

    let is_array = trimmed.starts_with('[') && trimmed.ends_with(']');
    let is_table = trimmed.starts_with('{') && trimmed.ends_with('}');
    if is_array || is_table {
        let wrapped = format!("value = {trimmed}");
        if let Ok(toml::Value::Table(mut table)) = toml::from_str::<toml::Value>(&wrapped) {
            if let Some(value) = table.remove("value") {
                return Ok(value);
            }
        }
        bail!("Failed to parse {}: {}", if is_array { "array" } else { "inline table" }, trimmed);
    }

    let quoted = trimmed.len() >= 2
        && ((trimmed.starts_with('"') && trimmed.ends_with('"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\'')));
    let string_val = if quoted { &trimmed[1..trimmed.len() - 1] } else { trimmed };
    Ok(toml::Value::String(string_val.to_string()))
}
