//! Engine configuration
//!
//! [`EngineConfig`] is the deserializable description of a run. [`EngineConfig::validate`]
//! performs every configuration check up front (key range, placeholders, traffic log, cursor
//! iteration, pipeline, rate limit, reconnection, run limits) and produces a
//! [`ValidatedEngine`] that can be executed without further failure modes of its own.

use crate::command::{
    CommandSelector, CommandSpec, ParsedCommand, ReplayPattern, ReplaySource, SelectorOptions,
    TrafficLog,
};
use crate::error::ConfigError;
use crate::policy::{RateLimitConfig, ReconnectConfig};
use crate::seed::{components, master_seed, RandomStream};
use crate::workload::{KeyPattern, KeyRange, ValueSize};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Request count used when neither `requests` nor `duration` is set
pub const DEFAULT_REQUESTS: u64 = 10_000;

/// One configured command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct CommandConfig {
    /// Command text, e.g. `"SET __key__ __data__"` or `"__monitor_line@__"`
    pub command: String,
    /// Relative weight
    #[serde(default = "default_ratio")]
    pub ratio: u32,
    /// Key pattern for this command's keys (defaults to the workload key pattern)
    #[serde(default)]
    pub key_pattern: Option<KeyPattern>,
}

fn default_ratio() -> u32 {
    1
}

/// Captured traffic log used by monitor placeholders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ReplayConfig {
    pub path: PathBuf,
    /// Selection for `__monitor_line@__`
    #[serde(default)]
    pub pattern: ReplayPattern,
}

/// Cursor iteration settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ScanConfig {
    /// Follow returned cursors with continuation requests
    #[serde(default)]
    pub incremental: bool,
    /// Maximum continuations per initial command
    #[serde(default)]
    pub max_iterations: Option<u32>,
}

/// What to send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct WorkloadConfig {
    #[serde(default)]
    pub key_minimum: u64,
    #[serde(default = "default_key_maximum")]
    pub key_maximum: u64,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Default key pattern for commands that do not set their own
    #[serde(default)]
    pub key_pattern: KeyPattern,
    #[serde(default)]
    pub value_size: ValueSize,
    /// Fill payloads with random printable bytes instead of `x`
    #[serde(default)]
    pub random_data: bool,
    #[serde(default)]
    pub commands: Vec<CommandConfig>,
    #[serde(default)]
    pub replay: Option<ReplayConfig>,
    #[serde(default)]
    pub scan: ScanConfig,
}

fn default_key_maximum() -> u64 {
    10_000_000
}

fn default_key_prefix() -> String {
    "memtier-".to_string()
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            key_minimum: 0,
            key_maximum: default_key_maximum(),
            key_prefix: default_key_prefix(),
            key_pattern: KeyPattern::default(),
            value_size: ValueSize::default(),
            random_data: false,
            commands: Vec::new(),
            replay: None,
            scan: ScanConfig::default(),
        }
    }
}

/// How each connection behaves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ConnectionConfig {
    /// Requests in flight per connection
    #[serde(default = "default_pipeline")]
    pub pipeline: usize,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_pipeline() -> usize {
    1
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            pipeline: default_pipeline(),
            rate_limit: None,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// How much to send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct RunConfig {
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default = "default_clients_per_thread")]
    pub clients_per_thread: usize,
    /// Requests per connection (mutually exclusive with `duration`)
    #[serde(default)]
    pub requests: Option<u64>,
    /// Run time (mutually exclusive with `requests`)
    #[serde(default, with = "humantime_serde")]
    #[cfg_attr(feature = "schema", schemars(with = "Option<String>"))]
    pub duration: Option<Duration>,
}

fn default_threads() -> usize {
    4
}

fn default_clients_per_thread() -> usize {
    50
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            clients_per_thread: default_clients_per_thread(),
            requests: None,
            duration: None,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct EngineConfig {
    /// Master seed (a constant default is used when unset)
    #[serde(default)]
    pub seed: Option<u64>,
    /// Seed from OS entropy; runs are no longer reproducible
    #[serde(default)]
    pub randomize: bool,
    #[serde(default)]
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub run: RunConfig,
}

/// Run limit of a validated configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLimit {
    /// Requests per connection
    Requests(u64),
    Duration(Duration),
}

/// A configuration that passed every check, ready to execute
#[derive(Debug)]
pub struct ValidatedEngine {
    pub selector: Arc<CommandSelector>,
    pub master_seed: u64,
    pub threads: usize,
    pub clients_per_thread: usize,
    pub pipeline: usize,
    pub limit: RunLimit,
    pub rate_limit: Option<RateLimitConfig>,
    pub reconnect: ReconnectConfig,
}

impl ValidatedEngine {
    pub fn total_clients(&self) -> usize {
        self.threads * self.clients_per_thread
    }

    pub fn requests_per_client(&self) -> Option<u64> {
        match self.limit {
            RunLimit::Requests(n) => Some(n),
            RunLimit::Duration(_) => None,
        }
    }
}

impl EngineConfig {
    /// Check the whole configuration and build the command catalog
    ///
    /// Loads the traffic log when one is configured; every other failure is a
    /// [`ConfigError`].
    pub fn validate(&self) -> crate::Result<ValidatedEngine> {
        let workload = &self.workload;
        let key_range = KeyRange::new(workload.key_minimum, workload.key_maximum)?;

        let run = &self.run;
        if run.threads == 0 || run.clients_per_thread == 0 {
            return Err(ConfigError::InvalidClients(format!(
                "threads ({}) and clients per thread ({}) must be > 0",
                run.threads, run.clients_per_thread
            ))
            .into());
        }
        let total_clients = run.threads * run.clients_per_thread;

        let pipeline = self.connection.pipeline;
        if pipeline == 0 {
            return Err(ConfigError::InvalidPipelineDepth.into());
        }

        let limit = match (run.requests, run.duration) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::RunLimitConflict(
                    "requests and duration are mutually exclusive".to_string(),
                )
                .into())
            }
            (Some(0), None) => {
                return Err(ConfigError::RunLimitConflict("requests must be > 0".to_string()).into())
            }
            (None, Some(d)) if d.is_zero() => {
                return Err(ConfigError::RunLimitConflict("duration must be > 0".to_string()).into())
            }
            (Some(n), None) => RunLimit::Requests(n),
            (None, Some(d)) => RunLimit::Duration(d),
            (None, None) => RunLimit::Requests(DEFAULT_REQUESTS),
        };

        workload.value_size.validate()?;
        if let Some(rate) = &self.connection.rate_limit {
            rate.validate()?;
        }
        self.connection.reconnect.validate()?;

        if workload.scan.incremental {
            if workload.commands.is_empty() {
                return Err(ConfigError::ScanWithoutCommand.into());
            }
            if pipeline != 1 {
                return Err(ConfigError::ScanPipelineDepth(pipeline).into());
            }
        }
        if workload.commands.is_empty() {
            return Err(ConfigError::EmptyCommandSet.into());
        }

        let log_configured = workload.replay.is_some();
        let mut specs = Vec::with_capacity(workload.commands.len());
        for command in &workload.commands {
            specs.push(CommandSpec {
                command: ParsedCommand::parse(&command.command, log_configured)?,
                ratio: command.ratio,
                key_pattern: command
                    .key_pattern
                    .clone()
                    .unwrap_or_else(|| workload.key_pattern.clone()),
            });
        }

        let seed = master_seed(self.seed, self.randomize);
        if self.randomize {
            tracing::info!("Randomized master seed: {}", seed);
        }

        let replay = match &workload.replay {
            Some(replay) => {
                let log = TrafficLog::load(&replay.path)?;
                let stream = RandomStream::for_component(seed, components::REPLAY_RANDOM);
                let source = ReplaySource::new(Arc::new(log), replay.pattern, Arc::new(stream))
                    .map_err(|_| {
                        ConfigError::EmptyTrafficLog(replay.path.display().to_string())
                    })?;
                Some(Arc::new(source))
            }
            None => None,
        };

        let options = SelectorOptions {
            key_range,
            key_prefix: workload.key_prefix.clone(),
            value_size: workload.value_size.clone(),
            random_data: workload.random_data,
            scan_incremental: workload.scan.incremental,
            scan_max_iterations: workload.scan.max_iterations,
            total_clients,
            master_seed: seed,
        };
        let selector = CommandSelector::new(specs, replay, options)?;

        if workload.scan.incremental && !selector.has_cursor_commands() {
            let first = workload.commands.first().map(|c| c.command.clone()).unwrap_or_default();
            return Err(ConfigError::ScanCommandNotCursorBearing(first).into());
        }

        tracing::info!(
            "Key range [{}, {}], prefix '{}', {} command(s)",
            key_range.minimum(),
            key_range.maximum(),
            workload.key_prefix,
            workload.commands.len()
        );
        tracing::info!(
            "{} thread(s) x {} client(s), pipeline {}, {:?}",
            run.threads,
            run.clients_per_thread,
            pipeline,
            limit
        );
        if workload.scan.incremental {
            tracing::info!(
                "Incremental scan enabled (max iterations: {:?})",
                workload.scan.max_iterations
            );
        }

        Ok(ValidatedEngine {
            selector: Arc::new(selector),
            master_seed: seed,
            threads: run.threads,
            clients_per_thread: run.clients_per_thread,
            pipeline,
            limit,
            rate_limit: self.connection.rate_limit.clone(),
            reconnect: self.connection.reconnect.clone(),
        })
    }
}
