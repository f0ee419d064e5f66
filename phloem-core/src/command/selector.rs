//! Command selection
//!
//! [`CommandSelector`] is shared by every connection of the run. It owns the command catalog,
//! the weights, the replay source and the payload generator. Per-connection state (command
//! stream, key cursors, open cursor session) lives in [`ConnectionDraw`], passed in on every
//! selection.
//!
//! The catalog draw for slot `s` of connection `c` depends only on the master seed, `c` and `s`,
//! so thread scheduling never changes which commands a connection issues.
//!
//! Precedence on each slot:
//! 1. an open cursor session on the connection supplies its continuation
//! 2. otherwise a catalog entry is drawn with probability `ratio_i / sum(ratios)`
//! 3. a replay entry resolves to a traffic-log command, a static entry is rendered

use super::replay::{ReplaySource, ReplayTarget};
use super::scan::{CursorCommand, ScanOutcome, ScanTracker};
use super::template::{CommandTemplate, ParsedCommand, RenderContext};
use super::{Command, CommandKind};
use crate::error::ConfigError;
use crate::seed::{components, RandomStream};
use crate::workload::{
    ClientPosition, KeyGenerator, KeyPattern, KeyRange, PayloadGenerator, ValueSize,
};
use rand_distr::{weighted::WeightedIndex, Distribution as RandDistribution};
use std::sync::Arc;

/// One configured command with its weight
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub command: ParsedCommand,
    pub ratio: u32,
    pub key_pattern: KeyPattern,
}

/// Settings shared by every entry of the catalog
#[derive(Debug, Clone)]
pub struct SelectorOptions {
    pub key_range: KeyRange,
    pub key_prefix: String,
    pub value_size: ValueSize,
    pub random_data: bool,
    pub scan_incremental: bool,
    pub scan_max_iterations: Option<u32>,
    pub total_clients: usize,
    pub master_seed: u64,
}

/// A drawable catalog entry
#[derive(Debug)]
pub enum CatalogEntry {
    Static {
        template: CommandTemplate,
        key_pattern: KeyPattern,
        /// Set when cursor iteration is enabled and the template starts at cursor `0`
        cursor: Option<CursorCommand>,
        /// Index of this entry's key generator in [`ConnectionDraw`]
        slot: usize,
        /// Shared stream for Random/Gaussian/Zipfian keys of this slot
        keys: Arc<RandomStream>,
    },
    Replay { source: Arc<ReplaySource>, target: ReplayTarget },
}

/// Shared command selector
#[derive(Debug)]
pub struct CommandSelector {
    entries: Vec<CatalogEntry>,
    ratios: Vec<u32>,
    /// `None` with a single entry
    weights: Option<WeightedIndex<u32>>,
    payloads: PayloadGenerator,
    options: SelectorOptions,
}

impl CommandSelector {
    pub fn new(
        specs: Vec<CommandSpec>,
        replay: Option<Arc<ReplaySource>>,
        options: SelectorOptions,
    ) -> Result<Self, ConfigError> {
        if specs.is_empty() {
            return Err(ConfigError::EmptyCommandSet);
        }

        let ratios: Vec<u32> = specs.iter().map(|spec| spec.ratio).collect();
        if ratios.iter().all(|&r| r == 0) {
            return Err(ConfigError::InvalidRatio("at least one ratio must be > 0".to_string()));
        }
        let weights = if ratios.len() > 1 {
            Some(WeightedIndex::new(&ratios).map_err(|e| ConfigError::InvalidRatio(e.to_string()))?)
        } else {
            None
        };

        let mut entries = Vec::with_capacity(specs.len());
        let mut slots = 0;
        for (index, spec) in specs.into_iter().enumerate() {
            let entry = match spec.command {
                ParsedCommand::Static(template) => {
                    spec.key_pattern.validate(&options.key_range, options.total_clients)?;
                    let cursor = if options.scan_incremental {
                        CursorCommand::recognize(&template)
                    } else {
                        None
                    };
                    let keys = Arc::new(RandomStream::for_component(
                        options.master_seed,
                        &components::key_slot(index),
                    ));
                    slots += 1;
                    CatalogEntry::Static {
                        template,
                        key_pattern: spec.key_pattern,
                        cursor,
                        slot: slots - 1,
                        keys,
                    }
                }
                ParsedCommand::Replay(selector) => {
                    let Some(source) = &replay else {
                        return Err(ConfigError::MonitorPlaceholderWithoutLog(format!(
                            "{selector:?}"
                        )));
                    };
                    let target = source.target(selector)?;
                    CatalogEntry::Replay { source: source.clone(), target }
                }
            };
            entries.push(entry);
        }

        let payloads = PayloadGenerator::new(
            options.value_size.clone(),
            options.random_data,
            Arc::new(RandomStream::for_component(options.master_seed, components::PAYLOAD)),
        );

        Ok(Self { entries, ratios, weights, payloads, options })
    }

    /// Fresh per-connection state for `client`
    pub fn connection(&self, client: ClientPosition) -> Result<ConnectionDraw, ConfigError> {
        let mut keys = Vec::new();
        for entry in &self.entries {
            if let CatalogEntry::Static { key_pattern, keys: stream, .. } = entry {
                keys.push(KeyGenerator::new(
                    key_pattern,
                    self.options.key_range,
                    client,
                    stream.clone(),
                )?);
            }
        }
        let commands = RandomStream::for_component(
            self.options.master_seed,
            &components::command_selection(client.index),
        );
        let scan = ScanTracker::new(self.options.scan_max_iterations);
        Ok(ConnectionDraw { client, commands, keys, scan })
    }

    /// Resolve the command for request slot `slot_index` of `connection`
    pub fn select(&self, slot_index: u64, connection: &mut ConnectionDraw) -> Command {
        if let Some(continuation) = connection.scan.next_continuation() {
            tracing::trace!(
                "client {} slot {}: continuation {}",
                connection.client.index,
                slot_index,
                continuation.category
            );
            return continuation;
        }

        let index = self.draw_entry(slot_index, &connection.commands);
        match &self.entries[index] {
            CatalogEntry::Replay { source, target } => {
                Command::plain(source.resolve(*target).to_args())
            }
            CatalogEntry::Static { template, cursor, slot, .. } => {
                let mut ctx = RenderContext {
                    key_prefix: &self.options.key_prefix,
                    keys: &mut connection.keys[*slot],
                    payloads: &self.payloads,
                };
                let args = template.render(&mut ctx);
                match cursor {
                    Some(cursor) => connection.scan.begin(cursor.clone(), args),
                    None => Command::plain(args),
                }
            }
        }
    }

    fn draw_entry(&self, slot_index: u64, commands: &RandomStream) -> usize {
        match &self.weights {
            Some(weights) => commands.draw_at(slot_index, |rng| weights.sample(rng)),
            None => 0,
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn ratios(&self) -> &[u32] {
        &self.ratios
    }

    /// Whether any entry opens cursor sessions
    pub fn has_cursor_commands(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| matches!(entry, CatalogEntry::Static { cursor: Some(_), .. }))
    }
}

/// Per-connection selection state
#[derive(Debug)]
pub struct ConnectionDraw {
    client: ClientPosition,
    /// Catalog draws, addressed by request slot
    commands: RandomStream,
    /// One generator per static catalog entry
    keys: Vec<KeyGenerator>,
    scan: ScanTracker,
}

impl ConnectionDraw {
    /// Feed the outcome of a completed command back into cursor tracking
    ///
    /// `cursor` is the cursor returned by the server, `None` for failures and replies without
    /// one.
    pub fn on_response(&mut self, command: &Command, cursor: Option<u64>) -> ScanOutcome {
        match command.kind {
            CommandKind::Plain => ScanOutcome::Ignored,
            CommandKind::ScanInitial | CommandKind::ScanContinuation => {
                self.scan.on_response(cursor)
            }
        }
    }

    /// Drop any open cursor session
    pub fn abandon_scan(&mut self) {
        self.scan.abandon();
    }

    /// Restart Sequential/Parallel key cursors
    pub fn reset_keys(&mut self) {
        self.keys.iter_mut().for_each(KeyGenerator::reset);
    }

    pub fn scan(&self) -> &ScanTracker {
        &self.scan
    }

    pub fn client(&self) -> ClientPosition {
        self.client
    }
}
