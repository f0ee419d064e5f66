//! Per-thread worker
//!
//! A worker owns a fixed set of client connections. Each connection runs its own strictly
//! sequential request/response cycle (up to `pipeline` requests per batch). The worker loop
//! repeatedly services whichever connection is due first according to its
//! [`ConnectionPolicy`], sleeping until then when nothing is due. Connections that are due at
//! the same time are serviced round-robin.
//!
//! When the run deadline passes, outstanding per-connection state (open cursor sessions,
//! reconnect backoff) is dropped as is.

use crate::command::{Command, CommandSelector, ConnectionDraw};
use crate::policy::{ConnectionPolicy, RateLimitConfig, ReconnectConfig};
use crate::stats::StatsSink;
use crate::timing;
use crate::transport::{Connector, Response, Transport};
use crate::workload::ClientPosition;
use crate::error::TransportError;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for one worker thread
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub thread_id: usize,
    /// Requests per batch on each connection
    pub pipeline: usize,
    /// Request budget per connection (`None` when the run is time-bounded)
    pub requests_per_client: Option<u64>,
    /// Absolute deadline from [`timing::time_ns`]
    pub deadline_ns: Option<u64>,
    pub reconnect: ReconnectConfig,
    pub rate_limit: Option<RateLimitConfig>,
}

/// Final state of one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOutcome {
    pub conn_id: usize,
    pub thread_id: usize,
    /// Requests that received a reply (including server error replies)
    pub completed: u64,
    /// Requests dropped after a transport error
    pub failed: u64,
    /// Successful reconnections (error recovery and proactive interval)
    pub reconnects: u64,
    pub fatal: bool,
}

impl ConnectionOutcome {
    /// Requests issued and accounted for
    pub fn issued(&self) -> u64 {
        self.completed + self.failed
    }
}

struct ClientConnection<T> {
    conn_id: usize,
    transport: Option<T>,
    draw: ConnectionDraw,
    policy: ConnectionPolicy,
    /// Next request slot on this connection
    slot: u64,
    completed: u64,
    failed: u64,
    reconnects: u64,
    /// Completed since the connection was (re)opened
    since_connect: u64,
    /// Batch to re-send once reconnected
    retry: Vec<Command>,
}

impl<T: Transport> ClientConnection<T> {
    fn issued(&self) -> u64 {
        self.completed + self.failed
    }

    fn close_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close() {
                tracing::debug!("Connection {} close failed: {}", self.conn_id, e);
            }
        }
    }

    fn outcome(&self, thread_id: usize) -> ConnectionOutcome {
        ConnectionOutcome {
            conn_id: self.conn_id,
            thread_id,
            completed: self.completed,
            failed: self.failed,
            reconnects: self.reconnects,
            fatal: self.policy.is_fatal(),
        }
    }
}

/// Worker driving a set of connections to completion
pub struct Worker<C: Connector, S: StatsSink> {
    connector: Arc<C>,
    selector: Arc<CommandSelector>,
    connections: Vec<ClientConnection<C::Conn>>,
    stats: S,
    config: WorkerConfig,
    /// Connection that wins the next tie
    rotation: usize,
}

impl<C: Connector, S: StatsSink> Worker<C, S> {
    /// Create a worker for `clients`, opening one connection per client
    ///
    /// A connection that cannot be opened is handled like any transport error: it either
    /// starts backing off or is marked fatal.
    pub fn new(
        connector: Arc<C>,
        selector: Arc<CommandSelector>,
        clients: &[ClientPosition],
        stats: S,
        config: WorkerConfig,
    ) -> Result<Self> {
        let now = timing::time_ns();
        let mut connections = Vec::with_capacity(clients.len());

        for &client in clients {
            let conn_id = client.index;
            let draw = selector.connection(client)?;
            let mut policy = ConnectionPolicy::new(
                conn_id,
                config.reconnect.clone(),
                config.rate_limit.as_ref(),
                now,
            );
            let transport = match connector.connect(conn_id) {
                Ok(transport) => Some(transport),
                Err(e) => {
                    policy.on_transport_error(now, &e);
                    None
                }
            };
            connections.push(ClientConnection {
                conn_id,
                transport,
                draw,
                policy,
                slot: 0,
                completed: 0,
                failed: 0,
                reconnects: 0,
                since_connect: 0,
                retry: Vec::new(),
            });
        }

        tracing::debug!(
            "Worker {} started with {} connection(s)",
            config.thread_id,
            connections.len()
        );
        Ok(Self { connector, selector, connections, stats, config, rotation: 0 })
    }

    /// Run until every connection has exhausted its budget, gone fatal, or the deadline passes
    pub fn run(&mut self) -> Result<()> {
        loop {
            let now = timing::time_ns();
            if self.config.deadline_ns.is_some_and(|deadline| now >= deadline) {
                tracing::debug!("Worker {} reached the run deadline", self.config.thread_id);
                break;
            }

            let Some((index, ready_at)) = self.next_ready(now) else {
                break;
            };

            if ready_at > now {
                let wake = match self.config.deadline_ns {
                    Some(deadline) => ready_at.min(deadline),
                    None => ready_at,
                };
                timing::sleep_until(wake);
                continue;
            }

            self.rotation = (index + 1) % self.connections.len();
            self.service(index, now)?;
        }

        for conn in &mut self.connections {
            conn.close_transport();
        }
        Ok(())
    }

    /// Connection with the earliest ready time among those with work left
    ///
    /// Everything due by `now` counts as ready at `now`; ties go to the first connection at or
    /// after `rotation`.
    fn next_ready(&mut self, now: u64) -> Option<(usize, u64)> {
        let budget = self.config.requests_per_client;
        let count = self.connections.len();
        let mut best: Option<(usize, u64)> = None;

        for offset in 0..count {
            let index = (self.rotation + offset) % count;
            let conn = &mut self.connections[index];
            if budget.is_some_and(|b| conn.issued() >= b) {
                continue;
            }
            let Some(at) = conn.policy.ready_at(now) else {
                continue;
            };
            let at = at.max(now);
            if best.map_or(true, |(_, earliest)| at < earliest) {
                best = Some((index, at));
            }
        }
        best
    }

    fn service(&mut self, index: usize, now: u64) -> Result<()> {
        let conn = &mut self.connections[index];

        if conn.policy.needs_reconnect(now) {
            match self.connector.connect(conn.conn_id) {
                Ok(transport) => {
                    conn.transport = Some(transport);
                    conn.since_connect = 0;
                    conn.reconnects += 1;
                    conn.policy.on_reconnect_result(now, true);
                }
                Err(e) => {
                    tracing::debug!("Connection {} reconnect error: {}", conn.conn_id, e);
                    conn.policy.on_reconnect_result(now, false);
                    if conn.policy.is_fatal() {
                        Self::drop_pending(conn, &mut self.stats);
                    }
                }
            }
            return Ok(());
        }

        let batch = if conn.retry.is_empty() {
            let remaining = match self.config.requests_per_client {
                Some(budget) => budget.saturating_sub(conn.issued()),
                None => u64::MAX,
            };
            let wanted =
                usize::try_from(remaining).unwrap_or(usize::MAX).min(self.config.pipeline);
            let granted = conn.policy.take_tokens(now, wanted);
            if granted == 0 {
                return Ok(());
            }
            let mut batch = Vec::with_capacity(granted);
            for _ in 0..granted {
                batch.push(self.selector.select(conn.slot, &mut conn.draw));
                conn.slot += 1;
            }
            batch
        } else {
            std::mem::take(&mut conn.retry)
        };

        let Some(transport) = conn.transport.as_mut() else {
            return Err(Error::Connection(format!(
                "connection {} is connected without a transport",
                conn.conn_id
            )));
        };

        let start = timing::time_ns();
        let result = if batch.len() == 1 {
            transport.send(&batch[0]).map(|response| vec![response])
        } else {
            transport.send_batch(&batch)
        };
        let result = result.and_then(|responses| {
            if responses.len() == batch.len() {
                Ok(responses)
            } else {
                Err(TransportError::Protocol(format!(
                    "{} responses for a batch of {}",
                    responses.len(),
                    batch.len()
                )))
            }
        });
        let end = timing::time_ns();
        let latency = Duration::from_nanos(end.saturating_sub(start));

        match result {
            Ok(responses) => {
                Self::complete(conn, &mut self.stats, &batch, &responses, latency);
                conn.policy.on_success();
                let interval = self.config.reconnect.interval;
                let budget_left =
                    !self.config.requests_per_client.is_some_and(|b| conn.issued() >= b);
                if budget_left && interval.is_some_and(|every| conn.since_connect >= every) {
                    self.proactive_reconnect(index, end);
                }
            }
            Err(e) => {
                conn.close_transport();
                conn.policy.on_transport_error(end, &e);
                conn.retry = batch;
                if conn.policy.is_fatal() || !self.config.reconnect.retry_failed_request {
                    Self::drop_pending(conn, &mut self.stats);
                }
            }
        }
        Ok(())
    }

    fn complete(
        conn: &mut ClientConnection<C::Conn>,
        stats: &mut S,
        batch: &[Command],
        responses: &[Response],
        latency: Duration,
    ) {
        for (command, response) in batch.iter().zip(responses) {
            let success = response.is_success();
            stats.record(
                &command.category,
                latency,
                response.bytes_sent,
                response.bytes_received,
                success,
            );
            let cursor = if success { response.cursor } else { None };
            conn.draw.on_response(command, cursor);
            conn.completed += 1;
            conn.since_connect += 1;
        }
    }

    /// Record the pending batch as failed and drop any open cursor session
    fn drop_pending(conn: &mut ClientConnection<C::Conn>, stats: &mut S) {
        for command in conn.retry.drain(..) {
            stats.record(&command.category, Duration::ZERO, 0, 0, false);
            conn.failed += 1;
        }
        conn.draw.abandon_scan();
    }

    fn proactive_reconnect(&mut self, index: usize, now: u64) {
        let conn = &mut self.connections[index];
        tracing::debug!(
            "Connection {} reconnecting after {} requests",
            conn.conn_id,
            conn.since_connect
        );
        conn.close_transport();
        match self.connector.connect(conn.conn_id) {
            Ok(transport) => {
                conn.transport = Some(transport);
                conn.since_connect = 0;
                conn.reconnects += 1;
            }
            Err(e) => conn.policy.on_transport_error(now, &e),
        }
    }

    /// Per-connection outcomes, in connection order
    pub fn outcomes(&self) -> Vec<ConnectionOutcome> {
        self.connections.iter().map(|conn| conn.outcome(self.config.thread_id)).collect()
    }

    pub fn stats(&self) -> &S {
        &self.stats
    }

    /// Consume the worker, returning its statistics and connection outcomes
    pub fn into_parts(self) -> (S, Vec<ConnectionOutcome>) {
        let outcomes = self.outcomes();
        (self.stats, outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandSpec, ParsedCommand, SelectorOptions};
    use crate::stats::CategoryStatsCollector;
    use crate::workload::{KeyPattern, KeyRange, ValueSize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies OK to everything; fails every `fail_every`-th send when set
    struct Scripted {
        sends: Arc<AtomicUsize>,
        fail_every: Option<usize>,
    }

    impl Transport for Scripted {
        fn send(&mut self, command: &Command) -> std::result::Result<Response, TransportError> {
            let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_every.is_some_and(|every| n % every == 0) {
                return Err(TransportError::Closed);
            }
            Ok(Response {
                bytes_sent: command.args.iter().map(Vec::len).sum(),
                bytes_received: 5,
                ..Default::default()
            })
        }
    }

    struct ScriptedConnector {
        sends: Arc<AtomicUsize>,
        connects: AtomicUsize,
        fail_every: Option<usize>,
        refuse: bool,
        /// Connects accepted before refusing
        accept_limit: Option<usize>,
    }

    impl ScriptedConnector {
        fn new(fail_every: Option<usize>, refuse: bool) -> Self {
            Self {
                sends: Arc::new(AtomicUsize::new(0)),
                connects: AtomicUsize::new(0),
                fail_every,
                refuse,
                accept_limit: None,
            }
        }
    }

    impl Connector for ScriptedConnector {
        type Conn = Scripted;

        fn connect(&self, _conn_id: usize) -> std::result::Result<Scripted, TransportError> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            if self.refuse || self.accept_limit.is_some_and(|limit| n >= limit) {
                return Err(TransportError::Closed);
            }
            Ok(Scripted { sends: self.sends.clone(), fail_every: self.fail_every })
        }
    }

    fn selector() -> Arc<CommandSelector> {
        let specs = vec![CommandSpec {
            command: ParsedCommand::parse("SET __key__ __data__", false).unwrap(),
            ratio: 1,
            key_pattern: KeyPattern::Sequential,
        }];
        let options = SelectorOptions {
            key_range: KeyRange::new(1, 100).unwrap(),
            key_prefix: "memtier-".to_string(),
            value_size: ValueSize::Fixed { size: 8 },
            random_data: false,
            scan_incremental: false,
            scan_max_iterations: None,
            total_clients: 2,
            master_seed: 7,
        };
        Arc::new(CommandSelector::new(specs, None, options).unwrap())
    }

    fn config(requests: u64, reconnect: ReconnectConfig) -> WorkerConfig {
        WorkerConfig {
            thread_id: 0,
            pipeline: 1,
            requests_per_client: Some(requests),
            deadline_ns: None,
            reconnect,
            rate_limit: None,
        }
    }

    fn clients() -> Vec<ClientPosition> {
        vec![ClientPosition::new(0, 2), ClientPosition::new(1, 2)]
    }

    fn fast_reconnect(retry_failed_request: bool) -> ReconnectConfig {
        ReconnectConfig {
            enabled: true,
            max_attempts: 3,
            base_delay: Duration::from_micros(10),
            retry_failed_request,
            ..Default::default()
        }
    }

    #[test]
    fn test_fixed_budget_completes() {
        let connector = Arc::new(ScriptedConnector::new(None, false));
        let mut worker = Worker::new(
            connector.clone(),
            selector(),
            &clients(),
            CategoryStatsCollector::new(),
            config(25, ReconnectConfig::default()),
        )
        .unwrap();
        worker.run().unwrap();

        let (stats, outcomes) = worker.into_parts();
        assert_eq!(stats.get("SET").unwrap().requests, 50);
        assert!(outcomes.iter().all(|o| o.completed == 25 && !o.fatal));
        assert_eq!(connector.sends.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn test_pipelined_batches_respect_budget() {
        let connector = Arc::new(ScriptedConnector::new(None, false));
        let mut cfg = config(10, ReconnectConfig::default());
        cfg.pipeline = 4;
        let mut worker =
            Worker::new(connector, selector(), &clients(), CategoryStatsCollector::new(), cfg)
                .unwrap();
        worker.run().unwrap();
        assert!(worker.outcomes().iter().all(|o| o.completed == 10));
    }

    #[test]
    fn test_error_without_reconnect_is_fatal() {
        let connector = Arc::new(ScriptedConnector::new(Some(5), false));
        let mut worker = Worker::new(
            connector,
            selector(),
            &clients()[..1],
            CategoryStatsCollector::new(),
            config(20, ReconnectConfig::default()),
        )
        .unwrap();
        worker.run().unwrap();

        let outcome = &worker.outcomes()[0];
        assert!(outcome.fatal);
        assert_eq!(outcome.completed, 4);
        assert_eq!(outcome.failed, 1);
        assert_eq!(worker.stats().get("SET").unwrap().errors, 1);
    }

    #[test]
    fn test_retry_after_reconnect_not_double_counted() {
        let connector = Arc::new(ScriptedConnector::new(Some(5), false));
        let mut worker = Worker::new(
            connector.clone(),
            selector(),
            &clients()[..1],
            CategoryStatsCollector::new(),
            config(20, fast_reconnect(true)),
        )
        .unwrap();
        worker.run().unwrap();

        let outcome = &worker.outcomes()[0];
        assert!(!outcome.fatal);
        assert_eq!(outcome.completed, 20);
        assert_eq!(outcome.failed, 0);
        assert!(outcome.reconnects >= 4);
        assert_eq!(worker.stats().get("SET").unwrap().requests, 20);
        assert_eq!(worker.stats().get("SET").unwrap().errors, 0);
    }

    #[test]
    fn test_dropped_requests_counted_once() {
        let connector = Arc::new(ScriptedConnector::new(Some(5), false));
        let mut worker = Worker::new(
            connector,
            selector(),
            &clients()[..1],
            CategoryStatsCollector::new(),
            config(20, fast_reconnect(false)),
        )
        .unwrap();
        worker.run().unwrap();

        let outcome = &worker.outcomes()[0];
        assert_eq!(outcome.issued(), 20);
        assert!(outcome.failed > 0);
        assert_eq!(worker.stats().get("SET").unwrap().requests, 20);
    }

    #[test]
    fn test_refused_connection_goes_fatal_after_attempts() {
        let connector = Arc::new(ScriptedConnector::new(None, true));
        let mut worker = Worker::new(
            connector.clone(),
            selector(),
            &clients()[..1],
            CategoryStatsCollector::new(),
            config(5, fast_reconnect(true)),
        )
        .unwrap();
        worker.run().unwrap();

        assert!(worker.outcomes()[0].fatal);
        // initial connect + max_attempts reconnects
        assert_eq!(connector.connects.load(Ordering::SeqCst), 4);
        assert_eq!(connector.sends.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_deadline_stops_unbounded_run() {
        let connector = Arc::new(ScriptedConnector::new(None, false));
        let mut cfg = config(0, ReconnectConfig::default());
        cfg.requests_per_client = None;
        cfg.deadline_ns = Some(timing::time_ns() + 20_000_000);
        let mut worker =
            Worker::new(connector, selector(), &clients(), CategoryStatsCollector::new(), cfg)
                .unwrap();
        worker.run().unwrap();
        assert!(worker.outcomes().iter().all(|o| o.completed > 0));
    }

    #[test]
    fn test_ready_connections_take_turns() {
        let connector = Arc::new(ScriptedConnector::new(None, false));
        let mut cfg = config(0, ReconnectConfig::default());
        cfg.requests_per_client = None;
        cfg.deadline_ns = Some(timing::time_ns() + 20_000_000);
        let clients: Vec<ClientPosition> = (0..4).map(|i| ClientPosition::new(i, 4)).collect();
        let mut worker =
            Worker::new(connector, selector(), &clients, CategoryStatsCollector::new(), cfg)
                .unwrap();
        worker.run().unwrap();

        let completed: Vec<u64> = worker.outcomes().iter().map(|o| o.completed).collect();
        let (min, max) = (completed.iter().min().unwrap(), completed.iter().max().unwrap());
        assert!(*min > 0, "{completed:?}");
        assert!(max - min <= 1, "{completed:?}");
    }

    #[test]
    fn test_budgeted_connections_interleave() {
        let connector = Arc::new(ScriptedConnector::new(None, false));
        let mut worker = Worker::new(
            connector,
            selector(),
            &clients(),
            CategoryStatsCollector::new(),
            config(3, ReconnectConfig::default()),
        )
        .unwrap();

        let now = timing::time_ns();
        let mut order = Vec::new();
        while let Some((index, _)) = worker.next_ready(now) {
            worker.rotation = (index + 1) % worker.connections.len();
            worker.service(index, now).unwrap();
            order.push(index);
        }
        assert_eq!(order, vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_proactive_reconnect_interval() {
        let connector = Arc::new(ScriptedConnector::new(None, false));
        let reconnect = ReconnectConfig { interval: Some(3), ..Default::default() };
        let mut worker = Worker::new(
            connector.clone(),
            selector(),
            &clients()[..1],
            CategoryStatsCollector::new(),
            config(9, reconnect),
        )
        .unwrap();
        worker.run().unwrap();
        // After requests 3 and 6; the budget is spent at 9
        assert_eq!(worker.outcomes()[0].reconnects, 2);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_no_interval_reconnect_after_last_request() {
        let mut connector = ScriptedConnector::new(None, false);
        connector.accept_limit = Some(1);
        let connector = Arc::new(connector);
        let reconnect = ReconnectConfig { interval: Some(10), ..Default::default() };
        let mut worker = Worker::new(
            connector.clone(),
            selector(),
            &clients()[..1],
            CategoryStatsCollector::new(),
            config(10, reconnect),
        )
        .unwrap();
        worker.run().unwrap();

        let outcome = &worker.outcomes()[0];
        assert_eq!(outcome.completed, 10);
        assert!(!outcome.fatal);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }
}
