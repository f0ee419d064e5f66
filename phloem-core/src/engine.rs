//! Run orchestration
//!
//! [`Engine`] spreads `threads * clients_per_thread` connections over worker threads (client
//! `i` lives on thread `i / clients_per_thread`), runs them and folds the per-thread results
//! into a [`RunReport`].

use crate::config::{RunLimit, ValidatedEngine};
use crate::stats::CategoryStatsCollector;
use crate::threading::{ConnectionOutcome, ThreadingRuntime, Worker, WorkerConfig};
use crate::timing;
use crate::transport::Connector;
use crate::workload::ClientPosition;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// Result of a complete run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub stats: CategoryStatsCollector,
    /// Every connection, ordered by connection id
    pub connections: Vec<ConnectionOutcome>,
    pub elapsed: Duration,
    /// Request budget per connection (`None` for time-bounded runs)
    pub requests_per_client: Option<u64>,
}

impl RunReport {
    /// Connections that were given up
    pub fn fatal_connections(&self) -> impl Iterator<Item = &ConnectionOutcome> {
        self.connections.iter().filter(|c| c.fatal)
    }

    /// Connections that did not issue their whole request budget
    pub fn incomplete_connections(&self) -> impl Iterator<Item = &ConnectionOutcome> {
        let budget = self.requests_per_client;
        self.connections.iter().filter(move |c| budget.is_some_and(|b| c.issued() < b))
    }

    /// The run succeeds when no connection went fatal and every budget was issued
    ///
    /// Failed connections still contribute their statistics.
    pub fn is_success(&self) -> bool {
        self.fatal_connections().next().is_none() && self.incomplete_connections().next().is_none()
    }

    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.stats.total_requests() as f64 / secs
        } else {
            0.0
        }
    }
}

/// Executes a validated configuration against a connector
pub struct Engine<C: Connector + 'static> {
    plan: ValidatedEngine,
    connector: Arc<C>,
}

impl<C: Connector + 'static> Engine<C> {
    pub fn new(plan: ValidatedEngine, connector: C) -> Self {
        Self { plan, connector: Arc::new(connector) }
    }

    pub fn plan(&self) -> &ValidatedEngine {
        &self.plan
    }

    pub fn run(&self) -> Result<RunReport> {
        let plan = &self.plan;
        let total_clients = plan.total_clients();
        let clients_per_thread = plan.clients_per_thread;
        let requests_per_client = plan.requests_per_client();

        let start = timing::time_ns();
        let deadline_ns = match plan.limit {
            RunLimit::Duration(duration) => Some(start + timing::duration_ns(duration)),
            RunLimit::Requests(_) => None,
        };

        tracing::info!(
            "Starting run: {} connection(s) on {} thread(s)",
            total_clients,
            plan.threads
        );

        let connector = self.connector.clone();
        let selector = plan.selector.clone();
        let base = WorkerConfig {
            thread_id: 0,
            pipeline: plan.pipeline,
            requests_per_client,
            deadline_ns,
            reconnect: plan.reconnect.clone(),
            rate_limit: plan.rate_limit.clone(),
        };

        let runtime = ThreadingRuntime::new(plan.threads);
        let results = runtime.run_workers(move |thread_id| {
            let clients: Vec<ClientPosition> = (0..clients_per_thread)
                .map(|i| ClientPosition::new(thread_id * clients_per_thread + i, total_clients))
                .collect();
            let config = WorkerConfig { thread_id, ..base.clone() };
            let mut worker = Worker::new(
                connector.clone(),
                selector.clone(),
                &clients,
                CategoryStatsCollector::new(),
                config,
            )?;
            worker.run()?;
            Ok(worker.into_parts())
        })?;

        let elapsed = Duration::from_nanos(timing::time_ns().saturating_sub(start));
        let mut collectors = Vec::with_capacity(results.len());
        let mut connections = Vec::with_capacity(total_clients);
        for (stats, outcomes) in results {
            collectors.push(stats);
            connections.extend(outcomes);
        }
        connections.sort_by_key(|c| c.conn_id);

        let report = RunReport {
            stats: CategoryStatsCollector::merge(collectors),
            connections,
            elapsed,
            requests_per_client,
        };

        let fatal = report.fatal_connections().count();
        if fatal > 0 {
            tracing::warn!("{} of {} connection(s) failed", fatal, total_clients);
        }
        tracing::info!(
            "Run finished: {} request(s) in {:?}",
            report.stats.total_requests(),
            report.elapsed
        );
        Ok(report)
    }
}
