//! Run summary formatting

use anyhow::{Context, Result};
use phloem_core::stats::CategoryStats;
use phloem_core::RunReport;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// One row of the summary table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub requests: u64,
    pub errors: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub mean_latency_us: f64,
    pub min_latency_us: f64,
    pub max_latency_us: f64,
}

impl CategorySummary {
    fn new(category: &str, stats: &CategoryStats) -> Self {
        let us = |d: Option<std::time::Duration>| d.map_or(0.0, |d| d.as_secs_f64() * 1e6);
        Self {
            category: category.to_string(),
            requests: stats.requests,
            errors: stats.errors,
            tx_bytes: stats.bytes_sent,
            rx_bytes: stats.bytes_received,
            mean_latency_us: stats.mean_latency().as_secs_f64() * 1e6,
            min_latency_us: us(stats.min_latency()),
            max_latency_us: us(stats.max_latency()),
        }
    }
}

/// Results of one experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResults {
    pub experiment: String,
    pub target: String,
    pub duration_secs: f64,
    pub throughput_rps: f64,
    pub connections: usize,
    pub failed_connections: Vec<usize>,
    pub incomplete_connections: Vec<usize>,
    pub success: bool,
    pub categories: Vec<CategorySummary>,
    pub totals: CategorySummary,
}

impl ExperimentResults {
    pub fn from_report(experiment: &str, target: &str, report: &RunReport) -> Self {
        let categories = report
            .stats
            .categories()
            .map(|(name, stats)| CategorySummary::new(name, stats))
            .collect();
        Self {
            experiment: experiment.to_string(),
            target: target.to_string(),
            duration_secs: report.elapsed.as_secs_f64(),
            throughput_rps: report.throughput(),
            connections: report.connections.len(),
            failed_connections: report.fatal_connections().map(|c| c.conn_id).collect(),
            incomplete_connections: report.incomplete_connections().map(|c| c.conn_id).collect(),
            success: report.is_success(),
            categories,
            totals: CategorySummary::new("Totals", &report.stats.totals()),
        }
    }

    /// Print results to stdout in human-readable format
    pub fn print_human(&self) {
        println!("\n{}", "=".repeat(96));
        println!("Phloem Results: {} against {}", self.experiment, self.target);
        println!("{}", "=".repeat(96));
        println!(
            "{:<24} {:>10} {:>8} {:>12} {:>12} {:>12} {:>12}",
            "Type", "Requests", "Errors", "Avg (us)", "Min (us)", "Max (us)", "KB/sec"
        );
        println!("{}", "-".repeat(96));
        for row in self.categories.iter().chain(std::iter::once(&self.totals)) {
            println!(
                "{:<24} {:>10} {:>8} {:>12.2} {:>12.2} {:>12.2} {:>12.2}",
                row.category,
                row.requests,
                row.errors,
                row.mean_latency_us,
                row.min_latency_us,
                row.max_latency_us,
                self.kb_per_sec(row),
            );
        }
        println!("{}", "-".repeat(96));
        println!(
            "{} connection(s), {:.2}s, {:.2} req/s",
            self.connections, self.duration_secs, self.throughput_rps
        );
        if !self.failed_connections.is_empty() {
            println!("Failed connections: {:?}", self.failed_connections);
        }
        if !self.incomplete_connections.is_empty() {
            println!("Connections short of their request count: {:?}", self.incomplete_connections);
        }
    }

    fn kb_per_sec(&self, row: &CategorySummary) -> f64 {
        if self.duration_secs > 0.0 {
            (row.tx_bytes + row.rx_bytes) as f64 / 1024.0 / self.duration_secs
        } else {
            0.0
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write results to JSON file
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        file.write_all(self.to_json()?.as_bytes())?;
        Ok(())
    }
}
