//! In-memory per-category aggregation

use super::StatsSink;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Counters for one category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub requests: u64,
    pub errors: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub total_latency_ns: u64,
    pub min_latency_ns: Option<u64>,
    pub max_latency_ns: Option<u64>,
}

impl CategoryStats {
    fn record(&mut self, latency: Duration, bytes_sent: usize, bytes_received: usize, ok: bool) {
        let latency_ns = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.requests += 1;
        if !ok {
            self.errors += 1;
        }
        self.bytes_sent += bytes_sent as u64;
        self.bytes_received += bytes_received as u64;
        self.total_latency_ns = self.total_latency_ns.saturating_add(latency_ns);
        self.min_latency_ns = Some(self.min_latency_ns.map_or(latency_ns, |m| m.min(latency_ns)));
        self.max_latency_ns = Some(self.max_latency_ns.map_or(latency_ns, |m| m.max(latency_ns)));
    }

    fn absorb(&mut self, other: &CategoryStats) {
        self.requests += other.requests;
        self.errors += other.errors;
        self.bytes_sent += other.bytes_sent;
        self.bytes_received += other.bytes_received;
        self.total_latency_ns = self.total_latency_ns.saturating_add(other.total_latency_ns);
        self.min_latency_ns = match (self.min_latency_ns, other.min_latency_ns) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max_latency_ns = match (self.max_latency_ns, other.max_latency_ns) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    pub fn successes(&self) -> u64 {
        self.requests - self.errors
    }

    pub fn mean_latency(&self) -> Duration {
        if self.requests == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.total_latency_ns / self.requests)
    }

    pub fn min_latency(&self) -> Option<Duration> {
        self.min_latency_ns.map(Duration::from_nanos)
    }

    pub fn max_latency(&self) -> Option<Duration> {
        self.max_latency_ns.map(Duration::from_nanos)
    }
}

/// Collector keyed by category label, ordered for stable output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStatsCollector {
    categories: BTreeMap<String, CategoryStats>,
}

impl CategoryStatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge collectors from different threads
    pub fn merge(collectors: Vec<CategoryStatsCollector>) -> Self {
        let mut merged = CategoryStatsCollector::new();
        for collector in collectors {
            for (category, stats) in collector.categories {
                merged.categories.entry(category).or_default().absorb(&stats);
            }
        }
        merged
    }

    pub fn get(&self, category: &str) -> Option<&CategoryStats> {
        self.categories.get(category)
    }

    pub fn categories(&self) -> impl Iterator<Item = (&str, &CategoryStats)> {
        self.categories.iter().map(|(name, stats)| (name.as_str(), stats))
    }

    /// Requests whose category starts with `prefix` (e.g. all `SCAN ...` rows)
    pub fn count_with_prefix(&self, prefix: &str) -> u64 {
        self.categories
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(_, stats)| stats.requests)
            .sum()
    }

    /// Totals across every category
    pub fn totals(&self) -> CategoryStats {
        let mut total = CategoryStats::default();
        for stats in self.categories.values() {
            total.absorb(stats);
        }
        total
    }

    pub fn total_requests(&self) -> u64 {
        self.categories.values().map(|s| s.requests).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

impl StatsSink for CategoryStatsCollector {
    fn record(
        &mut self,
        category: &str,
        latency: Duration,
        bytes_sent: usize,
        bytes_received: usize,
        success: bool,
    ) {
        // Avoid allocating a key for categories already seen
        match self.categories.get_mut(category) {
            Some(stats) => stats.record(latency, bytes_sent, bytes_received, success),
            None => {
                let mut stats = CategoryStats::default();
                stats.record(latency, bytes_sent, bytes_received, success);
                self.categories.insert(category.to_string(), stats);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_per_category() {
        let mut stats = CategoryStatsCollector::new();
        stats.record("GET", Duration::from_micros(10), 10, 5, true);
        stats.record("GET", Duration::from_micros(30), 10, 5, false);
        stats.record("SET", Duration::from_micros(20), 20, 5, true);

        let get = stats.get("GET").unwrap();
        assert_eq!(get.requests, 2);
        assert_eq!(get.errors, 1);
        assert_eq!(get.successes(), 1);
        assert_eq!(get.mean_latency(), Duration::from_micros(20));
        assert_eq!(get.min_latency(), Some(Duration::from_micros(10)));
        assert_eq!(get.max_latency(), Some(Duration::from_micros(30)));
        assert_eq!(stats.total_requests(), 3);
        assert_eq!(stats.totals().bytes_sent, 40);
    }

    #[test]
    fn test_merge_threads() {
        let mut a = CategoryStatsCollector::new();
        a.record("SCAN 0", Duration::from_micros(5), 1, 1, true);
        let mut b = CategoryStatsCollector::new();
        b.record("SCAN 0", Duration::from_micros(1), 1, 1, true);
        b.record("SCAN <cursor>", Duration::from_micros(9), 1, 1, true);

        let merged = CategoryStatsCollector::merge(vec![a, b]);
        assert_eq!(merged.get("SCAN 0").unwrap().requests, 2);
        assert_eq!(merged.get("SCAN 0").unwrap().min_latency_ns, Some(1_000));
        assert_eq!(merged.count_with_prefix("SCAN "), 3);
        let names: Vec<&str> = merged.categories().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["SCAN 0", "SCAN <cursor>"]);
    }

    #[test]
    fn test_empty_mean_is_zero() {
        assert_eq!(CategoryStats::default().mean_latency(), Duration::ZERO);
        assert!(CategoryStatsCollector::new().is_empty());
    }
}
