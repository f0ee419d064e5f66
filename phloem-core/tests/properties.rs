//! Property tests for key generation, replay parsing/selection, placeholders and reconnection

use phloem_core::command::{
    ParsedCommand, ReplayPattern, ReplaySelector, ReplaySource, ReplayTarget, TrafficLog,
};
use phloem_core::error::{ConfigError, TransportError};
use phloem_core::policy::{ConnectionPolicy, ReconnectConfig};
use phloem_core::seed::RandomStream;
use phloem_core::workload::{ClientPosition, KeyGenerator, KeyPattern, KeyRange};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn key_pattern() -> impl Strategy<Value = KeyPattern> {
    prop_oneof![
        Just(KeyPattern::Sequential),
        Just(KeyPattern::Random),
        Just(KeyPattern::Parallel),
        Just(KeyPattern::Gaussian { stddev: None, median: None }),
        (0.0f64..3.0).prop_map(|exponent| KeyPattern::Zipfian { exponent }),
    ]
}

fn generator(
    pattern: &KeyPattern,
    range: KeyRange,
    client: ClientPosition,
    seed: u64,
) -> KeyGenerator {
    KeyGenerator::new(pattern, range, client, Arc::new(RandomStream::new(seed))).unwrap()
}

/// Share of samples that hit the 10 most frequent keys
fn top10_concentration(exponent: f64) -> f64 {
    let range = KeyRange::new(1, 1000).unwrap();
    let mut keys =
        generator(&KeyPattern::Zipfian { exponent }, range, ClientPosition::new(0, 1), 99);
    let samples = 20_000;
    let mut counts = vec![0u32; 1001];
    for _ in 0..samples {
        counts[keys.next_key() as usize] += 1;
    }
    counts.sort_unstable_by(|a, b| b.cmp(a));
    counts.iter().take(10).sum::<u32>() as f64 / samples as f64
}

#[test]
fn test_zipfian_monotonic_skew() {
    let exponents = [0.2, 0.6, 0.99, 1.5, 2.5];
    let concentrations: Vec<f64> = exponents.iter().map(|&e| top10_concentration(e)).collect();
    for pair in concentrations.windows(2) {
        assert!(pair[0] < pair[1], "concentrations not increasing: {:?}", concentrations);
    }
}

/// Log line that parses
fn valid_line() -> impl Strategy<Value = String> {
    ("[A-Z]{1,6}", prop::collection::vec("[a-z0-9]{0,6}", 0..4)).prop_map(|(verb, args)| {
        let mut line = format!("1764031576.604009 [0 127.0.0.1:5000] \"{verb}\"");
        for arg in args {
            line.push_str(&format!(" \"{arg}\""));
        }
        line
    })
}

/// Log line that is skipped
fn malformed_line() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("OK".to_string()),
        "[a-z]{1,8}".prop_map(|verb| format!("\"{verb}\" \"unterminated")),
        "[a-z]{1,8}".prop_map(|verb| format!("\"{verb}\"garbage")),
        Just("1764031576.604009 [0 127.0.0.1:5000] \"\"".to_string()),
    ]
}

proptest! {
    #[test]
    fn prop_keys_stay_in_range(
        minimum in 0u64..1_000_000,
        span in 16u64..10_000,
        pattern in key_pattern(),
        clients in 1usize..8,
        seed in any::<u64>(),
    ) {
        let range = KeyRange::new(minimum, minimum + span).unwrap();
        for index in 0..clients {
            let mut keys = generator(&pattern, range, ClientPosition::new(index, clients), seed);
            for _ in 0..200 {
                let key = keys.next_key();
                prop_assert!(range.contains(key), "{} outside {:?}", key, range);
            }
        }
    }

    #[test]
    fn prop_same_seed_same_keys(pattern in key_pattern(), seed in any::<u64>()) {
        let range = KeyRange::new(1, 5000).unwrap();
        let client = ClientPosition::new(0, 1);
        let mut a = generator(&pattern, range, client, seed);
        let mut b = generator(&pattern, range, client, seed);
        for _ in 0..100 {
            prop_assert_eq!(a.next_key(), b.next_key());
        }
    }

    #[test]
    fn prop_parallel_partitions_disjoint(clients in 2usize..32, extra in 0u64..500) {
        let range = KeyRange::new(10, 10 + clients as u64 + extra).unwrap();
        let mut seen = HashSet::new();
        let mut covered = 0u128;
        for index in 0..clients {
            let part = range.partition(index, clients).unwrap();
            covered += part.span();
            let mut keys = generator(
                &KeyPattern::Parallel,
                range,
                ClientPosition::new(index, clients),
                0,
            );
            for _ in 0..part.span() {
                let key = keys.next_key();
                prop_assert!(part.contains(key));
                prop_assert!(seen.insert(key), "key {} generated by two clients", key);
            }
        }
        prop_assert_eq!(covered, range.span());
    }

    #[test]
    fn prop_skipped_lines_not_addressable(
        lines in prop::collection::vec(
            prop_oneof![
                valid_line().prop_map(|l| (l, true)),
                malformed_line().prop_map(|l| (l, false)),
            ],
            1..40,
        )
    ) {
        let content: String = lines.iter().map(|(line, _)| format!("{line}\n")).collect();
        let log = TrafficLog::parse(content.as_bytes());
        let valid = lines.iter().filter(|(_, ok)| *ok).count();

        prop_assert_eq!(log.total_lines(), lines.len());
        prop_assert_eq!(log.len(), valid);
        prop_assert_eq!(log.skipped_lines(), lines.len() - valid);
        prop_assert!(log.entry(valid as u32 + 1).is_none());
    }

    #[test]
    fn prop_sequential_replay_wraps(len in 1usize..20, requests in 1usize..100) {
        let content: String = (1..=len).map(|i| format!("\"GET\" \"k{i}\"\n")).collect();
        let log = Arc::new(TrafficLog::parse(content.as_bytes()));
        let source =
            ReplaySource::new(log, ReplayPattern::Sequential, Arc::new(RandomStream::new(0)))
                .unwrap();
        for j in 1..=requests {
            let entry = source.resolve(ReplayTarget::Runtime);
            prop_assert_eq!(entry.line_number as usize, (j - 1) % len + 1);
        }
    }

    #[test]
    fn prop_literal_index_ignores_pattern(
        len in 1usize..20,
        pick in 0usize..20,
        random in any::<bool>(),
    ) {
        let index = (pick % len) as u32 + 1;
        let content: String = (1..=len).map(|i| format!("\"GET\" \"k{i}\"\n")).collect();
        let pattern = if random { ReplayPattern::Random } else { ReplayPattern::Sequential };
        let log = Arc::new(TrafficLog::parse(content.as_bytes()));
        let source = ReplaySource::new(log, pattern, Arc::new(RandomStream::new(5))).unwrap();
        let target = source.target(ReplaySelector::LiteralIndex(index)).unwrap();
        for _ in 0..10 {
            prop_assert_eq!(source.resolve(target).line_number, index);
        }
    }

    #[test]
    fn prop_random_replay_reproducible(seed in any::<u64>()) {
        let content: String = (1..=10).map(|i| format!("\"GET\" \"k{i}\"\n")).collect();
        let log = Arc::new(TrafficLog::parse(content.as_bytes()));
        let stream = || Arc::new(RandomStream::new(seed));
        let a = ReplaySource::new(log.clone(), ReplayPattern::Random, stream()).unwrap();
        let b = ReplaySource::new(log, ReplayPattern::Random, stream()).unwrap();
        for _ in 0..50 {
            prop_assert_eq!(
                a.resolve(ReplayTarget::Runtime).line_number,
                b.resolve(ReplayTarget::Runtime).line_number
            );
        }
    }

    #[test]
    fn prop_fatal_after_max_attempts(attempts in 1u32..12) {
        let config = ReconnectConfig {
            enabled: true,
            max_attempts: attempts,
            base_delay: Duration::from_micros(1),
            ..Default::default()
        };
        let mut policy = ConnectionPolicy::new(0, config, None, 0);
        policy.on_transport_error(0, &TransportError::Closed);

        let mut now = 0;
        let mut made = 0;
        while let Some(at) = policy.ready_at(now) {
            now = at;
            prop_assert!(policy.needs_reconnect(now));
            policy.on_reconnect_result(now, false);
            made += 1;
            prop_assert!(made <= attempts);
        }
        prop_assert_eq!(made, attempts);
        prop_assert!(policy.is_fatal());
    }

    #[test]
    fn prop_malformed_placeholder_depends_on_log(
        prefix in prop_oneof![Just("__monitor_line"), Just("__monitor_c")],
        body in prop_oneof![
            "[a-z]{1,4}__",
            "[0-9]{1,3}",
            "[0-9]{1,3}_",
            "[0-9]{1,3}__[a-z]{1,3}",
            Just("@".to_string()),
            Just("__".to_string()),
        ],
    ) {
        let token = format!("{prefix}{body}");
        let with_log = ParsedCommand::parse(&token, true);
        prop_assert!(
            matches!(with_log, Err(ConfigError::InvalidMonitorPlaceholder(_))),
            "{} accepted: {:?}", token, with_log
        );

        let command = format!("SET {token} value");
        let without_log = ParsedCommand::parse(&command, false);
        prop_assert!(matches!(without_log, Ok(ParsedCommand::Static(_))));
    }
}
