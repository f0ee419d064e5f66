//! Traffic log replay
//!
//! A traffic log is a capture of the server's monitor stream, one command per line:
//!
//! ```text
//! [ proxy49 ] 1764031576.604009 [0 172.16.10.147:51682] "SET" "key1" "value1"
//! 1764031576.603223 [0 127.0.0.1:39564] "GET" "key1"
//! ```
//!
//! Everything before the first double quote (proxy tag, timestamp, client block) is ignored.
//! Arguments are double-quoted with backslash escapes (`\" \\ \n \r \t \a \b \xHH`). Lines
//! that cannot be parsed are skipped with a warning and are not addressable.

use super::placeholder::ReplaySelector;
use crate::error::{ConfigError, Error, Result};
use crate::seed::RandomStream;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One parsed traffic-log command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficLogEntry {
    /// Source line number (1-based)
    pub line_number: u32,
    pub verb: String,
    pub arguments: Vec<Vec<u8>>,
}

impl TrafficLogEntry {
    /// Verb followed by arguments, ready to send
    pub fn to_args(&self) -> Vec<Vec<u8>> {
        let mut args = Vec::with_capacity(self.arguments.len() + 1);
        args.push(self.verb.as_bytes().to_vec());
        args.extend(self.arguments.iter().cloned());
        args
    }
}

/// Why a log line was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    /// No quoted command on the line
    NoPayload,
    /// A quoted argument is never closed
    Unterminated,
    /// Characters after a closing quote that do not start a new argument
    TrailingGarbage,
    /// The command verb is the empty string
    EmptyVerb,
    /// The command verb is not valid UTF-8
    NonUtf8Verb,
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineError::NoPayload => write!(f, "no quoted command"),
            LineError::Unterminated => write!(f, "unterminated quoted argument"),
            LineError::TrailingGarbage => write!(f, "unexpected text after quoted argument"),
            LineError::EmptyVerb => write!(f, "empty command verb"),
            LineError::NonUtf8Verb => write!(f, "command verb is not valid UTF-8"),
        }
    }
}

/// Parsed traffic log: read-only after parse, shared by every connection
#[derive(Debug, Clone, Default)]
pub struct TrafficLog {
    entries: Vec<TrafficLogEntry>,
    total_lines: usize,
}

impl TrafficLog {
    /// Parse a whole log; malformed lines are skipped
    pub fn parse(content: &[u8]) -> Self {
        let mut lines: Vec<&[u8]> = content.split(|b| *b == b'\n').collect();
        if lines.last().is_some_and(|last| last.is_empty()) {
            lines.pop();
        }

        let mut entries = Vec::with_capacity(lines.len());
        for (idx, &line) in lines.iter().enumerate() {
            let line_number = u32::try_from(idx + 1).unwrap_or(u32::MAX);
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            match parse_line(line) {
                Ok((verb, arguments)) => {
                    entries.push(TrafficLogEntry { line_number, verb, arguments })
                }
                Err(reason) => {
                    tracing::warn!("Skipping monitor line {}: {}", line_number, reason);
                }
            }
        }

        Self { entries, total_lines: lines.len() }
    }

    /// Read and parse a log file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read(path)?;
        let log = Self::parse(&content);
        tracing::info!(
            "Loaded {} monitor commands from {} total lines",
            log.len(),
            log.total_lines()
        );
        if log.is_empty() {
            return Err(Error::Config(ConfigError::EmptyTrafficLog(path.display().to_string())));
        }
        Ok(log)
    }

    /// The `index`th addressable command (1-based)
    pub fn entry(&self, index: u32) -> Option<&TrafficLogEntry> {
        let idx = usize::try_from(index).ok()?.checked_sub(1)?;
        self.entries.get(idx)
    }

    pub fn entries(&self) -> &[TrafficLogEntry] {
        &self.entries
    }

    /// Number of addressable commands
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of lines read, including skipped ones
    pub fn total_lines(&self) -> usize {
        self.total_lines
    }

    pub fn skipped_lines(&self) -> usize {
        self.total_lines - self.entries.len()
    }
}

fn parse_line(line: &[u8]) -> std::result::Result<(String, Vec<Vec<u8>>), LineError> {
    let start = line.iter().position(|b| *b == b'"').ok_or(LineError::NoPayload)?;
    let mut rest = &line[start..];
    let mut args: Vec<Vec<u8>> = Vec::new();

    loop {
        rest = trim_start(rest);
        match rest.first() {
            None => break,
            Some(b'"') => {
                let (arg, after) = parse_quoted(&rest[1..])?;
                if after.first().is_some_and(|b| !b.is_ascii_whitespace()) {
                    return Err(LineError::TrailingGarbage);
                }
                args.push(arg);
                rest = after;
            }
            Some(_) => return Err(LineError::TrailingGarbage),
        }
    }

    let mut args = args.into_iter();
    let verb = args.next().ok_or(LineError::NoPayload)?;
    if verb.is_empty() {
        return Err(LineError::EmptyVerb);
    }
    let verb = String::from_utf8(verb).map_err(|_| LineError::NonUtf8Verb)?;
    Ok((verb, args.collect()))
}

fn trim_start(bytes: &[u8]) -> &[u8] {
    let skip = bytes.iter().take_while(|b| b.is_ascii_whitespace()).count();
    &bytes[skip..]
}

/// Parse one quoted argument body; `input` starts right after the opening quote
fn parse_quoted(input: &[u8]) -> std::result::Result<(Vec<u8>, &[u8]), LineError> {
    let mut out = Vec::new();
    let mut i = 0;

    while i < input.len() {
        match input[i] {
            b'"' => return Ok((out, &input[i + 1..])),
            b'\\' => {
                let escaped = *input.get(i + 1).ok_or(LineError::Unterminated)?;
                i += 2;
                match escaped {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'a' => out.push(0x07),
                    b'b' => out.push(0x08),
                    b'x' => match input.get(i..i + 2).and_then(parse_hex_pair) {
                        Some(byte) => {
                            out.push(byte);
                            i += 2;
                        }
                        None => out.push(b'x'),
                    },
                    other => out.push(other),
                }
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }

    Err(LineError::Unterminated)
}

fn parse_hex_pair(pair: &[u8]) -> Option<u8> {
    let text = std::str::from_utf8(pair).ok()?;
    u8::from_str_radix(text, 16).ok()
}

/// Runtime selection among traffic-log commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum ReplayPattern {
    /// Commands 1, 2, ..., L, 1, ... across all connections
    #[default]
    Sequential,
    /// Uniform over the loaded commands
    Random,
}

/// Validated replay placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayTarget {
    /// Position in the loaded commands (0-based)
    Fixed(usize),
    Runtime,
}

/// Resolves replay placeholders against a loaded log
#[derive(Debug)]
pub struct ReplaySource {
    log: Arc<TrafficLog>,
    pattern: ReplayPattern,
    /// Shared sequential cursor
    next: AtomicU64,
    stream: Arc<RandomStream>,
}

impl ReplaySource {
    pub fn new(
        log: Arc<TrafficLog>,
        pattern: ReplayPattern,
        stream: Arc<RandomStream>,
    ) -> std::result::Result<Self, ConfigError> {
        if log.is_empty() {
            return Err(ConfigError::EmptyTrafficLog("<traffic log>".to_string()));
        }
        Ok(Self { log, pattern, next: AtomicU64::new(0), stream })
    }

    /// Check a selector against the loaded commands
    pub fn target(
        &self,
        selector: ReplaySelector,
    ) -> std::result::Result<ReplayTarget, ConfigError> {
        match selector {
            ReplaySelector::Runtime => Ok(ReplayTarget::Runtime),
            ReplaySelector::LiteralIndex(index) => match self.log.entry(index) {
                Some(_) => Ok(ReplayTarget::Fixed(index as usize - 1)),
                None => {
                    Err(ConfigError::ReplayIndexOutOfRange { index, available: self.log.len() })
                }
            },
        }
    }

    /// Resolve a validated target to a log command
    pub fn resolve(&self, target: ReplayTarget) -> &TrafficLogEntry {
        let entries = self.log.entries();
        let idx = match target {
            ReplayTarget::Fixed(idx) => idx,
            ReplayTarget::Runtime => {
                let len = entries.len() as u64;
                let idx = match self.pattern {
                    ReplayPattern::Sequential => self.next.fetch_add(1, Ordering::Relaxed) % len,
                    ReplayPattern::Random => self.stream.draw(|rng| rng.random_range(0..len)),
                };
                idx as usize
            }
        };
        &entries[idx]
    }

    pub fn log(&self) -> &TrafficLog {
        &self.log
    }

    pub fn pattern(&self) -> ReplayPattern {
        self.pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = concat!(
        "[ proxy49 ] 1764031576.604009 [0 172.16.10.147:51682] \"SET\" \"key1\" \"value1\"\n",
        "[ proxy47 ] 1764031576.603223 [0 172.16.10.147:39564] \"GET\" \"key1\"\n",
        "[ proxy48 ] 1764031576.605123 [0 172.16.10.147:41234] \"HSET\" \"myhash\" ",
        "\"field1\" \"value1\"\n",
        "[ proxy50 ] 1764031576.606456 [0 172.16.10.147:42567] \"LPUSH\" \"mylist\" \"item1\"\n",
        "[ proxy51 ] 1764031576.607789 [0 172.16.10.147:43890] \"SADD\" \"myset\" \"member1\"\n",
    );

    fn source(content: &str, pattern: ReplayPattern) -> ReplaySource {
        let log = Arc::new(TrafficLog::parse(content.as_bytes()));
        ReplaySource::new(log, pattern, Arc::new(RandomStream::new(3))).unwrap()
    }

    #[test]
    fn test_parse_monitor_lines() {
        let log = TrafficLog::parse(SAMPLE.as_bytes());
        assert_eq!(log.len(), 5);
        assert_eq!(log.total_lines(), 5);

        let first = log.entry(1).unwrap();
        assert_eq!(first.verb, "SET");
        assert_eq!(first.arguments, vec![b"key1".to_vec(), b"value1".to_vec()]);
        assert_eq!(log.entry(3).unwrap().verb, "HSET");
        assert!(log.entry(0).is_none());
        assert!(log.entry(6).is_none());
    }

    #[test]
    fn test_parse_without_prefix() {
        let log = TrafficLog::parse(b"1.0 [0 127.0.0.1:1] \"PING\"\n\"ECHO\" \"hi\"");
        assert_eq!(log.len(), 2);
        assert_eq!(log.entry(2).unwrap().to_args(), vec![b"ECHO".to_vec(), b"hi".to_vec()]);
    }

    #[test]
    fn test_escapes() {
        let log = TrafficLog::parse(br#""SET" "a\"b" "c\\d" "\x41\n" "\t\r""#);
        let entry = log.entry(1).unwrap();
        assert_eq!(
            entry.arguments,
            vec![b"a\"b".to_vec(), b"c\\d".to_vec(), b"A\n".to_vec(), b"\t\r".to_vec()]
        );
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let content = concat!(
            "\"SET\" \"k\" \"v\"\n",
            "\"GET\" \"unterminated\n",
            "OK\n",
            "\n",
            "\"\" \"empty verb\"\n",
            "\"DEL\"x \"k\"\n",
            "\"GET\" \"k\"\r\n",
        );
        let log = TrafficLog::parse(content.as_bytes());
        assert_eq!(log.total_lines(), 7);
        assert_eq!(log.len(), 2);
        assert_eq!(log.skipped_lines(), 5);
        assert_eq!(log.entry(2).unwrap().line_number, 7);
        assert_eq!(log.entry(2).unwrap().arguments, vec![b"k".to_vec()]);
    }

    #[test]
    fn test_line_errors() {
        assert_eq!(parse_line(b"no quotes here"), Err(LineError::NoPayload));
        assert_eq!(parse_line(b"\"GET\" \"k"), Err(LineError::Unterminated));
        assert_eq!(parse_line(b"\"GET\" k"), Err(LineError::TrailingGarbage));
        assert_eq!(parse_line(b"\"\""), Err(LineError::EmptyVerb));
        assert_eq!(parse_line(b"\"G\\xffT\" \"k\""), Err(LineError::NonUtf8Verb));
    }

    #[test]
    fn test_binary_arguments_kept_verbatim() {
        let log = TrafficLog::parse(&b"\"GET\" \"\\xff\\x00k\"\n\"S\\xe9T\" \"k\"\n"[..]);
        assert_eq!(log.len(), 1);
        assert_eq!(log.skipped_lines(), 1);
        assert_eq!(log.entry(1).unwrap().arguments, vec![vec![0xff, 0x00, b'k']]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let log = TrafficLog::load(file.path()).unwrap();
        assert_eq!(log.len(), 5);
    }

    #[test]
    fn test_load_empty_file_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"OK\n\n").unwrap();
        assert!(matches!(
            TrafficLog::load(file.path()),
            Err(Error::Config(ConfigError::EmptyTrafficLog(_)))
        ));
    }

    #[test]
    fn test_literal_index_always_same() {
        let replay = source(SAMPLE, ReplayPattern::Random);
        let target = replay.target(ReplaySelector::LiteralIndex(4)).unwrap();
        for _ in 0..20 {
            assert_eq!(replay.resolve(target).verb, "LPUSH");
        }
    }

    #[test]
    fn test_literal_index_check() {
        let replay = source(SAMPLE, ReplayPattern::Sequential);
        assert_eq!(replay.target(ReplaySelector::LiteralIndex(5)), Ok(ReplayTarget::Fixed(4)));
        assert_eq!(
            replay.target(ReplaySelector::LiteralIndex(6)),
            Err(ConfigError::ReplayIndexOutOfRange { index: 6, available: 5 })
        );
        assert!(replay.target(ReplaySelector::LiteralIndex(0)).is_err());
    }

    #[test]
    fn test_sequential_wraps() {
        let replay = source(SAMPLE, ReplayPattern::Sequential);
        let verbs: Vec<String> = (0..7)
            .map(|_| replay.resolve(ReplayTarget::Runtime).verb.clone())
            .collect();
        assert_eq!(verbs, vec!["SET", "GET", "HSET", "LPUSH", "SADD", "SET", "GET"]);
    }

    #[test]
    fn test_empty_log_rejected() {
        let log = Arc::new(TrafficLog::parse(b"OK\n"));
        let stream = Arc::new(RandomStream::new(3));
        assert!(ReplaySource::new(log, ReplayPattern::Sequential, stream).is_err());
    }

    #[test]
    fn test_random_deterministic() {
        let a = source(SAMPLE, ReplayPattern::Random);
        let b = source(SAMPLE, ReplayPattern::Random);
        let xs: Vec<u32> =
            (0..50).map(|_| a.resolve(ReplayTarget::Runtime).line_number).collect();
        let ys: Vec<u32> =
            (0..50).map(|_| b.resolve(ReplayTarget::Runtime).line_number).collect();
        assert_eq!(xs, ys);
        let distinct: std::collections::HashSet<u32> = xs.into_iter().collect();
        assert!(distinct.len() >= 2);
    }
}
