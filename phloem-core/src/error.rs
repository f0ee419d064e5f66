use std::fmt;

/// Result type alias for phloem core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for phloem core operations
#[derive(Debug)]
pub enum Error {
    /// I/O errors (reading a traffic log, etc.)
    Io(std::io::Error),

    /// Configuration rejected before any request was issued
    Config(ConfigError),

    /// Transport-level failure on a single request
    Transport(TransportError),

    /// Connection terminated (reconnection disabled or attempts exhausted)
    Connection(String),

    /// Other errors
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Config(e) => write!(f, "Configuration error: {e}"),
            Error::Transport(e) => write!(f, "Transport error: {e}"),
            Error::Connection(msg) => write!(f, "Connection error: {msg}"),
            Error::Other(msg) => write!(f, "Error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Config(e) => Some(e),
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Transport(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

/// Configuration errors, all detected before the run starts
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Key range with minimum > maximum
    InvertedKeyRange { minimum: u64, maximum: u64 },
    /// Parallel pattern cannot give every client a non-empty partition
    ParallelRangeTooSmall { range_len: u64, clients: usize },
    /// Zipfian exponent that is negative or not finite
    InvalidZipfExponent(f64),
    /// Gaussian parameters that cannot produce a distribution
    InvalidGaussian(String),
    /// No commands configured
    EmptyCommandSet,
    /// Ratio vector that cannot be drawn from (all zero)
    InvalidRatio(String),
    /// Command template with no tokens
    EmptyTemplate,
    /// Token carrying the monitor prefix that does not follow the placeholder grammar
    InvalidMonitorPlaceholder(String),
    /// Monitor placeholder mixed with other tokens in one command
    MonitorPlaceholderNotAlone(String),
    /// Runtime-pattern monitor placeholder used without a traffic log
    MonitorPlaceholderWithoutLog(String),
    /// Literal replay index outside the addressable log lines
    ReplayIndexOutOfRange { index: u32, available: usize },
    /// Traffic log with no usable lines
    EmptyTrafficLog(String),
    /// Cursor iteration enabled without an explicitly configured command
    ScanWithoutCommand,
    /// Cursor iteration enabled but no configured command carries a literal `0` cursor
    ScanCommandNotCursorBearing(String),
    /// Cursor iteration requires pipeline depth 1
    ScanPipelineDepth(usize),
    /// Pipeline depth of zero
    InvalidPipelineDepth,
    /// Rate limit that is zero, negative, or not finite
    InvalidRateLimit(f64),
    /// Reconnect settings that cannot be honored
    InvalidReconnect(String),
    /// Both or neither of request count and duration
    RunLimitConflict(String),
    /// Zero threads or zero clients per thread
    InvalidClients(String),
    /// Value size settings that cannot be honored
    InvalidValueSize(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvertedKeyRange { minimum, maximum } => {
                write!(f, "key-minimum ({minimum}) must be <= key-maximum ({maximum})")
            }
            ConfigError::ParallelRangeTooSmall { range_len, clients } => write!(
                f,
                "parallel key pattern needs at least one key per client: \
                 {range_len} keys for {clients} clients"
            ),
            ConfigError::InvalidZipfExponent(exp) => {
                write!(f, "zipfian exponent must be a finite value >= 0, got {exp}")
            }
            ConfigError::InvalidGaussian(msg) => write!(f, "invalid gaussian key pattern: {msg}"),
            ConfigError::EmptyCommandSet => write!(f, "at least one command must be configured"),
            ConfigError::InvalidRatio(msg) => write!(f, "invalid command ratio: {msg}"),
            ConfigError::EmptyTemplate => write!(f, "command template is empty"),
            ConfigError::InvalidMonitorPlaceholder(token) => {
                write!(f, "invalid monitor placeholder '{token}'")
            }
            ConfigError::MonitorPlaceholderNotAlone(cmd) => {
                write!(f, "monitor placeholder must be the whole command, got '{cmd}'")
            }
            ConfigError::MonitorPlaceholderWithoutLog(token) => {
                write!(f, "monitor placeholder '{token}' requires a monitor input file")
            }
            ConfigError::ReplayIndexOutOfRange { index, available } => write!(
                f,
                "monitor line {index} is out of range: {available} usable commands loaded"
            ),
            ConfigError::EmptyTrafficLog(path) => {
                write!(f, "monitor input '{path}' contains no usable commands")
            }
            ConfigError::ScanWithoutCommand => {
                write!(f, "scan incremental iteration requires an explicit command")
            }
            ConfigError::ScanCommandNotCursorBearing(cmd) => write!(
                f,
                "scan incremental iteration requires a cursor command starting at cursor 0, \
                 got '{cmd}'"
            ),
            ConfigError::ScanPipelineDepth(depth) => write!(
                f,
                "scan incremental iteration requires pipeline depth 1, got {depth}"
            ),
            ConfigError::InvalidPipelineDepth => write!(f, "pipeline depth must be > 0"),
            ConfigError::InvalidRateLimit(rate) => {
                write!(f, "rate limit must be a positive number of requests per second, got {rate}")
            }
            ConfigError::InvalidReconnect(msg) => write!(f, "invalid reconnect settings: {msg}"),
            ConfigError::RunLimitConflict(msg) => write!(f, "{msg}"),
            ConfigError::InvalidClients(msg) => write!(f, "{msg}"),
            ConfigError::InvalidValueSize(msg) => write!(f, "invalid value size: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Failure reported by a transport for one request or connection attempt
#[derive(Debug)]
pub enum TransportError {
    /// Socket-level I/O failure
    Io(std::io::Error),
    /// Peer closed the connection
    Closed,
    /// Response could not be decoded
    Protocol(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "I/O error: {e}"),
            TransportError::Closed => write!(f, "connection closed by peer"),
            TransportError::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display_names_option() {
        let err = Error::from(ConfigError::InvertedKeyRange { minimum: 10, maximum: 1 });
        let msg = err.to_string();
        assert!(msg.starts_with("Configuration error:"));
        assert!(msg.contains("key-minimum (10)"));
    }

    #[test]
    fn test_transport_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: Error = TransportError::from(io).into();
        assert!(matches!(err, Error::Transport(TransportError::Io(_))));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_scan_errors_mention_scan() {
        for err in [
            ConfigError::ScanWithoutCommand,
            ConfigError::ScanCommandNotCursorBearing("GET __key__".to_string()),
            ConfigError::ScanPipelineDepth(4),
        ] {
            assert!(err.to_string().contains("scan"), "{}", err);
        }
    }
}
