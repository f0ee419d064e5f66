//! Monitor placeholder grammar
//!
//! A command consisting of a single monitor placeholder is replaced at draw time with a command
//! taken from the traffic log:
//! - `__monitor_line<digits>__` / `__monitor_c<digits>__`: always the given (1-based) command
//! - `__monitor_line@__` / `__monitor_c@__`: chosen at run time (sequential or random)
//!
//! Tokens are classified once while the configuration is validated, never per request.

/// Recognized monitor placeholder prefixes
const PREFIXES: [&str; 2] = ["__monitor_line", "__monitor_c"];

/// How a replay placeholder picks its traffic-log command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaySelector {
    /// Always the `n`th loaded command (1-based)
    LiteralIndex(u32),
    /// Chosen at run time according to the configured replay pattern
    Runtime,
}

/// Classification of one template token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    /// Ordinary command content
    Literal,
    /// Well-formed monitor placeholder
    Monitor(ReplaySelector),
    /// Carries a monitor prefix but does not follow the grammar
    Malformed,
}

/// Classify a single whitespace-separated template token
pub fn classify_placeholder(token: &str) -> TokenClass {
    if !PREFIXES.iter().any(|prefix| token.contains(prefix)) {
        return TokenClass::Literal;
    }

    let Some(rest) = PREFIXES.iter().find_map(|prefix| token.strip_prefix(prefix)) else {
        return TokenClass::Malformed;
    };
    let Some(body) = rest.strip_suffix("__") else {
        return TokenClass::Malformed;
    };

    if body == "@" {
        return TokenClass::Monitor(ReplaySelector::Runtime);
    }
    if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
        return TokenClass::Malformed;
    }
    match body.parse::<u32>() {
        Ok(index) => TokenClass::Monitor(ReplaySelector::LiteralIndex(index)),
        Err(_) => TokenClass::Malformed,
    }
}
