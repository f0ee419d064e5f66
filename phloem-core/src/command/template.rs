//! Command template engine
//!
//! Supports variable substitution in command templates:
//! - `__key__` - Replaced with `<key_prefix><key>`
//! - `__data__` - Replaced with generated value data
//! - `__value_size__` - Replaced with the value size
//!
//! Templates are split on whitespace into arguments first; a variable may appear anywhere inside
//! an argument (`user:__key__` renders as one argument).

use super::placeholder::{classify_placeholder, ReplaySelector, TokenClass};
use crate::error::ConfigError;
use crate::workload::{KeyGenerator, PayloadGenerator};

/// A parsed static command template
#[derive(Debug, Clone, PartialEq)]
pub struct CommandTemplate {
    /// Original template string
    template: String,
    /// One entry per command argument
    arguments: Vec<Vec<TemplatePart>>,
}

#[derive(Debug, Clone, PartialEq)]
enum TemplatePart {
    /// Literal text to include as-is
    Literal(String),
    /// Variable to substitute
    Variable(Variable),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Variable {
    Key,
    Data,
    ValueSize,
}

impl Variable {
    const ALL: [(Variable, &'static str); 3] = [
        (Variable::Key, "__key__"),
        (Variable::Data, "__data__"),
        (Variable::ValueSize, "__value_size__"),
    ];
}

/// A configured command after placeholder classification
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedCommand {
    Static(CommandTemplate),
    Replay(ReplaySelector),
}

impl ParsedCommand {
    /// Parse a configured command
    ///
    /// With a traffic log configured, a monitor placeholder must be the whole command and any
    /// malformed placeholder is rejected. Without one, malformed placeholders are ordinary
    /// command content but well-formed ones have nothing to resolve against.
    pub fn parse(text: &str, log_configured: bool) -> Result<Self, ConfigError> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(ConfigError::EmptyTemplate);
        }

        for token in &tokens {
            match classify_placeholder(token) {
                TokenClass::Literal => {}
                TokenClass::Malformed if log_configured => {
                    return Err(ConfigError::InvalidMonitorPlaceholder(token.to_string()));
                }
                TokenClass::Malformed => {}
                TokenClass::Monitor(_) if !log_configured => {
                    return Err(ConfigError::MonitorPlaceholderWithoutLog(token.to_string()));
                }
                TokenClass::Monitor(selector) => {
                    if tokens.len() != 1 {
                        return Err(ConfigError::MonitorPlaceholderNotAlone(text.to_string()));
                    }
                    return Ok(ParsedCommand::Replay(selector));
                }
            }
        }

        CommandTemplate::parse(text).map(ParsedCommand::Static)
    }
}

/// Per-render substitution sources
pub struct RenderContext<'a> {
    pub key_prefix: &'a str,
    pub keys: &'a mut KeyGenerator,
    pub payloads: &'a PayloadGenerator,
}

impl CommandTemplate {
    /// Parse a command template string
    ///
    /// # Example
    /// ```
    /// use phloem_core::command::CommandTemplate;
    ///
    /// let template = CommandTemplate::parse("HSET myhash __key__ __data__").unwrap();
    /// assert_eq!(template.verb(), "HSET");
    /// ```
    pub fn parse(template: &str) -> Result<Self, ConfigError> {
        let arguments: Vec<Vec<TemplatePart>> =
            template.split_whitespace().map(Self::parse_argument).collect();

        if arguments.is_empty() {
            return Err(ConfigError::EmptyTemplate);
        }

        Ok(Self { template: template.to_string(), arguments })
    }

    fn parse_argument(token: &str) -> Vec<TemplatePart> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = token;

        while !rest.is_empty() {
            let variable = Variable::ALL
                .iter()
                .find_map(|&(var, name)| rest.strip_prefix(name).map(|after| (var, after)));
            match variable {
                Some((var, after)) => {
                    if !literal.is_empty() {
                        parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(TemplatePart::Variable(var));
                    rest = after;
                }
                None => {
                    let mut chars = rest.chars();
                    if let Some(ch) = chars.next() {
                        literal.push(ch);
                    }
                    rest = chars.as_str();
                }
            }
        }

        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(literal));
        }
        parts
    }

    /// Render the template into command arguments
    ///
    /// Every `__key__` draws a fresh key; `__data__` and `__value_size__` share one payload per
    /// render.
    pub fn render(&self, ctx: &mut RenderContext<'_>) -> Vec<Vec<u8>> {
        let mut payload: Option<Vec<u8>> = None;
        let mut args = Vec::with_capacity(self.arguments.len());

        for argument in &self.arguments {
            let mut arg = Vec::new();
            for part in argument {
                match part {
                    TemplatePart::Literal(lit) => arg.extend_from_slice(lit.as_bytes()),
                    TemplatePart::Variable(Variable::Key) => {
                        let key = ctx.keys.next_key();
                        arg.extend_from_slice(ctx.key_prefix.as_bytes());
                        arg.extend_from_slice(key.to_string().as_bytes());
                    }
                    TemplatePart::Variable(Variable::Data) => {
                        let data = payload.get_or_insert_with(|| ctx.payloads.next_payload());
                        arg.extend_from_slice(data);
                    }
                    TemplatePart::Variable(Variable::ValueSize) => {
                        let data = payload.get_or_insert_with(|| ctx.payloads.next_payload());
                        arg.extend_from_slice(data.len().to_string().as_bytes());
                    }
                }
            }
            args.push(arg);
        }

        args
    }

    /// Command verb as written in the template
    pub fn verb(&self) -> &str {
        self.template.split_whitespace().next().unwrap_or_default()
    }

    /// Whether the template draws keys
    pub fn uses_keys(&self) -> bool {
        self.arguments
            .iter()
            .flatten()
            .any(|part| matches!(part, TemplatePart::Variable(Variable::Key)))
    }

    /// Literal text of argument `index`, if it contains no variables
    pub fn literal_argument(&self, index: usize) -> Option<&str> {
        match self.arguments.get(index)?.as_slice() {
            [TemplatePart::Literal(lit)] => Some(lit),
            _ => None,
        }
    }

    /// Number of arguments (including the verb)
    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    /// Get the original template string
    pub fn template(&self) -> &str {
        &self.template
    }
}
