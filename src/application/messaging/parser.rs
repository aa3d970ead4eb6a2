//! Command parser - Recognises prefixed free-text commands

use crate::domain::entities::ParsedCommand;

/// Matches a message against an ordered set of literal prefixes and splits
/// the remainder into a command keyword and argument words.
#[derive(Debug, Clone, Default)]
pub struct CommandParser {
    prefixes: Vec<String>,
}

impl CommandParser {
    pub fn new<I, P>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let mut parser = Self::default();
        for prefix in prefixes {
            parser.add_prefix(prefix);
        }
        parser
    }

    /// Register another prefix. Earlier registrations win when several match.
    pub fn add_prefix(&mut self, prefix: impl Into<String>) {
        let prefix = prefix.into();
        if prefix.is_empty() {
            tracing::warn!("Ignoring empty command prefix");
            return;
        }
        if self.prefixes.contains(&prefix) {
            return;
        }
        tracing::debug!("Registered command prefix: {}", prefix);
        self.prefixes.push(prefix);
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Parse `text`, returning `None` when no prefix matches
    pub fn parse(&self, text: &str) -> Option<ParsedCommand> {
        let rest = self
            .prefixes
            .iter()
            .find_map(|prefix| text.strip_prefix(prefix.as_str()))?;

        let mut tokens = tokenize(rest).into_iter();
        match tokens.next() {
            Some(command) => Some(ParsedCommand::new(command, tokens.collect())),
            // nothing but whitespace (or nothing at all) after the prefix
            None => Some(ParsedCommand::new(rest, Vec::new())),
        }
    }

    pub fn is_command(&self, text: &str) -> bool {
        self.prefixes.iter().any(|p| text.starts_with(p.as_str()))
    }
}

/// Split on any Unicode whitespace, dropping empty runs
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push(ch);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
