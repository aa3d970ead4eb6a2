//! Command table - Routes a parsed keyword to its handler

use std::collections::HashMap;

use crate::application::context::ServiceContext;
use crate::application::errors::{BotError, CommandError};
use crate::domain::entities::{InboundMessage, ParsedCommand, Permission};
use crate::services::reply;

/// Handler function type
pub type CommandFn<S> = fn(&mut S, &mut ServiceContext<'_>, &InboundMessage, &ParsedCommand) -> Result<(), BotError>;

/// A keyword command owned by a service of type `S`
pub struct Command<S> {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: Option<String>,
    pub permission: Permission,
    pub denial: Option<String>,
    handler: CommandFn<S>,
}

impl<S> Command<S> {
    pub fn new(name: impl Into<String>, handler: CommandFn<S>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            description: None,
            permission: Permission::Anyone,
            denial: None,
            handler,
        }
    }

    pub fn with_aliases<I, A>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }

    /// Reply used instead of the configured not-permitted text
    pub fn with_denial(mut self, text: impl Into<String>) -> Self {
        self.denial = Some(text.into());
        self
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Keyword to command mapping for one service
pub struct CommandTable<S> {
    commands: Vec<Command<S>>,
    index: HashMap<String, usize>,
}

impl<S> CommandTable<S> {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn with(mut self, command: Command<S>) -> Self {
        self.register(command);
        self
    }

    /// Register a command. A keyword already taken keeps its first owner.
    pub fn register(&mut self, command: Command<S>) {
        let slot = self.commands.len();
        for keyword in command.keywords() {
            if self.index.contains_key(keyword) {
                tracing::warn!("Duplicate command keyword ignored: {}", keyword);
                continue;
            }
            self.index.insert(keyword.to_string(), slot);
        }
        self.commands.push(command);
    }

    pub fn get(&self, keyword: &str) -> Option<&Command<S>> {
        self.index.get(keyword).map(|&i| &self.commands[i])
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.index.contains_key(keyword)
    }

    pub fn all(&self) -> impl Iterator<Item = &Command<S>> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Run the handler for `parsed.command`.
    ///
    /// Returns `Ok(false)` for an unknown keyword. A caller lacking the
    /// command's permission gets the denial reply and the handler is skipped.
    /// A handler failing with [`CommandError::InvalidArgs`] has its hint
    /// replied to the caller instead of being propagated.
    pub fn dispatch(
        &self,
        service: &mut S,
        ctx: &mut ServiceContext<'_>,
        message: &InboundMessage,
        parsed: &ParsedCommand,
    ) -> Result<bool, BotError> {
        let Some(command) = self.get(&parsed.command) else {
            return Ok(false);
        };

        if !ctx.permissions().allows(message.author.id, command.permission) {
            tracing::info!(
                "Command not permitted: {} by {} ({})",
                command.name,
                message.author.username,
                message.author.id
            );
            let text = command
                .denial
                .clone()
                .unwrap_or_else(|| ctx.permissions().not_permitted_message());
            reply(ctx, message, text);
            return Ok(true);
        }

        tracing::debug!("Command: {} with args: {:?}", parsed.command, parsed.arguments);
        match (command.handler)(service, ctx, message, parsed) {
            Err(BotError::Command(CommandError::InvalidArgs(hint))) => {
                tracing::debug!("Command {} rejected its arguments: {}", command.name, hint);
                reply(ctx, message, hint);
                Ok(true)
            }
            Err(e) => Err(e),
            Ok(()) => Ok(true),
        }
    }

    /// Dispatch every buffered non-bot message of the frame.
    ///
    /// A failing handler is logged and the remaining messages still run.
    pub fn dispatch_all(&self, service: &mut S, ctx: &mut ServiceContext<'_>) {
        for message in ctx.received() {
            if message.is_from_bot() {
                continue;
            }
            let Some(parsed) = ctx.parser().parse(&message.content) else {
                continue;
            };
            if let Err(e) = self.dispatch(service, ctx, message, &parsed) {
                tracing::warn!("Command '{}' failed: {}", parsed.command, e);
            }
        }
    }
}

impl<S> Default for CommandTable<S> {
    fn default() -> Self {
        Self::new()
    }
}
