//! Console adapter for development/testing
//!
//! Every line typed on stdin arrives as a message from the configured user in
//! a single synthetic guild. `:react <emoji> <message-id>` and
//! `:unreact <emoji> <message-id>` raise reaction events.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::application::errors::BotError;
use crate::domain::entities::{
    ChannelRef, Emoji, GatewayAction, Guild, GuildId, InboundMessage, MessageId, ReactionEvent, User, UserId,
};
use crate::domain::traits::{EventSink, Gateway, GatewayEvent};

const CONSOLE_GUILD: GuildId = 1;
const CONSOLE_CHANNEL: u64 = 1;

/// Console gateway for local development
pub struct ConsoleAdapter {
    bot: User,
    author: User,
    next_id: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
}

impl ConsoleAdapter {
    pub fn new(bot_name: impl Into<String>, author: UserId) -> Self {
        Self {
            bot: User::new(0, bot_name).as_bot(),
            author: User::new(author, "console"),
            next_id: Arc::new(AtomicU64::new(1)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn guild() -> Guild {
        Guild::new(CONSOLE_GUILD, "console")
            .with_channel(CONSOLE_CHANNEL, "console")
            .with_role(1, "console-club")
    }

    fn channel() -> ChannelRef {
        ChannelRef::new(CONSOLE_CHANNEL, "console").in_guild(CONSOLE_GUILD)
    }

    fn next_id(&self) -> MessageId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

/// Turn one input line into a gateway event
fn parse_line(line: &str, author: &User, id: MessageId) -> Option<GatewayEvent> {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    if line.trim().is_empty() {
        return None;
    }

    let mut words = line.split_whitespace();
    match words.next() {
        Some(verb @ (":react" | ":unreact")) => {
            let emoji = words.next()?;
            let message_id = words.next()?.parse().ok()?;
            let reaction = ReactionEvent {
                channel: ConsoleAdapter::channel(),
                message_id,
                user_id: author.id,
                emoji: Emoji::unicode(emoji),
                added: verb == ":react",
            };
            Some(if reaction.added {
                GatewayEvent::ReactionAdded(reaction)
            } else {
                GatewayEvent::ReactionRemoved(reaction)
            })
        }
        _ => Some(GatewayEvent::MessageReceived(InboundMessage::new(
            id,
            author.clone(),
            ConsoleAdapter::channel(),
            line,
        ))),
    }
}

#[async_trait]
impl Gateway for ConsoleAdapter {
    async fn login(&self, _token: &str, events: EventSink) -> Result<User, BotError> {
        tracing::info!("Starting console gateway (dev mode)");
        self.running.store(true, Ordering::SeqCst);

        events(GatewayEvent::LoggedIn(self.bot.clone()));
        events(GatewayEvent::GuildAvailable(Self::guild()));

        let author = self.author.clone();
        let next_id = Arc::clone(&self.next_id);
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while running.load(Ordering::SeqCst) {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let id = next_id.fetch_add(1, Ordering::SeqCst);
                        if let Some(event) = parse_line(&line, &author, id) {
                            events(event);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Console read failed: {}", e);
                        break;
                    }
                }
            }
            tracing::debug!("Console input closed");
        });

        Ok(self.bot.clone())
    }

    async fn send_message(&self, channel: &ChannelRef, text: &str) -> Result<MessageId, BotError> {
        let id = self.next_id();
        println!("[BOT #{} {}] {}", channel.name, id, text);
        Ok(id)
    }

    async fn perform(&self, action: &GatewayAction) -> Result<(), BotError> {
        println!("[BOT {}] {:?}", action.as_str(), action);
        Ok(())
    }

    async fn logout(&self) -> Result<(), BotError> {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Console gateway stopped");
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_line_is_a_message_from_the_author() {
        let author = User::new(7, "console");
        match parse_line("はるなちゃん、おはよう\n", &author, 3) {
            Some(GatewayEvent::MessageReceived(m)) => {
                assert_eq!(m.content, "はるなちゃん、おはよう");
                assert_eq!(m.author.id, 7);
                assert_eq!(m.id, 3);
                assert_eq!(m.channel.guild_id, Some(CONSOLE_GUILD));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn react_commands_become_reactions() {
        let author = User::new(7, "console");
        match parse_line(":unreact 📌 42", &author, 1) {
            Some(GatewayEvent::ReactionRemoved(r)) => {
                assert_eq!(r.message_id, 42);
                assert_eq!(r.emoji.name, "📌");
                assert!(!r.added);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse_line(":react 📌 nope", &author, 1).is_none());
        assert!(parse_line("   ", &author, 1).is_none());
    }
}
