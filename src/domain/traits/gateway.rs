use std::sync::Arc;

use async_trait::async_trait;

use crate::application::errors::BotError;
use crate::domain::entities::{ChannelRef, GatewayAction, Guild, GuildId, InboundMessage, MessageId, ReactionEvent, User};

/// Events raised by a gateway session, possibly from its own I/O threads
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    LoggedIn(User),
    LoggedOut,
    GuildJoined(Guild),
    GuildLeft(GuildId),
    GuildAvailable(Guild),
    MessageReceived(InboundMessage),
    ReactionAdded(ReactionEvent),
    ReactionRemoved(ReactionEvent),
}

impl GatewayEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayEvent::LoggedIn(_) => "logged-in",
            GatewayEvent::LoggedOut => "logged-out",
            GatewayEvent::GuildJoined(_) => "guild-joined",
            GatewayEvent::GuildLeft(_) => "guild-left",
            GatewayEvent::GuildAvailable(_) => "guild-available",
            GatewayEvent::MessageReceived(_) => "message-received",
            GatewayEvent::ReactionAdded(_) => "reaction-added",
            GatewayEvent::ReactionRemoved(_) => "reaction-removed",
        }
    }
}

/// Callback the gateway uses to hand events to the application
pub type EventSink = Arc<dyn Fn(GatewayEvent) + Send + Sync>;

/// Gateway trait - abstraction for the chat service session
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Log in and start delivering events through `events`
    async fn login(&self, token: &str, events: EventSink) -> Result<User, BotError>;

    /// Send a message to a channel
    async fn send_message(&self, channel: &ChannelRef, text: &str) -> Result<MessageId, BotError>;

    /// Perform a role or pin action
    async fn perform(&self, action: &GatewayAction) -> Result<(), BotError>;

    /// End the session
    async fn logout(&self) -> Result<(), BotError>;

    fn name(&self) -> &str;
}
