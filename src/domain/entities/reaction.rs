use super::message::{ChannelRef, MessageId};
use super::user::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emoji {
    /// Unicode codepoints for standard emoji, the short name for custom ones
    pub name: String,
    pub id: Option<u64>,
}

impl Emoji {
    pub fn unicode(name: impl Into<String>) -> Self {
        Self { name: name.into(), id: None }
    }
}

/// Reaction added to or removed from a message. Lives for a single frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    pub channel: ChannelRef,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub emoji: Emoji,
    pub added: bool,
}
