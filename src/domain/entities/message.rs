use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::guild::GuildId;
use super::user::{mention, User, UserId};

pub type ChannelId = u64;
pub type MessageId = u64;

/// Channel a message arrived on or should be sent to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: ChannelId,
    pub name: String,
    pub guild_id: Option<GuildId>,
}

impl ChannelRef {
    pub fn new(id: ChannelId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            guild_id: None,
        }
    }

    pub fn in_guild(mut self, guild_id: GuildId) -> Self {
        self.guild_id = Some(guild_id);
        self
    }
}

/// File attached to an inbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: u64,
    pub filename: String,
    pub url: String,
}

/// Snapshot of a received message. Lives for a single frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: MessageId,
    pub author: User,
    pub channel: ChannelRef,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub mentions: Vec<UserId>,
}

impl InboundMessage {
    pub fn new(id: MessageId, author: User, channel: ChannelRef, content: impl Into<String>) -> Self {
        Self {
            id,
            author,
            channel,
            timestamp: Utc::now(),
            content: content.into(),
            attachments: Vec::new(),
            mentions: Vec::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_mentions(mut self, mentions: Vec<UserId>) -> Self {
        self.mentions = mentions;
        self
    }

    pub fn mentions_user(&self, id: UserId) -> bool {
        self.mentions.contains(&id)
    }

    pub fn is_from_bot(&self) -> bool {
        self.author.is_bot
    }
}

/// How an outbound message addresses its channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addressing {
    Plain,
    /// Prefixes a mention of the triggering author, optionally followed by a suffix
    Reply { author: UserId, suffix: Option<String> },
}

/// Text queued for delivery to a channel. Fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub channel: ChannelRef,
    pub text: String,
    pub addressing: Addressing,
}

impl OutboundMessage {
    pub fn new(channel: ChannelRef, text: impl Into<String>) -> Self {
        Self {
            channel,
            text: text.into(),
            addressing: Addressing::Plain,
        }
    }

    pub fn reply(to: &InboundMessage, text: impl Into<String>) -> Self {
        Self {
            channel: to.channel.clone(),
            text: text.into(),
            addressing: Addressing::Reply {
                author: to.author.id,
                suffix: None,
            },
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        if let Addressing::Reply { suffix: s, .. } = &mut self.addressing {
            *s = Some(suffix.into());
        }
        self
    }

    /// Final payload as delivered to the gateway
    pub fn render(&self) -> String {
        match &self.addressing {
            Addressing::Plain => self.text.clone(),
            Addressing::Reply { author, suffix: None } => format!("{} {}", mention(*author), self.text),
            Addressing::Reply {
                author,
                suffix: Some(suffix),
            } => format!("{} {} {}", mention(*author), suffix, self.text),
        }
    }

    pub fn is_reply_to(&self, author: UserId) -> bool {
        matches!(self.addressing, Addressing::Reply { author: a, .. } if a == author)
    }
}
