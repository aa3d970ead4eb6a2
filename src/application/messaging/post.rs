//! Per-frame message post - read-only inbound view, append-only outbound queue

use crate::domain::entities::{ChannelRef, GatewayAction, InboundMessage, OutboundMessage, ReactionEvent};

/// Something the flush step hands to the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Message(OutboundMessage),
    Action(GatewayAction),
}

impl Outbound {
    pub fn as_message(&self) -> Option<&OutboundMessage> {
        match self {
            Outbound::Message(m) => Some(m),
            Outbound::Action(_) => None,
        }
    }
}

pub struct MessagePost<'a> {
    received: &'a [InboundMessage],
    reactions: &'a [ReactionEvent],
    outbound: &'a mut Vec<Outbound>,
}

impl<'a> MessagePost<'a> {
    pub fn new(received: &'a [InboundMessage], reactions: &'a [ReactionEvent], outbound: &'a mut Vec<Outbound>) -> Self {
        Self {
            received,
            reactions,
            outbound,
        }
    }

    /// Messages buffered for this frame
    pub fn received(&self) -> &'a [InboundMessage] {
        self.received
    }

    /// Reactions buffered for this frame
    pub fn reactions(&self) -> &'a [ReactionEvent] {
        self.reactions
    }

    pub fn send(&mut self, channel: &ChannelRef, text: impl Into<String>) {
        self.push(OutboundMessage::new(channel.clone(), text));
    }

    pub fn reply(&mut self, to: &InboundMessage, text: impl Into<String>) {
        self.push(OutboundMessage::reply(to, text));
    }

    pub fn reply_with_suffix(&mut self, to: &InboundMessage, text: impl Into<String>, suffix: impl Into<String>) {
        self.push(OutboundMessage::reply(to, text).with_suffix(suffix));
    }

    pub fn push(&mut self, message: OutboundMessage) {
        self.outbound.push(Outbound::Message(message));
    }

    pub fn act(&mut self, action: GatewayAction) {
        self.outbound.push(Outbound::Action(action));
    }

    pub fn queued(&self) -> usize {
        self.outbound.len()
    }
}
