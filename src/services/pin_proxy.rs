//! Pin proxy - lets anyone pin a message by reacting with 📌

use super::{ApplicationService, ServiceKey};
use crate::application::context::ServiceContext;
use crate::application::errors::BotError;
use crate::domain::entities::GatewayAction;

pub const PIN_EMOJI: &str = "📌";

#[derive(Debug)]
pub struct PinProxyService {
    emoji: String,
}

impl ServiceKey for PinProxyService {
    const ID: &'static str = "pin-proxy";
}

impl Default for PinProxyService {
    fn default() -> Self {
        Self::new()
    }
}

impl PinProxyService {
    pub fn new() -> Self {
        Self {
            emoji: PIN_EMOJI.to_string(),
        }
    }
}

impl ApplicationService for PinProxyService {
    fn update(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), BotError> {
        for reaction in ctx.reactions() {
            if reaction.emoji.name != self.emoji {
                continue;
            }
            let channel = reaction.channel.clone();
            let message_id = reaction.message_id;
            tracing::debug!("Pin toggle on {} by {} (added: {})", message_id, reaction.user_id, reaction.added);
            ctx.post().act(if reaction.added {
                GatewayAction::Pin { channel, message_id }
            } else {
                GatewayAction::Unpin { channel, message_id }
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::context::testing::Harness;
    use crate::domain::entities::{Emoji, ReactionEvent};

    fn reaction(harness: &Harness, emoji: &str, added: bool) -> ReactionEvent {
        ReactionEvent {
            channel: harness.channel(),
            message_id: 77,
            user_id: 5,
            emoji: Emoji::unicode(emoji),
            added,
        }
    }

    #[test]
    fn pin_reactions_toggle_pins() {
        let mut harness = Harness::new();
        harness.reactions.push(reaction(&harness, PIN_EMOJI, true));
        harness.reactions.push(reaction(&harness, "👍", true));
        harness.reactions.push(reaction(&harness, PIN_EMOJI, false));

        PinProxyService::new().update(&mut harness.context()).unwrap();

        let channel = harness.channel();
        assert_eq!(
            harness.actions(),
            vec![
                GatewayAction::Pin {
                    channel: channel.clone(),
                    message_id: 77
                },
                GatewayAction::Unpin { channel, message_id: 77 },
            ]
        );
    }
}
