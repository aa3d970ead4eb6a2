use super::guild::{GuildId, RoleId};
use super::message::{ChannelRef, MessageId};
use super::user::UserId;

/// Non-message side effect requested from the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayAction {
    AddRole { guild_id: GuildId, user_id: UserId, role_id: RoleId },
    RemoveRole { guild_id: GuildId, user_id: UserId, role_id: RoleId },
    Pin { channel: ChannelRef, message_id: MessageId },
    Unpin { channel: ChannelRef, message_id: MessageId },
}

impl GatewayAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayAction::AddRole { .. } => "add-role",
            GatewayAction::RemoveRole { .. } => "remove-role",
            GatewayAction::Pin { .. } => "pin",
            GatewayAction::Unpin { .. } => "unpin",
        }
    }
}
