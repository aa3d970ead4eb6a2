//! Domain entities - Core business objects with no external dependencies

pub mod action;
pub mod command;
pub mod guild;
pub mod message;
pub mod reaction;
pub mod user;

pub use action::GatewayAction;
pub use command::{ParsedCommand, Permission};
pub use guild::{Guild, GuildId, Role, RoleId};
pub use message::{Addressing, Attachment, ChannelId, ChannelRef, InboundMessage, MessageId, OutboundMessage};
pub use reaction::{Emoji, ReactionEvent};
pub use user::{mention, User, UserId};
