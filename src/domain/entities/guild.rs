use serde::{Deserialize, Serialize};

use super::message::{ChannelId, ChannelRef};

pub type GuildId = u64;
pub type RoleId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
}

/// Cached guild state delivered once the guild becomes available
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: GuildId,
    pub name: String,
    pub channels: Vec<ChannelRef>,
    pub roles: Vec<Role>,
}

impl Guild {
    pub fn new(id: GuildId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            channels: Vec::new(),
            roles: Vec::new(),
        }
    }

    pub fn with_channel(mut self, id: ChannelId, name: impl Into<String>) -> Self {
        self.channels.push(ChannelRef::new(id, name).in_guild(self.id));
        self
    }

    pub fn with_role(mut self, id: RoleId, name: impl Into<String>) -> Self {
        self.roles.push(Role { id, name: name.into() });
        self
    }

    pub fn channel(&self, id: ChannelId) -> Option<&ChannelRef> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn role(&self, id: RoleId) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == id)
    }
}
