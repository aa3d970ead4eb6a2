use std::fmt;

use serde::{Deserialize, Serialize};

/// Gateway snowflake for a user
pub type UserId = u64;

/// Represents a user as seen by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub is_bot: bool,
}

impl User {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            display_name: None,
            is_bot: false,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn as_bot(mut self) -> Self {
        self.is_bot = true;
        self
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }

    /// Mention markup understood by the chat client
    pub fn mention(&self) -> String {
        mention(self.id)
    }
}

pub fn mention(id: UserId) -> String {
    format!("<@{}>", id)
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_falls_back_to_username() {
        let user = User::new(7, "sinoa");
        assert_eq!(user.display_name(), "sinoa");
        assert_eq!(user.with_display_name("しのあ").to_string(), "しのあ");
    }

    #[test]
    fn mention_uses_id() {
        assert_eq!(User::new(42, "x").mention(), "<@42>");
    }
}
