//! Domain layer - Core business objects with no I/O
//!
//! This layer contains:
//! - Entities: messages, reactions, guilds, users, parsed commands
//! - Traits: abstractions for the gateway session and state persistence

pub mod entities;
pub mod traits;
