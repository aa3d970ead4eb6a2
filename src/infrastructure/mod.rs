//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading
//! - Storage: JSON document persistence
//! - Database: SQLite persistence
//! - Adapters: Gateway implementations

pub mod adapters;
pub mod config;
pub mod database;
pub mod storage;
