//! haruna-bot - a frame-loop chat bot with pluggable services

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod services;
