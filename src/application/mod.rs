//! Application layer - Frame loop and message plumbing
//!
//! This layer contains:
//! - App: the frame loop, event buffers and lifecycle hooks
//! - Context: what services see during a frame
//! - Pump: marshals gateway callbacks onto the loop thread
//! - Errors: Domain-specific errors
//! - Messaging: Command parsing, message post, command tables

pub mod app;
pub mod context;
pub mod errors;
pub mod messaging;
pub mod pump;

pub use app::{AppSettings, AppState, Application, ApplicationHooks, Core, RunSummary};
pub use context::{FrameStats, Permissions, QuitHandle, ServiceContext, StartupContext};
pub use pump::{EventPump, PumpHandle};
