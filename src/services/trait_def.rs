//! Service trait definitions

use std::any::Any;

use crate::application::context::{ServiceContext, StartupContext};
use crate::application::errors::BotError;
use crate::domain::entities::Guild;

/// Downcasting helper so the registry can hand out concrete service types
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Stable identifier a service is registered and looked up under
pub trait ServiceKey {
    const ID: &'static str;
}

/// Core service trait that all bot features implement.
///
/// Every hook runs on the loop thread. Errors returned from a hook are
/// logged against the service id and do not stop the frame.
pub trait ApplicationService: AsAny + Send {
    /// Called once before login, in registration order
    fn startup(&mut self, _ctx: &mut StartupContext<'_>) -> Result<(), BotError> {
        Ok(())
    }

    fn on_guild_available(&mut self, _ctx: &mut ServiceContext<'_>, _guild: &Guild) -> Result<(), BotError> {
        Ok(())
    }

    /// Called once per frame
    fn update(&mut self, _ctx: &mut ServiceContext<'_>) -> Result<(), BotError> {
        Ok(())
    }

    /// Write persisted state now. Services without state keep the default.
    fn persist(&mut self) -> Result<(), BotError> {
        Ok(())
    }

    /// Called once after the loop exits
    fn terminate(&mut self) -> Result<(), BotError> {
        Ok(())
    }
}
