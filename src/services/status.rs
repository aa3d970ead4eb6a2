//! Status - reports how the bot itself is doing

use std::time::Duration;

use once_cell::sync::Lazy;

use super::{reply, ApplicationService, ServiceKey};
use crate::application::context::ServiceContext;
use crate::application::errors::BotError;
use crate::application::messaging::{Command, CommandTable};
use crate::domain::entities::{InboundMessage, ParsedCommand};

static COMMANDS: Lazy<CommandTable<StatusService>> =
    Lazy::new(|| CommandTable::new().with(Command::new("システムの状態", StatusService::show_status)));

/// `1日2時間3分4秒`, leading zero units dropped
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, hours, minutes, seconds) = (secs / 86_400, secs / 3_600 % 24, secs / 60 % 60, secs % 60);
    match (days, hours, minutes) {
        (0, 0, 0) => format!("{}秒", seconds),
        (0, 0, _) => format!("{}分{}秒", minutes, seconds),
        (0, _, _) => format!("{}時間{}分{}秒", hours, minutes, seconds),
        _ => format!("{}日{}時間{}分{}秒", days, hours, minutes, seconds),
    }
}

#[derive(Debug, Default)]
pub struct StatusService;

impl ServiceKey for StatusService {
    const ID: &'static str = "status";
}

impl StatusService {
    pub fn new() -> Self {
        Self
    }

    fn show_status(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, _: &ParsedCommand) -> Result<(), BotError> {
        let services = ctx.services().ids().join(", ");
        let text = format!(
            "\n稼働時間：{}\nフレーム時間：{:.3}ms\nフレーム数：{}\nサービス：{}\nサーバー数：{}",
            format_uptime(ctx.uptime()),
            ctx.last_frame().as_secs_f64() * 1000.0,
            ctx.frames(),
            services,
            ctx.guilds().len()
        );
        reply(ctx, message, text);
        Ok(())
    }
}

impl ApplicationService for StatusService {
    fn update(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), BotError> {
        COMMANDS.dispatch_all(self, ctx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::context::testing::Harness;
    use crate::services::PinProxyService;

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(Duration::from_secs(5)), "5秒");
        assert_eq!(format_uptime(Duration::from_secs(3_725)), "1時間2分5秒");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1日1時間1分1秒");
    }

    #[test]
    fn status_lists_services_and_guilds() {
        let mut harness = Harness::new();
        harness.services.add(PinProxyService::new());
        harness.stats.last_frame = Duration::from_micros(10_500);
        harness.receive(5, "はるなちゃん、システムの状態");

        StatusService::new().update(&mut harness.context()).unwrap();

        let replies = harness.replies();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("フレーム時間：10.500ms"));
        assert!(replies[0].contains("サービス：pin-proxy"));
        assert!(replies[0].contains("サーバー数：1"));
    }
}
