//! System control - shutdown and sub-supervisor management

use once_cell::sync::Lazy;
use tracing::info;

use super::{parse_user_id, reply, ApplicationService, ServiceKey};
use crate::application::context::ServiceContext;
use crate::application::errors::{BotError, CommandError};
use crate::application::messaging::{Command, CommandTable};
use crate::domain::entities::{mention, InboundMessage, ParsedCommand, Permission};

const STRANGER_DENIAL: &str = "ごめんなさい、知らない人の言葉を信じちゃいけないってお母さんから言われているの。";
const FAREWELL: &str = "はーい！陽菜、お家に帰るね～、ばいばーい";
const UNREADABLE_ID: &str = "ユーザーのIDをちゃんと読めなかったよ～";

static COMMANDS: Lazy<CommandTable<SystemControlService>> = Lazy::new(|| {
    CommandTable::new()
        .with(
            Command::new("家に帰って", SystemControlService::go_home)
                .with_description("Shut the bot down")
                .with_permission(Permission::Supervisor)
                .with_denial(STRANGER_DENIAL),
        )
        .with(
            Command::new("副管理者の登録", SystemControlService::add_sub_supervisor)
                .with_permission(Permission::Supervisor)
                .with_denial(STRANGER_DENIAL),
        )
        .with(
            Command::new("副管理者の解除", SystemControlService::remove_sub_supervisor)
                .with_permission(Permission::Supervisor)
                .with_denial(STRANGER_DENIAL),
        )
        .with(
            Command::new("記憶して", SystemControlService::save_everything)
                .with_description("Write every service's state now")
                .with_permission(Permission::SupervisorOrSub)
                .with_denial(STRANGER_DENIAL),
        )
});

#[derive(Debug, Default)]
pub struct SystemControlService;

impl ServiceKey for SystemControlService {
    const ID: &'static str = "system-control";
}

impl SystemControlService {
    pub fn new() -> Self {
        Self
    }

    fn go_home(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, _: &ParsedCommand) -> Result<(), BotError> {
        info!("Shutdown requested by {}", message.author.id);
        ctx.post().send(&message.channel, FAREWELL);
        ctx.quit();
        Ok(())
    }

    fn add_sub_supervisor(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        message: &InboundMessage,
        parsed: &ParsedCommand,
    ) -> Result<(), BotError> {
        let Some(arg) = parsed.arg(0) else {
            reply(ctx, message, "誰を副管理者にすればいいの？");
            return Ok(());
        };
        let Some(user) = parse_user_id(arg) else {
            return Err(CommandError::InvalidArgs(UNREADABLE_ID.to_string()).into());
        };

        let text = if ctx.permissions_mut().add_sub_supervisor(user) {
            info!("Sub-supervisor added: {}", user);
            format!("{}を副管理者に登録したよ！", mention(user))
        } else {
            format!("{}はもう副管理者だよ？", mention(user))
        };
        reply(ctx, message, text);
        Ok(())
    }

    fn remove_sub_supervisor(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        message: &InboundMessage,
        parsed: &ParsedCommand,
    ) -> Result<(), BotError> {
        let Some(arg) = parsed.arg(0) else {
            reply(ctx, message, "誰を副管理者から外せばいいの？");
            return Ok(());
        };
        let Some(user) = parse_user_id(arg) else {
            return Err(CommandError::InvalidArgs(UNREADABLE_ID.to_string()).into());
        };

        let text = if ctx.permissions_mut().remove_sub_supervisor(user) {
            info!("Sub-supervisor removed: {}", user);
            format!("{}を副管理者から外したよ！", mention(user))
        } else {
            format!("{}は副管理者じゃないみたい", mention(user))
        };
        reply(ctx, message, text);
        Ok(())
    }
}

impl SystemControlService {
    fn save_everything(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, _: &ParsedCommand) -> Result<(), BotError> {
        let failures = ctx.services().persist_all();
        let text = if failures.is_empty() {
            info!("State saved on request of {}", message.author.id);
            "ちゃんと覚えたよ！".to_string()
        } else {
            let names: Vec<&str> = failures.iter().map(|(id, _)| *id).collect();
            format!("うぅ、{}のことは覚えられなかったよ…", names.join("、"))
        };
        reply(ctx, message, text);
        Ok(())
    }
}

impl ApplicationService for SystemControlService {
    fn update(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), BotError> {
        COMMANDS.dispatch_all(self, ctx);
        Ok(())
    }
}
