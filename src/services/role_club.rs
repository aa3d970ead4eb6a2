//! Role club - self-service club roles backed by SQLite

use once_cell::sync::Lazy;
use tracing::info;

use super::{reply, ApplicationService, ServiceKey};
use crate::application::context::ServiceContext;
use crate::application::errors::{BotError, StorageError};
use crate::application::messaging::{Command, CommandTable};
use crate::domain::entities::{GatewayAction, InboundMessage, ParsedCommand, Permission, RoleId};
use crate::infrastructure::database::{ClubRole, Database};

const STRANGER_DENIAL: &str = "ごめんなさい、知らない人の言葉を信じちゃいけないってお母さんから言われているの。";

static COMMANDS: Lazy<CommandTable<RoleClubService>> = Lazy::new(|| {
    CommandTable::new()
        .with(
            Command::new("部活ロールの設定", RoleClubService::set_club)
                .with_permission(Permission::Supervisor)
                .with_denial(STRANGER_DENIAL),
        )
        .with(
            Command::new("部活ロールの解除", RoleClubService::remove_club)
                .with_permission(Permission::Supervisor)
                .with_denial(STRANGER_DENIAL),
        )
        .with(Command::new("部活一覧を見せて", RoleClubService::list_clubs))
        .with(Command::new("入部", RoleClubService::join))
        .with(Command::new("退部", RoleClubService::leave))
});

pub struct RoleClubService {
    db: Database,
}

impl ServiceKey for RoleClubService {
    const ID: &'static str = "role-club";
}

impl RoleClubService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn club(&self, name: &str) -> Result<Option<ClubRole>, BotError> {
        Ok(self.db.get_club_role(name).map_err(StorageError::from)?)
    }

    fn set_club(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        let (Some(club), Some(role_arg)) = (parsed.arg(0), parsed.arg(1)) else {
            reply(
                ctx,
                message,
                "部活の設定をするのに情報が不足してるよ～。(部活名, ロールID)を教えて欲しいな",
            );
            return Ok(());
        };
        let Ok(role_id) = role_arg.parse::<RoleId>() else {
            reply(ctx, message, "ロールのIDをちゃんと読めなかったよ～");
            return Ok(());
        };
        let Some((guild, role)) = ctx.find_role(role_id) else {
            reply(ctx, message, format!("ごめんなさい、ID'{}'のロールが見つからなかったよ", role_id));
            return Ok(());
        };

        self.db
            .set_club_role(club, guild.id, role.id)
            .map_err(StorageError::from)?;
        info!("Club '{}' bound to role {} in guild {}", club, role.id, guild.id);
        reply(ctx, message, format!("'{}'に'{}'を設定したよ！", club, role.name));
        Ok(())
    }

    fn remove_club(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        let Some(club) = parsed.arg(0) else {
            reply(ctx, message, "どの部活のロールを解除するの？");
            return Ok(());
        };

        let text = if self.db.remove_club_role(club).map_err(StorageError::from)? {
            info!("Club '{}' removed", club);
            format!("'{}'のロール設定を解除したよ！", club)
        } else {
            format!("'{}'っていう部活は登録されてないよ？", club)
        };
        reply(ctx, message, text);
        Ok(())
    }

    fn list_clubs(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, _: &ParsedCommand) -> Result<(), BotError> {
        let clubs = self.db.list_club_roles().map_err(StorageError::from)?;
        if clubs.is_empty() {
            reply(ctx, message, "まだ部活が登録されていないみたい");
            return Ok(());
        }

        let mut text = String::from("今ある部活の一覧だよ！\n");
        for club in clubs {
            text.push_str(&format!("・{}\n", club.club));
        }
        reply(ctx, message, text);
        Ok(())
    }

    fn join(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        let Some(name) = parsed.arg(0) else {
            reply(ctx, message, "どの部活に入部するの？");
            return Ok(());
        };
        let Some(club) = self.club(name)? else {
            reply(ctx, message, format!("'{}'っていう部活は見つからなかったよ", name));
            return Ok(());
        };

        ctx.post().act(GatewayAction::AddRole {
            guild_id: club.guild_id,
            user_id: message.author.id,
            role_id: club.role_id,
        });
        reply(ctx, message, format!("'{}'への入部を受け付けたよ！", club.club));
        Ok(())
    }

    fn leave(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        let Some(name) = parsed.arg(0) else {
            reply(ctx, message, "どの部活を退部するの？");
            return Ok(());
        };
        let Some(club) = self.club(name)? else {
            reply(ctx, message, format!("'{}'っていう部活は見つからなかったよ", name));
            return Ok(());
        };

        ctx.post().act(GatewayAction::RemoveRole {
            guild_id: club.guild_id,
            user_id: message.author.id,
            role_id: club.role_id,
        });
        reply(ctx, message, format!("'{}'の退部を受け付けたよ", club.club));
        Ok(())
    }
}

impl ApplicationService for RoleClubService {
    fn update(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), BotError> {
        COMMANDS.dispatch_all(self, ctx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::context::testing::Harness;

    fn service() -> RoleClubService {
        RoleClubService::new(Database::in_memory().unwrap())
    }

    #[test]
    fn setting_a_club_requires_a_known_role() {
        let mut clubs = service();
        let mut harness = Harness::new();
        harness.receive(Harness::SUPERVISOR, "はるなちゃん、部活ロールの設定 囲碁部");
        harness.receive(Harness::SUPERVISOR, "はるなちゃん、部活ロールの設定 囲碁部 abc");
        harness.receive(Harness::SUPERVISOR, "はるなちゃん、部活ロールの設定 囲碁部 999");
        harness.receive(Harness::SUPERVISOR, "はるなちゃん、部活ロールの設定 囲碁部 500");

        clubs.update(&mut harness.context()).unwrap();

        let replies = harness.replies();
        assert!(replies[0].ends_with("(部活名, ロールID)を教えて欲しいな"));
        assert!(replies[1].ends_with("ロールのIDをちゃんと読めなかったよ～"));
        assert!(replies[2].ends_with("ごめんなさい、ID'999'のロールが見つからなかったよ"));
        assert!(replies[3].ends_with("'囲碁部'に'囲碁部'を設定したよ！"));
        assert_eq!(clubs.club("囲碁部").unwrap().unwrap().role_id, Harness::ROLE);
    }

    #[test]
    fn joining_and_leaving_queue_role_actions() {
        let mut clubs = service();
        clubs.db.set_club_role("囲碁部", Harness::GUILD, Harness::ROLE).unwrap();
        let mut harness = Harness::new();
        harness.receive(5, "はるなちゃん、入部 囲碁部");
        harness.receive(5, "はるなちゃん、退部 囲碁部");
        harness.receive(5, "はるなちゃん、入部 麻雀部");

        clubs.update(&mut harness.context()).unwrap();

        assert_eq!(
            harness.actions(),
            vec![
                GatewayAction::AddRole {
                    guild_id: Harness::GUILD,
                    user_id: 5,
                    role_id: Harness::ROLE
                },
                GatewayAction::RemoveRole {
                    guild_id: Harness::GUILD,
                    user_id: 5,
                    role_id: Harness::ROLE
                },
            ]
        );
        assert!(harness.replies()[2].ends_with("'麻雀部'っていう部活は見つからなかったよ"));
    }

    #[test]
    fn listing_and_removing_clubs() {
        let mut clubs = service();
        clubs.db.set_club_role("囲碁部", Harness::GUILD, Harness::ROLE).unwrap();
        let mut harness = Harness::new();
        harness.receive(5, "はるなちゃん、部活一覧を見せて");
        harness.receive(5, "はるなちゃん、部活ロールの解除 囲碁部");
        harness.receive(Harness::SUPERVISOR, "はるなちゃん、部活ロールの解除 囲碁部");

        clubs.update(&mut harness.context()).unwrap();

        let replies = harness.replies();
        assert!(replies[0].contains("・囲碁部"));
        assert_eq!(replies[1], format!("<@5> {}", STRANGER_DENIAL));
        assert!(replies[2].ends_with("'囲碁部'のロール設定を解除したよ！"));
        assert!(clubs.club("囲碁部").unwrap().is_none());
    }
}
