//! Paifu detection - announces Mahjong Soul replay links pasted in a watched channel

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ApplicationService, ServiceKey};
use crate::application::context::ServiceContext;
use crate::application::errors::BotError;
use crate::application::messaging::{Command, CommandTable};
use crate::domain::entities::{ChannelId, ChannelRef, Guild, InboundMessage, ParsedCommand, Permission};
use crate::domain::traits::StateStore;
use crate::infrastructure::storage::{load_json, save_json};

pub const SAVE_KEY: &str = "paifuDetectService.json";

const REVIEW_REQUEST: &str = "検討をお願いします";

static PAIFU_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https://game\.mahjongsoul\.com/\?paipu=[0-9a-z_-]+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaifuDetectData {
    pub notify_channel_id: Option<ChannelId>,
    pub paste_channel_id: Option<ChannelId>,
}

pub fn contains_paifu(content: &str) -> bool {
    PAIFU_URL_RE.is_match(content)
}

/// Announcement for a replay pasted by `username`
pub fn announcement(username: &str, content: &str) -> String {
    if content.contains(REVIEW_REQUEST) {
        format!("{} さんが、牌譜検討して欲しい牌譜を貼ったみたいよ。見てあげてちょうだいね。", username)
    } else {
        format!("{} さんが、牌譜を貼ったみたいよ。どんな牌譜か気になるわね。", username)
    }
}

static COMMANDS: Lazy<CommandTable<PaifuDetectService>> = Lazy::new(|| {
    CommandTable::new()
        .with(
            Command::new("牌譜通知はここにお願いします", PaifuDetectService::set_notify_channel)
                .with_permission(Permission::SupervisorOrSub),
        )
        .with(
            Command::new("牌譜を貼る場所はここです", PaifuDetectService::set_paste_channel)
                .with_permission(Permission::SupervisorOrSub),
        )
});

pub struct PaifuDetectService {
    store: Box<dyn StateStore>,
    data: PaifuDetectData,
    notify_channel: Option<ChannelRef>,
}

impl ServiceKey for PaifuDetectService {
    const ID: &'static str = "paifu-detect";
}

impl PaifuDetectService {
    pub fn new(store: Box<dyn StateStore>) -> Result<Self, BotError> {
        let data = load_json(store.as_ref(), SAVE_KEY)?.unwrap_or_default();
        Ok(Self {
            store,
            data,
            notify_channel: None,
        })
    }

    pub fn data(&self) -> &PaifuDetectData {
        &self.data
    }

    pub fn notify_channel(&self) -> Option<&ChannelRef> {
        self.notify_channel.as_ref()
    }

    fn save(&self) -> Result<(), BotError> {
        save_json(self.store.as_ref(), SAVE_KEY, &self.data)?;
        Ok(())
    }

    fn set_notify_channel(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, _: &ParsedCommand) -> Result<(), BotError> {
        self.notify_channel = Some(message.channel.clone());
        self.data.notify_channel_id = Some(message.channel.id);
        self.save()?;
        info!("Paifu notifications go to {}", message.channel.id);
        ctx.post().send(&message.channel, "わかったわ、牌譜が貼られたらここに通知するわね");
        Ok(())
    }

    fn set_paste_channel(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, _: &ParsedCommand) -> Result<(), BotError> {
        self.data.paste_channel_id = Some(message.channel.id);
        self.save()?;
        info!("Watching {} for paifu", message.channel.id);
        ctx.post().send(&message.channel, "わかったわ、ここに牌譜が貼られたか確認するわ");
        Ok(())
    }
}

impl ApplicationService for PaifuDetectService {
    fn on_guild_available(&mut self, _ctx: &mut ServiceContext<'_>, guild: &Guild) -> Result<(), BotError> {
        if self.notify_channel.is_some() {
            return Ok(());
        }
        if let Some(channel) = self.data.notify_channel_id.and_then(|id| guild.channel(id)) {
            info!("Paifu notify channel resolved: #{} in {}", channel.name, guild.name);
            self.notify_channel = Some(channel.clone());
        }
        Ok(())
    }

    fn update(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), BotError> {
        for message in ctx.received() {
            if message.is_from_bot()
                || ctx.parser().is_command(&message.content)
                || self.data.paste_channel_id != Some(message.channel.id)
                || !contains_paifu(&message.content)
            {
                continue;
            }
            let Some(channel) = self.notify_channel.as_ref() else {
                debug!("Paifu from {} but no notify channel", message.author.id);
                continue;
            };
            ctx.post().send(channel, announcement(&message.author.username, &message.content));
        }

        COMMANDS.dispatch_all(self, ctx);
        Ok(())
    }

    fn persist(&mut self) -> Result<(), BotError> {
        self.save()
    }

    fn terminate(&mut self) -> Result<(), BotError> {
        self.save()
    }
}
