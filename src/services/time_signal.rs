//! Time signal - hourly announcements with opt-in mentions

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, FixedOffset, Timelike};
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{jst, reply, ApplicationService, ServiceKey};
use crate::application::context::ServiceContext;
use crate::application::errors::{BotError, CommandError};
use crate::application::messaging::{Command, CommandTable};
use crate::domain::entities::{mention, ChannelId, ChannelRef, Guild, InboundMessage, ParsedCommand, Permission, UserId};
use crate::domain::traits::StateStore;
use crate::infrastructure::storage::{load_json, save_json};

pub const SAVE_KEY: &str = "timesignal.json";
pub const MAX_HOUR: u8 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeSignalData {
    pub channel_id: Option<ChannelId>,
    pub messages: BTreeMap<u8, Vec<String>>,
    pub subscribers: BTreeMap<u8, BTreeSet<UserId>>,
}

/// Top of the hour following `now`
pub fn next_signal_after(now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let hour_start = now
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    hour_start + Duration::hours(1)
}

/// Announcement text: mentions line, hour line, then the chosen message
pub fn render_signal(hour: u32, subscribers: &BTreeSet<UserId>, text: &str) -> String {
    let mentions: String = subscribers.iter().map(|&id| mention(id)).collect();
    let head = if mentions.is_empty() { String::new() } else { format!("{}\n", mentions) };
    format!("{}{}時です。\n{}", head, hour, text)
}

fn invalid_hour() -> BotError {
    CommandError::InvalidArgs("時間は0から24までの数字で教えてね".to_string()).into()
}

/// 0 to 24, with 24 meaning midnight
fn parse_hour(text: &str) -> Option<u8> {
    text.parse::<u8>().ok().filter(|h| *h <= MAX_HOUR).map(|h| h % MAX_HOUR)
}

static COMMANDS: Lazy<CommandTable<TimeSignalService>> = Lazy::new(|| {
    CommandTable::new()
        .with(
            Command::new("時報はここにお願い", TimeSignalService::set_channel)
                .with_permission(Permission::SupervisorOrSub),
        )
        .with(
            Command::new("時報の登録", TimeSignalService::add_message)
                .with_permission(Permission::SupervisorOrSub),
        )
        .with(
            Command::new("時報の一覧", TimeSignalService::list_messages)
                .with_permission(Permission::SupervisorOrSub),
        )
        .with(
            Command::new("時報の削除", TimeSignalService::remove_message)
                .with_permission(Permission::SupervisorOrSub),
        )
        .with(Command::new("時報の通知をお願い", TimeSignalService::subscribe))
        .with(Command::new("時報の通知を止めて", TimeSignalService::unsubscribe))
});

/// Posts to the configured channel at every top of the hour (JST)
pub struct TimeSignalService {
    store: Box<dyn StateStore>,
    data: TimeSignalData,
    channel: Option<ChannelRef>,
    next_signal: Option<DateTime<FixedOffset>>,
    rng: StdRng,
}

impl ServiceKey for TimeSignalService {
    const ID: &'static str = "time-signal";
}

impl TimeSignalService {
    pub fn new(store: Box<dyn StateStore>) -> Result<Self, BotError> {
        let data = load_json(store.as_ref(), SAVE_KEY)?.unwrap_or_default();
        Ok(Self {
            store,
            data,
            channel: None,
            next_signal: None,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn data(&self) -> &TimeSignalData {
        &self.data
    }

    pub fn channel(&self) -> Option<&ChannelRef> {
        self.channel.as_ref()
    }

    pub fn next_signal(&self) -> Option<DateTime<FixedOffset>> {
        self.next_signal
    }

    fn save(&self) -> Result<(), BotError> {
        save_json(self.store.as_ref(), SAVE_KEY, &self.data)?;
        Ok(())
    }

    /// Post the announcement once the scheduled hour has been reached
    fn tick(&mut self, ctx: &mut ServiceContext<'_>) {
        let now = ctx.now().with_timezone(&jst());
        let due = *self.next_signal.get_or_insert_with(|| next_signal_after(now));
        if now < due {
            return;
        }

        let hour = due.hour() as u8;
        let text = self
            .data
            .messages
            .get(&hour)
            .and_then(|list| list.choose(&mut self.rng))
            .cloned()
            .unwrap_or_default();
        let subscribers = self.data.subscribers.get(&hour).cloned().unwrap_or_default();

        match &self.channel {
            Some(channel) => {
                info!("Time signal for {}時 to #{}", hour, channel.name);
                ctx.post().send(channel, render_signal(due.hour(), &subscribers, &text));
            }
            None => debug!("Time signal for {}時 skipped, no channel", hour),
        }
        self.next_signal = Some(next_signal_after(now));
    }

    fn set_channel(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, _: &ParsedCommand) -> Result<(), BotError> {
        self.channel = Some(message.channel.clone());
        self.data.channel_id = Some(message.channel.id);
        self.save()?;
        info!("Time signal channel set to {}", message.channel.id);
        ctx.post().send(&message.channel, "これからはここで時報をお知らせするね！");
        Ok(())
    }

    fn add_message(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        if !parsed.has_args(2) {
            reply(ctx, message, "時報の登録には、時間とメッセージを教えてね");
            return Ok(());
        }
        let Some(hour) = parsed.arg(0).and_then(parse_hour) else {
            return Err(invalid_hour());
        };

        let text = parsed.arguments[1..].join(" ");
        self.data.messages.entry(hour).or_default().push(text);
        self.save()?;
        reply(ctx, message, format!("{}時の時報を登録したよ！", hour));
        Ok(())
    }

    fn list_messages(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        let Some(hour) = parsed.arg(0).and_then(parse_hour) else {
            return Err(invalid_hour());
        };

        let list = self.data.messages.get(&hour).map(Vec::as_slice).unwrap_or_default();
        if list.is_empty() {
            reply(ctx, message, format!("{}時の時報はまだ登録されていないよ", hour));
            return Ok(());
        }
        let mut text = format!("{}時の一覧は以下の通りです\n", hour);
        for (i, item) in list.iter().enumerate() {
            text.push_str(&format!("[{}]{}\n", i, item));
        }
        reply(ctx, message, text);
        Ok(())
    }

    fn remove_message(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        if !parsed.has_args(2) {
            reply(ctx, message, "削除する時間と番号を教えてね");
            return Ok(());
        }
        let Some(hour) = parsed.arg(0).and_then(parse_hour) else {
            return Err(invalid_hour());
        };
        let Some(index) = parsed.arg(1).and_then(|i| i.parse::<usize>().ok()) else {
            reply(ctx, message, "うーん、教えてもらった文字が数字なのかわからないや");
            return Ok(());
        };

        let removed = match self.data.messages.get_mut(&hour) {
            Some(list) if index < list.len() => list.remove(index),
            _ => {
                reply(ctx, message, "教えてくれた番号に時報がなかったよ？");
                return Ok(());
            }
        };
        self.save()?;
        reply(ctx, message, format!("{}時の時報から'{}'を削除したよ！", hour, removed));
        Ok(())
    }

    /// Hours named by the optional argument, every hour when absent
    fn hours_for(parsed: &ParsedCommand) -> Option<Vec<u8>> {
        match parsed.arg(0) {
            None => Some((0..MAX_HOUR).collect()),
            Some(arg) => parse_hour(arg).map(|h| vec![h]),
        }
    }

    fn subscribe(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        let Some(hours) = Self::hours_for(parsed) else {
            return Err(invalid_hour());
        };
        for hour in &hours {
            self.data.subscribers.entry(*hour).or_default().insert(message.author.id);
        }
        self.save()?;
        let text = match hours.as_slice() {
            [hour] => format!("{}時の時報でお知らせするね！", hour),
            _ => "毎時の時報でお知らせするね！".to_string(),
        };
        reply(ctx, message, text);
        Ok(())
    }

    fn unsubscribe(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        let Some(hours) = Self::hours_for(parsed) else {
            return Err(invalid_hour());
        };
        for hour in &hours {
            if let Some(set) = self.data.subscribers.get_mut(hour) {
                set.remove(&message.author.id);
            }
        }
        self.data.subscribers.retain(|_, set| !set.is_empty());
        self.save()?;
        let text = match hours.as_slice() {
            [hour] => format!("{}時の時報のお知らせを止めたよ", hour),
            _ => "時報のお知らせを全部止めたよ".to_string(),
        };
        reply(ctx, message, text);
        Ok(())
    }
}

impl ApplicationService for TimeSignalService {
    fn on_guild_available(&mut self, _ctx: &mut ServiceContext<'_>, guild: &Guild) -> Result<(), BotError> {
        if self.channel.is_some() {
            return Ok(());
        }
        if let Some(channel) = self.data.channel_id.and_then(|id| guild.channel(id)) {
            info!("Time signal channel resolved: #{} in {}", channel.name, guild.name);
            self.channel = Some(channel.clone());
        }
        Ok(())
    }

    fn update(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), BotError> {
        COMMANDS.dispatch_all(self, ctx);
        self.tick(ctx);
        Ok(())
    }

    fn persist(&mut self) -> Result<(), BotError> {
        self.save()
    }

    fn terminate(&mut self) -> Result<(), BotError> {
        self.save()
    }
}
