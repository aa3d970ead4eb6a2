//! Haruna-chan quest - players level up by chatting

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{jst, ApplicationService, ServiceKey};
use crate::application::context::{ServiceContext, StartupContext};
use crate::application::errors::BotError;
use crate::application::messaging::{Command, CommandTable};
use crate::domain::entities::{ChannelId, InboundMessage, ParsedCommand, Permission, UserId};
use crate::domain::traits::StateStore;
use crate::infrastructure::storage::{load_json, save_json};

pub const SAVE_KEY: &str = "harunachanquest.json";

pub const QUEST_PREFIXES: [&str; 4] = [
    "陽菜ちゃんくえすと、",
    "はるなちゃんくえすと、",
    "陽菜ちゃんクエスト、",
    "はるなちゃんクエスト、",
];

pub const MAX_LEVEL: u32 = 20;
pub const MAX_ENERGY: u32 = 1500;
const START_COIN: u64 = 100;
const DAILY_COIN: u64 = 100;
const SAVE_INTERVAL: Duration = Duration::from_secs(30);

const RATE_DENIAL: &str = "ごめんなさい。このコマンドはかんりしゃの人だけしか使っちゃいけないってお母さんに言われてるの。";

const HOW_TO_PLAY: &str = "
はるなちゃんクエストは、陽菜ちゃんbotがいるサーバーで発言するとプレイヤーが成長して、日付が変わって最初の発言ではコインが貰えるよ。

コマンド一覧：
・ステータス確認 / ステータス表示 / ステータスの確認 / ステータスの表示
　今のプレイヤーの状態を見せるよ
・はるなちゃんの状態 / 陽菜ちゃんの状態
　陽菜のステータスを見せるよ
・チャンネルレート設定 / チャンネルレートの設定　レート（管理者のみ）
　このチャンネルで貰える経験値の倍率を変えるよ
・チャンネルレート確認 / チャンネルレートの確認
　このチャンネルの経験値の倍率を教えるよ
・性別の設定　男 か 女
　陽菜からの呼び方が変わるよ
・遊び方
　この説明を出すよ

注意：
コマンドの発言は経験値の対象外だよ。";

/// Exp needed to leave `level`, `None` at the cap
pub fn exp_to_next(level: u32) -> Option<u64> {
    (level < MAX_LEVEL).then(|| u64::from(level) * 10_000)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Gender {
    #[default]
    Male,
    Female,
}

impl Gender {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "男" | "男性" => Some(Gender::Male),
            "女" | "女性" => Some(Gender::Female),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Gender::Male => "男",
            Gender::Female => "女",
        }
    }

    pub fn mention_suffix(self) -> &'static str {
        match self {
            Gender::Male => "おにいちゃん！",
            Gender::Female => "おねえちゃん！",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerData {
    pub level: u32,
    pub exp: u64,
    pub coin: u64,
    pub last_message_at: DateTime<FixedOffset>,
    #[serde(default)]
    pub gender: Gender,
}

impl PlayerData {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            level: 1,
            exp: 0,
            coin: START_COIN,
            last_message_at: now,
            gender: Gender::Male,
        }
    }

    pub fn mention_suffix(&self) -> &'static str {
        self.gender.mention_suffix()
    }

    /// Add exp, carrying the surplus through as many levels as it covers.
    /// Returns whether the level changed.
    pub fn gain_exp(&mut self, amount: u64) -> bool {
        let before = self.level;
        self.exp = self.exp.saturating_add(amount);
        while let Some(need) = exp_to_next(self.level) {
            if self.exp < need {
                break;
            }
            self.exp -= need;
            self.level += 1;
        }
        self.level > before
    }

    /// Record a message sent at `at`. The first message of a new day earns the daily coin.
    pub fn touch(&mut self, at: DateTime<FixedOffset>) -> bool {
        let new_day = self.last_message_at.date_naive() != at.date_naive();
        if new_day {
            self.coin += DAILY_COIN;
        }
        self.last_message_at = at;
        new_day
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarunaData {
    pub level: u32,
    pub exp: u64,
    pub energy: u32,
}

impl Default for HarunaData {
    fn default() -> Self {
        Self {
            level: 1,
            exp: 0,
            energy: MAX_ENERGY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameData {
    pub haruna: HarunaData,
    pub players: HashMap<UserId, PlayerData>,
    pub channel_rates: HashMap<ChannelId, f64>,
}

fn exp_label(level: u32) -> String {
    exp_to_next(level).map(|n| n.to_string()).unwrap_or_else(|| "MAX".to_string())
}

static COMMANDS: Lazy<CommandTable<QuestService>> = Lazy::new(|| {
    CommandTable::new()
        .with(
            Command::new("ステータス確認", QuestService::show_player_status)
                .with_aliases(["ステータス表示", "ステータスの確認", "ステータスの表示"]),
        )
        .with(Command::new("はるなちゃんの状態", QuestService::show_haruna_status).with_aliases(["陽菜ちゃんの状態"]))
        .with(
            Command::new("チャンネルレート設定", QuestService::set_channel_rate)
                .with_aliases(["チャンネルレートの設定"])
                .with_permission(Permission::Supervisor)
                .with_denial(RATE_DENIAL),
        )
        .with(
            Command::new("チャンネルレート確認", QuestService::show_channel_rate)
                .with_aliases(["チャンネルレートの確認"]),
        )
        .with(Command::new("遊び方", QuestService::how_to_play))
        .with(Command::new("性別の設定", QuestService::set_gender))
});

/// Chat-driven leveling game
pub struct QuestService {
    store: Box<dyn StateStore>,
    data: GameData,
    dirty: bool,
    last_save: Instant,
    save_interval: Duration,
}

impl ServiceKey for QuestService {
    const ID: &'static str = "quest";
}

impl QuestService {
    /// Load saved game data, starting fresh if none exists
    pub fn new(store: Box<dyn StateStore>) -> Result<Self, BotError> {
        let data = load_json(store.as_ref(), SAVE_KEY)?.unwrap_or_default();
        Ok(Self {
            store,
            data,
            dirty: false,
            last_save: Instant::now(),
            save_interval: SAVE_INTERVAL,
        })
    }

    pub fn with_save_interval(mut self, interval: Duration) -> Self {
        self.save_interval = interval;
        self
    }

    pub fn data(&self) -> &GameData {
        &self.data
    }

    /// The author's player record, created on first sight
    pub fn player(&mut self, message: &InboundMessage) -> &mut PlayerData {
        let at = message.timestamp.with_timezone(&jst());
        self.data
            .players
            .entry(message.author.id)
            .or_insert_with(|| PlayerData::new(at))
    }

    pub fn channel_rate(&self, channel: ChannelId) -> f64 {
        self.data.channel_rates.get(&channel).copied().unwrap_or(1.0)
    }

    pub fn save(&mut self) -> Result<(), BotError> {
        save_json(self.store.as_ref(), SAVE_KEY, &self.data)?;
        self.dirty = false;
        self.last_save = Instant::now();
        debug!("Quest data saved");
        Ok(())
    }

    fn reply(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, text: impl Into<String>) {
        let suffix = self.player(message).mention_suffix();
        ctx.post().reply_with_suffix(message, text, suffix);
    }

    fn earn(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage) {
        let rate = self.channel_rate(message.channel.id);
        let gain = (message.content.chars().count() as f64 * rate) as u64;
        let at = message.timestamp.with_timezone(&jst());

        let player = self.player(message);
        player.touch(at);
        if player.gain_exp(gain) {
            let level = player.level;
            info!("Player {} reached level {}", message.author.id, level);
            self.reply(ctx, message, format!("はるなちゃんクエストのプレイヤーレベルが {} に上がったよ！", level));
        }
        self.data.haruna.gain(gain);
        self.dirty = true;
    }

    fn show_player_status(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        message: &InboundMessage,
        _: &ParsedCommand,
    ) -> Result<(), BotError> {
        let player = self.player(message);
        let text = format!(
            "\nレベル：{}\n経験値：{} / {}\nコイン：{}\n性別：{}",
            player.level,
            player.exp,
            exp_label(player.level),
            player.coin,
            player.gender.label()
        );
        self.reply(ctx, message, text);
        Ok(())
    }

    fn show_haruna_status(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        message: &InboundMessage,
        _: &ParsedCommand,
    ) -> Result<(), BotError> {
        let haruna = &self.data.haruna;
        let text = format!(
            "\nレベル：{}\n経験値：{} / {}\n満腹度：{} / {}",
            haruna.level,
            haruna.exp,
            exp_label(haruna.level),
            haruna.energy,
            MAX_ENERGY
        );
        ctx.post().reply(message, text);
        Ok(())
    }

    fn set_channel_rate(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        message: &InboundMessage,
        parsed: &ParsedCommand,
    ) -> Result<(), BotError> {
        let Some(arg) = parsed.arg(0) else {
            self.reply(ctx, message, "コマンドの引数が足りないよぉ");
            return Ok(());
        };
        let rate = match arg.parse::<f64>() {
            Ok(rate) if rate.is_finite() && rate >= 0.0 => rate,
            _ => {
                self.reply(ctx, message, format!("'{}'はレートとして読めなかったよ～", arg));
                return Ok(());
            }
        };

        let channel = &message.channel;
        let old = self.channel_rate(channel.id);
        self.data.channel_rates.insert(channel.id, rate);
        self.dirty = true;
        info!("Channel rate for {} changed {} -> {}", channel.id, old, rate);
        self.reply(
            ctx,
            message,
            format!("{}({}) のレートを {} -> {} に変更したよ！", channel.name, channel.id, old, rate),
        );
        Ok(())
    }

    fn show_channel_rate(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        message: &InboundMessage,
        _: &ParsedCommand,
    ) -> Result<(), BotError> {
        let channel = &message.channel;
        let text = format!(
            "{}({}) のレートは {} だよ！",
            channel.name,
            channel.id,
            self.channel_rate(channel.id)
        );
        self.reply(ctx, message, text);
        Ok(())
    }

    fn how_to_play(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        message: &InboundMessage,
        _: &ParsedCommand,
    ) -> Result<(), BotError> {
        ctx.post().reply(message, HOW_TO_PLAY);
        Ok(())
    }

    fn set_gender(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        message: &InboundMessage,
        parsed: &ParsedCommand,
    ) -> Result<(), BotError> {
        let Some(gender) = parsed.arg(0).and_then(Gender::from_label) else {
            self.reply(ctx, message, "性別は「男」か「女」で教えてね");
            return Ok(());
        };
        self.player(message).gender = gender;
        self.dirty = true;
        self.reply(ctx, message, format!("性別を{}に設定したよ！", gender.label()));
        Ok(())
    }
}

impl HarunaData {
    fn gain(&mut self, amount: u64) {
        self.exp = self.exp.saturating_add(amount);
        while let Some(need) = exp_to_next(self.level) {
            if self.exp < need {
                break;
            }
            self.exp -= need;
            self.level += 1;
        }
    }
}

impl ApplicationService for QuestService {
    fn startup(&mut self, ctx: &mut StartupContext<'_>) -> Result<(), BotError> {
        for prefix in QUEST_PREFIXES {
            ctx.parser.add_prefix(prefix);
        }
        info!("Quest loaded with {} players", self.data.players.len());
        Ok(())
    }

    fn update(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), BotError> {
        for message in ctx.received() {
            if message.is_from_bot() {
                continue;
            }
            match ctx.parser().parse(&message.content) {
                None => self.earn(ctx, message),
                Some(parsed) => {
                    if let Err(e) = COMMANDS.dispatch(self, ctx, message, &parsed) {
                        warn!("Quest command '{}' failed: {}", parsed.command, e);
                    }
                }
            }
        }

        if self.dirty && self.last_save.elapsed() >= self.save_interval {
            self.save()?;
        }
        Ok(())
    }

    fn persist(&mut self) -> Result<(), BotError> {
        self.save()
    }

    fn terminate(&mut self) -> Result<(), BotError> {
        self.save()
    }
}
