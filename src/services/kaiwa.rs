//! Kaiwa - greetings, fortunes and learned welcome-back phrases

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{reply, ApplicationService, ServiceKey};
use crate::application::context::ServiceContext;
use crate::application::errors::BotError;
use crate::application::messaging::{Command, CommandTable};
use crate::domain::entities::{InboundMessage, ParsedCommand, Permission};
use crate::domain::traits::StateStore;
use crate::infrastructure::storage::{load_json, save_json};

const LEARN_DENIAL: &str = "ごめんなさい、陽菜、お母さんにお父さんからの言葉だけしか覚えちゃ駄目って言われてるの。";
const FORGET_DENIAL: &str = "ごめんなさい、陽菜、お母さんからお父さん以外の人からその指示を受けちゃ駄目って言われてるの。";
const RELOAD_DENIAL: &str = "ごめんなさい、知らない人の言葉を信じちゃいけないってお母さんから言われているの。";

const URLS: &str = "陽菜、いろんなURLを知ってるよ！
雀愉ブログ：https://jantama.sinoa.ws/blog/
雀魂公式サイト：https://mahjongsoul.com/
雀魂公式ついったぁ（JP）：https://twitter.com/MahjongSoul_JP
雀魂公式ついったぁ（EN）：https://twitter.com/MahjongSoul_EN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Omikuji {
    pub weight: u32,
    pub result: String,
    pub post: String,
}

impl Omikuji {
    fn new(weight: u32, result: &str, post: &str) -> Self {
        Self {
            weight,
            result: result.to_string(),
            post: post.to_string(),
        }
    }
}

/// Conversation data, editable on disk and partly learned at runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KaiwaData {
    pub ohayo: Vec<String>,
    pub oyasumi: Vec<String>,
    pub tadaima: Vec<String>,
    pub okaeri: Vec<String>,
    pub omikuji: Vec<Omikuji>,
}

impl Default for KaiwaData {
    fn default() -> Self {
        let strings = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            ohayo: strings(&["おはよー！", "おはYostar！！", "おはるな！！", "おはよんま！", "おはよるのずく！"]),
            oyasumi: strings(&[
                "おやすみなさい！",
                "おやすみーとそーす！",
                "おやすみずーり！",
                "おやすみっどうぇい！",
                "おやすみらくるにき！",
                "おやすみそしる！",
            ]),
            tadaima: Vec::new(),
            okaeri: Vec::new(),
            omikuji: vec![
                Omikuji::new(2, "おぉ！天和モード！", "役満とか出せちゃうかも！？"),
                Omikuji::new(5, "大吉", "今日はガンガン全ツしていこう！"),
                Omikuji::new(10, "中吉", "イケイケだね！"),
                Omikuji::new(50, "小吉", "麻雀日和だね！"),
                Omikuji::new(100, "吉", "今日も麻雀を楽しく遊ぼう！"),
                Omikuji::new(8, "末吉", "押し引きに注意しながら打とう！"),
                Omikuji::new(3, "凶", "うーん、今日は降りを優先したほうがいいかも？"),
                Omikuji::new(2, "大凶", "今日は段位戦に注意してね。。。！"),
                Omikuji::new(1, "あちゃぁ...地獄モード", "役満に振り込んじゃうかもしれないからお休みしようよ！"),
            ],
        }
    }
}

impl KaiwaData {
    pub fn is_tadaima(&self, text: &str) -> bool {
        self.tadaima.iter().any(|pattern| text.contains(pattern.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phrase {
    Tadaima,
    Okaeri,
}

impl Phrase {
    fn label(self) -> &'static str {
        match self {
            Phrase::Tadaima => "ただいま",
            Phrase::Okaeri => "おかえり",
        }
    }

    fn list(self, data: &mut KaiwaData) -> &mut Vec<String> {
        match self {
            Phrase::Tadaima => &mut data.tadaima,
            Phrase::Okaeri => &mut data.okaeri,
        }
    }
}

fn pick(rng: &mut StdRng, list: &[String]) -> String {
    list.choose(rng).cloned().unwrap_or_default()
}

static COMMANDS: Lazy<CommandTable<KaiwaService>> = Lazy::new(|| {
    CommandTable::new()
        .with(Command::new("おはよう", KaiwaService::ohayo).with_aliases([
            "おはよ",
            "おはようございます",
            "おはYostar",
            "おはYostar!",
            "おはYostar!!",
            "おはよーすたー",
            "おはよーすたー！",
            "おはよーすたー！！",
        ]))
        .with(Command::new("おやすみ", KaiwaService::oyasumi).with_aliases([
            "おやすみなさい",
            "おやすみなんし",
            "お休みなさい",
            "おやすみなしあ",
        ]))
        .with(Command::new("URLを教えて", KaiwaService::show_urls))
        .with(Command::new("そのまま言って", KaiwaService::repeat))
        .with(Command::new("返事して", KaiwaService::answer))
        .with(
            Command::new("会話データをロードして", KaiwaService::reload)
                .with_permission(Permission::Supervisor)
                .with_denial(RELOAD_DENIAL),
        )
        .with(
            Command::new("ただいまリストの表示", KaiwaService::show_tadaima_list)
                .with_permission(Permission::Supervisor)
                .with_denial(FORGET_DENIAL),
        )
        .with(
            Command::new("おかえりリストの表示", KaiwaService::show_okaeri_list)
                .with_permission(Permission::Supervisor)
                .with_denial(FORGET_DENIAL),
        )
        .with(
            Command::new("ただいまの言葉を覚えて", KaiwaService::learn_tadaima)
                .with_permission(Permission::Supervisor)
                .with_denial(LEARN_DENIAL),
        )
        .with(
            Command::new("おかえりの言葉を覚えて", KaiwaService::learn_okaeri)
                .with_permission(Permission::Supervisor)
                .with_denial(LEARN_DENIAL),
        )
        .with(
            Command::new("ただいまの言葉を忘れて", KaiwaService::forget_tadaima)
                .with_permission(Permission::Supervisor)
                .with_denial(FORGET_DENIAL),
        )
        .with(
            Command::new("おかえりの言葉を忘れて", KaiwaService::forget_okaeri)
                .with_permission(Permission::Supervisor)
                .with_denial(FORGET_DENIAL),
        )
});

/// Small talk service
pub struct KaiwaService {
    store: Box<dyn StateStore>,
    key: String,
    data: KaiwaData,
    rng: StdRng,
}

impl ServiceKey for KaiwaService {
    const ID: &'static str = "kaiwa";
}

impl KaiwaService {
    /// Load conversation data stored under `key`, falling back to the built-in set
    pub fn new(store: Box<dyn StateStore>, key: impl Into<String>) -> Result<Self, BotError> {
        let key = key.into();
        let data = load_json(store.as_ref(), &key)?.unwrap_or_default();
        Ok(Self {
            store,
            key,
            data,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn data(&self) -> &KaiwaData {
        &self.data
    }

    fn save(&self) -> Result<(), BotError> {
        save_json(self.store.as_ref(), &self.key, &self.data)?;
        Ok(())
    }

    fn draw_omikuji(&mut self) -> Option<Omikuji> {
        self.data
            .omikuji
            .choose_weighted(&mut self.rng, |o| o.weight)
            .ok()
            .cloned()
    }

    fn ohayo(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, _: &ParsedCommand) -> Result<(), BotError> {
        let greeting = pick(&mut self.rng, &self.data.ohayo);
        let text = match self.draw_omikuji() {
            Some(omikuji) => format!("{} 今日の運勢は、、、{}だよ！{}", greeting, omikuji.result, omikuji.post),
            None => greeting,
        };
        reply(ctx, message, text);
        Ok(())
    }

    fn oyasumi(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, _: &ParsedCommand) -> Result<(), BotError> {
        let text = format!("{} また明日ね！", pick(&mut self.rng, &self.data.oyasumi));
        reply(ctx, message, text);
        Ok(())
    }

    fn show_urls(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, _: &ParsedCommand) -> Result<(), BotError> {
        ctx.post().send(&message.channel, URLS);
        Ok(())
    }

    fn repeat(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        if parsed.arguments.is_empty() {
            reply(ctx, message, "陽菜、なんて言えばいいの？");
        } else {
            ctx.post().send(&message.channel, parsed.joined_args());
        }
        Ok(())
    }

    fn answer(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        if parsed.arguments.is_empty() {
            reply(ctx, message, "陽菜、なんて返事をすればいいの？");
        } else {
            reply(ctx, message, format!("うん、いいよ！『{}』", parsed.joined_args()));
        }
        Ok(())
    }

    fn reload(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, _: &ParsedCommand) -> Result<(), BotError> {
        self.data = load_json(self.store.as_ref(), &self.key)?.unwrap_or_default();
        info!("Conversation data reloaded from {}", self.key);

        let data = &self.data;
        let text = format!(
            "会話データを読み込んだよ！\nおはよう会話が、{}件\nおやすみ会話が、{}件\nおみくじデータが、{}件\nおかえりの言葉が、{}件\nただいまの言葉が、{}件\nあったよ！",
            data.ohayo.len(),
            data.oyasumi.len(),
            data.omikuji.len(),
            data.okaeri.len(),
            data.tadaima.len()
        );
        reply(ctx, message, text);
        Ok(())
    }

    fn show_tadaima_list(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, _: &ParsedCommand) -> Result<(), BotError> {
        self.show_list(ctx, message, Phrase::Tadaima)
    }

    fn show_okaeri_list(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, _: &ParsedCommand) -> Result<(), BotError> {
        self.show_list(ctx, message, Phrase::Okaeri)
    }

    fn learn_tadaima(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        self.learn(ctx, message, parsed, Phrase::Tadaima)
    }

    fn learn_okaeri(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        self.learn(ctx, message, parsed, Phrase::Okaeri)
    }

    fn forget_tadaima(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        self.forget(ctx, message, parsed, Phrase::Tadaima)
    }

    fn forget_okaeri(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        self.forget(ctx, message, parsed, Phrase::Okaeri)
    }

    fn show_list(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, phrase: Phrase) -> Result<(), BotError> {
        let list = phrase.list(&mut self.data);
        if list.is_empty() {
            reply(ctx, message, format!("ごめんなさい、{}リストが空っぽなんだ。。。", phrase.label()));
            return Ok(());
        }

        let mut text = format!("私が知ってる{}の言葉リストだよ！\n", phrase.label());
        for (i, item) in list.iter().enumerate() {
            text.push_str(&format!("[{:>2}]{}\n", i, item));
        }
        reply(ctx, message, text);
        Ok(())
    }

    fn learn(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        message: &InboundMessage,
        parsed: &ParsedCommand,
        phrase: Phrase,
    ) -> Result<(), BotError> {
        let Some(word) = parsed.arg(0) else {
            reply(ctx, message, format!("何の{}の言葉を覚えればいいの？", phrase.label()));
            return Ok(());
        };

        phrase.list(&mut self.data).push(word.to_string());
        self.save()?;
        info!("Learned {} phrase: {}", phrase.label(), word);
        reply(
            ctx,
            message,
            format!("陽菜、'{}'が{}の挨拶だっていうのを覚えたよ！", word, phrase.label()),
        );
        Ok(())
    }

    fn forget(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        message: &InboundMessage,
        parsed: &ParsedCommand,
        phrase: Phrase,
    ) -> Result<(), BotError> {
        let Some(arg) = parsed.arg(0) else {
            reply(ctx, message, format!("何の{}の言葉を忘れればいいの？", phrase.label()));
            return Ok(());
        };
        let Ok(index) = arg.parse::<usize>() else {
            reply(ctx, message, "うーん、教えてもらった文字が数字なのかわからないや");
            return Ok(());
        };

        let list = phrase.list(&mut self.data);
        if index >= list.len() {
            reply(ctx, message, "教えてくれた番号に言葉がなかったよ？");
            return Ok(());
        }
        let word = list.remove(index);
        self.save()?;
        info!("Forgot {} phrase: {}", phrase.label(), word);
        reply(ctx, message, format!("陽菜、'{}'を忘れちゃった！", word));
        Ok(())
    }
}

impl ApplicationService for KaiwaService {
    fn update(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), BotError> {
        for message in ctx.received() {
            if message.is_from_bot() || !self.data.is_tadaima(&message.content) {
                continue;
            }
            if self.data.okaeri.is_empty() {
                continue;
            }
            let okaeri = pick(&mut self.rng, &self.data.okaeri);
            reply(ctx, message, okaeri);
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
