//! Reaction replies - answers registered custom stamps in one channel

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{reply, ApplicationService, ServiceKey};
use crate::application::context::ServiceContext;
use crate::application::errors::{BotError, CommandError};
use crate::application::messaging::{Command, CommandTable};
use crate::domain::entities::{ChannelId, InboundMessage, ParsedCommand, Permission};
use crate::domain::traits::StateStore;
use crate::infrastructure::storage::{load_json, save_json};

pub const SAVE_KEY: &str = "reaction_reply.json";

static STAMP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<:([a-zA-Z0-9_-]+):([0-9]+)>").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReactionReplyData {
    pub channel_id: Option<ChannelId>,
    pub stamps: BTreeSet<u64>,
    pub messages: Vec<String>,
}

/// Ids of every custom stamp in `content`, in order of appearance
pub fn stamp_ids(content: &str) -> Vec<u64> {
    STAMP_RE
        .captures_iter(content)
        .filter_map(|caps| caps.get(2)?.as_str().parse().ok())
        .collect()
}

static COMMANDS: Lazy<CommandTable<ReactionReplyService>> = Lazy::new(|| {
    CommandTable::new()
        .with(
            Command::new("ここで喘いで", ReactionReplyService::set_channel)
                .with_permission(Permission::SupervisorOrSub),
        )
        .with(
            Command::new("反応するスタンプの登録", ReactionReplyService::add_stamp)
                .with_permission(Permission::SupervisorOrSub),
        )
        .with(
            Command::new("反応するメッセージの登録", ReactionReplyService::add_message)
                .with_permission(Permission::SupervisorOrSub),
        )
        .with(
            Command::new("反応するメッセージの一覧", ReactionReplyService::list_messages)
                .with_permission(Permission::SupervisorOrSub),
        )
        .with(
            Command::new("反応するメッセージの削除", ReactionReplyService::remove_message)
                .with_permission(Permission::SupervisorOrSub),
        )
});

pub struct ReactionReplyService {
    store: Box<dyn StateStore>,
    data: ReactionReplyData,
    rng: StdRng,
}

impl ServiceKey for ReactionReplyService {
    const ID: &'static str = "reaction-reply";
}

impl ReactionReplyService {
    pub fn new(store: Box<dyn StateStore>) -> Result<Self, BotError> {
        let data = load_json(store.as_ref(), SAVE_KEY)?.unwrap_or_default();
        Ok(Self {
            store,
            data,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn data(&self) -> &ReactionReplyData {
        &self.data
    }

    fn save(&self) -> Result<(), BotError> {
        save_json(self.store.as_ref(), SAVE_KEY, &self.data)?;
        Ok(())
    }

    fn is_watched(&self, message: &InboundMessage) -> bool {
        self.data.channel_id == Some(message.channel.id)
            && stamp_ids(&message.content).iter().any(|id| self.data.stamps.contains(id))
    }

    fn set_channel(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, _: &ParsedCommand) -> Result<(), BotError> {
        self.data.channel_id = Some(message.channel.id);
        self.save()?;
        info!("Reaction channel set to {}", message.channel.id);
        reply(ctx, message, "わかった！ここでスタンプに反応するね");
        Ok(())
    }

    fn add_stamp(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        let Some(arg) = parsed.arg(0) else {
            return Err(CommandError::InvalidArgs("反応するスタンプを教えてね".to_string()).into());
        };
        let Some(id) = stamp_ids(arg).first().copied() else {
            return Err(CommandError::InvalidArgs("それはスタンプじゃないみたいだよ？".to_string()).into());
        };

        self.data.stamps.insert(id);
        self.save()?;
        reply(ctx, message, "スタンプを覚えたよ！");
        Ok(())
    }

    fn add_message(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        if !parsed.has_args(1) {
            return Err(CommandError::InvalidArgs("反応するメッセージを教えてね".to_string()).into());
        }
        let text = parsed.arguments.join(" ");
        if self.data.messages.contains(&text) {
            reply(ctx, message, "そのメッセージはもう覚えているよ");
            return Ok(());
        }

        self.data.messages.push(text);
        self.save()?;
        reply(ctx, message, "メッセージを覚えたよ！");
        Ok(())
    }

    fn list_messages(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, _: &ParsedCommand) -> Result<(), BotError> {
        if self.data.messages.is_empty() {
            reply(ctx, message, "反応するメッセージはまだ登録されていないよ");
            return Ok(());
        }
        let mut text = String::from("反応するメッセージの一覧は以下の通りです\n");
        for (i, item) in self.data.messages.iter().enumerate() {
            text.push_str(&format!("[{}]{}\n", i, item));
        }
        reply(ctx, message, text);
        Ok(())
    }

    fn remove_message(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        let Some(index) = parsed.arg(0).and_then(|i| i.parse::<usize>().ok()) else {
            return Err(CommandError::InvalidArgs("削除する番号を数字で教えてね".to_string()).into());
        };
        if index >= self.data.messages.len() {
            reply(ctx, message, "教えてくれた番号にメッセージがなかったよ？");
            return Ok(());
        }

        let removed = self.data.messages.remove(index);
        self.save()?;
        reply(ctx, message, format!("'{}'を忘れたよ！", removed));
        Ok(())
    }
}

impl ApplicationService for ReactionReplyService {
    fn update(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), BotError> {
        for message in ctx.received() {
            if message.is_from_bot() || ctx.parser().is_command(&message.content) || !self.is_watched(message) {
                continue;
            }
            let Some(text) = self.data.messages.choose(&mut self.rng).cloned() else {
                debug!("Stamp seen in {} but no reaction registered", message.channel.id);
                continue;
            };
            ctx.post().send(&message.channel, text);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::context::testing::Harness;
    use crate::infrastructure::storage::MemoryStore;

    fn service(store: &MemoryStore) -> ReactionReplyService {
        ReactionReplyService::new(Box::new(store.clone()))
            .unwrap()
            .with_rng(StdRng::seed_from_u64(3))
    }

    #[test]
    fn stamp_ids_are_read_from_custom_emoji() {
        assert_eq!(stamp_ids("やった <:haruna_smile:123> と <:a-b:456>"), vec![123, 456]);
        assert!(stamp_ids("<a:animated:123> :smile:").is_empty());
    }

    #[test]
    fn registered_stamp_in_the_channel_gets_one_reaction() {
        let store = MemoryStore::new();
        let mut reaction = service(&store);
        let mut harness = Harness::new();
        harness.receive(Harness::SUB, "はるなちゃん、ここで喘いで");
        harness.receive(Harness::SUB, "はるなちゃん、反応するスタンプの登録 <:haruna_smile:123>");
        harness.receive(Harness::SUB, "はるなちゃん、反応するメッセージの登録 ひゃあっ");
        reaction.update(&mut harness.context()).unwrap();
        assert_eq!(reaction.data().stamps, BTreeSet::from([123]));

        harness.clear();
        harness.receive(5, "<:haruna_smile:123><:haruna_smile:123>");
        harness.receive(5, "<:other:999>");
        reaction.update(&mut harness.context()).unwrap();

        assert_eq!(harness.replies(), vec!["ひゃあっ".to_string()]);
    }

    #[test]
    fn other_channels_are_ignored() {
        let store = MemoryStore::new();
        let mut reaction = service(&store);
        reaction.data.channel_id = Some(11);
        reaction.data.stamps.insert(123);
        reaction.data.messages.push("ひゃあっ".to_string());
        let mut harness = Harness::new();
        harness.receive(5, "<:haruna_smile:123>");

        reaction.update(&mut harness.context()).unwrap();

        assert!(harness.replies().is_empty());
    }

    #[test]
    fn messages_are_listed_deduplicated_and_removed() {
        let store = MemoryStore::new();
        let mut reaction = service(&store);
        let mut harness = Harness::new();
        harness.receive(Harness::SUB, "はるなちゃん、反応するメッセージの登録 ひゃあっ");
        harness.receive(Harness::SUB, "はるなちゃん、反応するメッセージの登録 ひゃあっ");
        harness.receive(Harness::SUB, "はるなちゃん、反応するメッセージの登録 んっ");
        harness.receive(Harness::SUB, "はるなちゃん、反応するメッセージの一覧");
        harness.receive(Harness::SUB, "はるなちゃん、反応するメッセージの削除 0");
        harness.receive(Harness::SUB, "はるなちゃん、反応するメッセージの削除 9");
        harness.receive(Harness::SUB, "はるなちゃん、反応するスタンプの登録 smile");

        reaction.update(&mut harness.context()).unwrap();

        let replies = harness.replies();
        assert!(replies[1].ends_with("そのメッセージはもう覚えているよ"));
        assert_eq!(replies[3], "<@1001> 反応するメッセージの一覧は以下の通りです\n[0]ひゃあっ\n[1]んっ\n");
        assert!(replies[4].ends_with("'ひゃあっ'を忘れたよ！"));
        assert!(replies[5].ends_with("教えてくれた番号にメッセージがなかったよ？"));
        assert!(replies[6].ends_with("それはスタンプじゃないみたいだよ？"));
        assert_eq!(reaction.data().messages, vec!["んっ".to_string()]);
        let saved: ReactionReplyData = load_json(&store, SAVE_KEY).unwrap().unwrap();
        assert_eq!(saved.messages, vec!["んっ".to_string()]);
    }

    #[test]
    fn strangers_cannot_register() {
        let store = MemoryStore::new();
        let mut reaction = service(&store);
        let mut harness = Harness::new();
        harness.receive(5, "はるなちゃん、反応するメッセージの登録 だめ");

        reaction.update(&mut harness.context()).unwrap();

        assert!(reaction.data().messages.is_empty());
        assert_eq!(harness.replies().len(), 1);
    }
}
