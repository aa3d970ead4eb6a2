//! Gaoo - shuffles a four-piece stamp picture, on request and every half past

use chrono::{DateTime, Duration, FixedOffset, Timelike};
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

use super::{jst, reply, ApplicationService, ServiceKey};
use crate::application::context::ServiceContext;
use crate::application::errors::BotError;
use crate::application::messaging::{Command, CommandTable};
use crate::domain::entities::{ChannelRef, InboundMessage, ParsedCommand, Permission};

pub const TILES: [&str; 4] = [
    "<:Xinia_Halloween_1L:749123315146424332>",
    "<:Xinia_Halloween_1R:749123315729301694>",
    "<:Xinia_Halloween_2L:749123315695616060>",
    "<:Xinia_Halloween_2R:749123315700072548>",
];

const POST_MINUTE: u32 = 30;

/// First HH:30 strictly after `now`
pub fn next_post_after(now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let half_past = now
        .with_minute(POST_MINUTE)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    if half_past > now {
        half_past
    } else {
        half_past + Duration::hours(1)
    }
}

/// Two rows of two tiles
pub fn render(tiles: &[&str; 4]) -> String {
    format!("{}{}\n{}{}", tiles[0], tiles[1], tiles[2], tiles[3])
}

static COMMANDS: Lazy<CommandTable<GaooService>> = Lazy::new(|| {
    CommandTable::new()
        .with(
            Command::new("抽選はここでお願い", GaooService::set_channel)
                .with_permission(Permission::SupervisorOrSub),
        )
        .with(Command::new("がおー", GaooService::gaoo))
});

/// The channel lives in memory only and is forgotten on restart
pub struct GaooService {
    channel: Option<ChannelRef>,
    next_post: Option<DateTime<FixedOffset>>,
    rng: StdRng,
}

impl ServiceKey for GaooService {
    const ID: &'static str = "gaoo";
}

impl Default for GaooService {
    fn default() -> Self {
        Self::new()
    }
}

impl GaooService {
    pub fn new() -> Self {
        Self {
            channel: None,
            next_post: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn next_post(&self) -> Option<DateTime<FixedOffset>> {
        self.next_post
    }

    fn shuffled(&mut self) -> String {
        let mut tiles = TILES;
        tiles.shuffle(&mut self.rng);
        render(&tiles)
    }

    fn tick(&mut self, ctx: &mut ServiceContext<'_>) {
        let now = ctx.now().with_timezone(&jst());
        let due = *self.next_post.get_or_insert_with(|| next_post_after(now));
        if now < due {
            return;
        }
        self.next_post = Some(next_post_after(now));
        let Some(channel) = self.channel.clone() else {
            return;
        };
        let text = self.shuffled();
        ctx.post().send(&channel, text);
    }

    fn set_channel(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, _: &ParsedCommand) -> Result<(), BotError> {
        self.channel = Some(message.channel.clone());
        info!("Gaoo channel set to {}", message.channel.id);
        reply(ctx, message, "わかった！ここで抽選するね");
        Ok(())
    }

    fn gaoo(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, _: &ParsedCommand) -> Result<(), BotError> {
        let text = self.shuffled();
        ctx.post().send(&message.channel, text);
        Ok(())
    }
}

impl ApplicationService for GaooService {
    fn update(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), BotError> {
        COMMANDS.dispatch_all(self, ctx);
        self.tick(ctx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::context::testing::Harness;

    fn at(text: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(text).unwrap()
    }

    fn is_arrangement(text: &str) -> bool {
        TILES.iter().all(|t| text.contains(t)) && text.lines().count() == 2
    }

    #[test]
    fn posts_land_on_half_past() {
        assert_eq!(next_post_after(at("2024-05-01T08:10:00+09:00")), at("2024-05-01T08:30:00+09:00"));
        assert_eq!(next_post_after(at("2024-05-01T08:30:00+09:00")), at("2024-05-01T09:30:00+09:00"));
        assert_eq!(next_post_after(at("2024-05-01T23:45:00+09:00")), at("2024-05-02T00:30:00+09:00"));
    }

    #[test]
    fn render_is_two_rows() {
        assert_eq!(render(&["a", "b", "c", "d"]), "ab\ncd");
    }

    #[test]
    fn anyone_can_ask_for_a_picture() {
        let mut gaoo = GaooService::new().with_rng(StdRng::seed_from_u64(9));
        let mut harness = Harness::new();
        harness.receive(5, "はるなちゃん、がおー");

        gaoo.update(&mut harness.context()).unwrap();

        let replies = harness.replies();
        assert_eq!(replies.len(), 1);
        assert!(is_arrangement(&replies[0]));
    }

    #[test]
    fn half_past_post_needs_a_channel() {
        let mut gaoo = GaooService::new().with_rng(StdRng::seed_from_u64(9));
        let mut harness = Harness::new();
        harness.now = at("2024-05-01T08:10:00+09:00").with_timezone(&chrono::Utc);
        gaoo.update(&mut harness.context()).unwrap();
        assert_eq!(gaoo.next_post(), Some(at("2024-05-01T08:30:00+09:00")));

        harness.now = at("2024-05-01T08:31:00+09:00").with_timezone(&chrono::Utc);
        gaoo.update(&mut harness.context()).unwrap();
        assert!(harness.replies().is_empty());
        assert_eq!(gaoo.next_post(), Some(at("2024-05-01T09:30:00+09:00")));

        harness.receive(Harness::SUB, "はるなちゃん、抽選はここでお願い");
        gaoo.update(&mut harness.context()).unwrap();
        harness.clear();
        harness.now = at("2024-05-01T09:30:00+09:00").with_timezone(&chrono::Utc);
        gaoo.update(&mut harness.context()).unwrap();

        let replies = harness.replies();
        assert_eq!(replies.len(), 1);
        assert!(is_arrangement(&replies[0]));
    }
}
