//! Haipai - deals a random mahjong starting hand

use std::fmt;

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::{reply, ApplicationService, ServiceKey};
use crate::application::context::ServiceContext;
use crate::application::errors::BotError;
use crate::application::messaging::{Command, CommandTable};
use crate::domain::entities::{InboundMessage, ParsedCommand};

/// Argument switching the reply to plain text notation
pub const TEXT_MODE: &str = "文字列として";
pub const HAND_SIZE: usize = 13;
const TILE_BACK: char = '\u{1F02B}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Suit {
    Man,
    Pin,
    Sou,
    Honor,
}

/// One tile. Honors use ranks 0-3 for winds and 4-6 for white, green, red.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tile {
    pub suit: Suit,
    pub rank: u8,
    pub red: bool,
}

impl Tile {
    pub fn new(suit: Suit, rank: u8) -> Self {
        Self { suit, rank, red: false }
    }

    pub fn red_five(suit: Suit) -> Self {
        Self { suit, rank: 5, red: true }
    }

    /// Unicode mahjong tile glyph
    pub fn glyph(&self) -> char {
        let code = match (self.suit, self.rank) {
            (Suit::Man, r) => 0x1F007 + u32::from(r) - 1,
            (Suit::Sou, r) => 0x1F010 + u32::from(r) - 1,
            (Suit::Pin, r) => 0x1F019 + u32::from(r) - 1,
            (Suit::Honor, 4) => 0x1F006,
            (Suit::Honor, 5) => 0x1F005,
            (Suit::Honor, 6) => 0x1F004,
            (Suit::Honor, r) => 0x1F000 + u32::from(r),
        };
        char::from_u32(code).unwrap_or(TILE_BACK)
    }

    /// Text notation: `1m`, `0p` for a red five, `東`
    pub fn notation(&self) -> String {
        const HONORS: [&str; 7] = ["東", "南", "西", "北", "白", "發", "中"];
        let rank = if self.red { 0 } else { self.rank };
        match self.suit {
            Suit::Man => format!("{}m", rank),
            Suit::Pin => format!("{}p", rank),
            Suit::Sou => format!("{}s", rank),
            Suit::Honor => HONORS.get(usize::from(self.rank)).copied().unwrap_or("?").to_string(),
        }
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.glyph())
    }
}

/// Full 136-tile set with one red five per numbered suit
pub fn deck() -> Vec<Tile> {
    let mut tiles = Vec::with_capacity(136);
    for suit in [Suit::Man, Suit::Pin, Suit::Sou] {
        for rank in 1..=9 {
            for copy in 0..4 {
                tiles.push(if rank == 5 && copy == 0 {
                    Tile::red_five(suit)
                } else {
                    Tile::new(suit, rank)
                });
            }
        }
    }
    for rank in 0..7 {
        for _ in 0..4 {
            tiles.push(Tile::new(Suit::Honor, rank));
        }
    }
    tiles
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deal {
    pub hand: Vec<Tile>,
    pub draw: Tile,
    pub dora_indicator: Tile,
    pub round: &'static str,
    pub number: u8,
    pub seat: &'static str,
}

impl Deal {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let mut tiles = deck();
        tiles.shuffle(rng);

        let mut hand = tiles[..HAND_SIZE].to_vec();
        hand.sort();
        Self {
            hand,
            draw: tiles[HAND_SIZE],
            dora_indicator: tiles[tiles.len() - 5],
            round: if rng.gen_bool(0.5) { "東" } else { "南" },
            number: rng.gen_range(1..=4),
            seat: if rng.gen_bool(0.5) { "親" } else { "子" },
        }
    }

    pub fn render(&self, as_text: bool) -> String {
        let show = |tile: &Tile| if as_text { tile.notation() } else { tile.glyph().to_string() };
        let hand: String = self.hand.iter().map(show).collect();
        format!(
            "今回の配牌はこれだよ！\n{}{}局 {}\nドラ表示牌：{}\n{}　ツモ：{}",
            self.round,
            self.number,
            self.seat,
            show(&self.dora_indicator),
            hand,
            show(&self.draw)
        )
    }
}

static COMMANDS: Lazy<CommandTable<HaipaiService>> = Lazy::new(|| {
    CommandTable::new().with(Command::new("配牌して", HaipaiService::deal).with_aliases(["はいぱいして"]))
});

pub struct HaipaiService {
    rng: StdRng,
}

impl ServiceKey for HaipaiService {
    const ID: &'static str = "haipai";
}

impl Default for HaipaiService {
    fn default() -> Self {
        Self::new()
    }
}

impl HaipaiService {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    fn deal(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        let as_text = parsed.arg(0) == Some(TEXT_MODE);
        let deal = Deal::random(&mut self.rng);
        reply(ctx, message, deal.render(as_text));
        Ok(())
    }
}

impl ApplicationService for HaipaiService {
    fn update(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), BotError> {
        COMMANDS.dispatch_all(self, ctx);
        Ok(())
    }
}
