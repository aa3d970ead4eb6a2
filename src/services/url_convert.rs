//! Amazon URL shortener

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::{reply, ApplicationService, ServiceKey};
use crate::application::context::ServiceContext;
use crate::application::errors::BotError;
use crate::application::messaging::{Command, CommandTable};
use crate::domain::entities::{InboundMessage, ParsedCommand};

const AMAZON_HOST: &str = "www.amazon.co.jp";

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.\-]*)://(?P<host>[^/?#\s:]+)(?::\d+)?(?P<path>/[^?#\s]*)?(?:[?#]\S*)?$")
        .unwrap()
});

static PRODUCT_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap());

static COMMANDS: Lazy<CommandTable<UrlConvertService>> = Lazy::new(|| {
    CommandTable::new().with(
        Command::new("AmazonURLを変換して", UrlConvertService::convert).with_aliases(["アマゾンURLを変換して"]),
    )
});

/// Why a URL could not be shortened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    Malformed,
    NotAmazon,
    NoProductCode,
}

impl ConvertError {
    fn reply(&self) -> &'static str {
        match self {
            ConvertError::Malformed => "うーん、教えてもらったURLはちゃんとした形式じゃないみたいだよ",
            ConvertError::NotAmazon => "もしかして、AmazonのURLじゃなかったりする？陽菜、わかるURLはAmazonだけだよ",
            ConvertError::NoProductCode => "ごめんなさい、商品コードを見つけられなかったから、変換出来なかったの。",
        }
    }
}

/// Canonical short form of an amazon.co.jp product URL
pub fn shorten(url: &str) -> Result<String, ConvertError> {
    let url = url.trim().trim_start_matches('<').trim_end_matches('>');
    let caps = URL_RE.captures(url).ok_or(ConvertError::Malformed)?;
    let host = caps.name("host").map(|m| m.as_str()).unwrap_or_default();
    if !host.eq_ignore_ascii_case(AMAZON_HOST) {
        return Err(ConvertError::NotAmazon);
    }

    let path = caps.name("path").map(|m| m.as_str()).unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let code = segments.iter().enumerate().find_map(|(i, segment)| match *segment {
        "dp" => segments.get(i + 1),
        "gp" if segments.get(i + 1) == Some(&"product") => segments.get(i + 2),
        _ => None,
    });

    match code {
        Some(code) if PRODUCT_CODE_RE.is_match(code) => Ok(format!("https://{}/dp/{}", AMAZON_HOST, code)),
        _ => Err(ConvertError::NoProductCode),
    }
}

#[derive(Debug, Default)]
pub struct UrlConvertService;

impl ServiceKey for UrlConvertService {
    const ID: &'static str = "url-convert";
}

impl UrlConvertService {
    pub fn new() -> Self {
        Self
    }

    fn convert(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        let Some(url) = parsed.arg(0) else {
            reply(ctx, message, "どのAmazonURLを変換すればいいの？");
            return Ok(());
        };

        let text = match shorten(url) {
            Ok(short) => short,
            Err(e) => {
                tracing::debug!("Could not shorten {}: {:?}", url, e);
                e.reply().to_string()
            }
        };
        reply(ctx, message, text);
        Ok(())
    }
}

impl ApplicationService for UrlConvertService {
    fn update(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), BotError> {
        COMMANDS.dispatch_all(self, ctx);
        Ok(())
    }
}
