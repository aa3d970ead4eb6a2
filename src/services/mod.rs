//! Services - Independent bot features ticked once per frame

pub mod gaoo;
pub mod haipai;
pub mod kaiwa;
pub mod paifu_detect;
pub mod pin_proxy;
pub mod quest;
pub mod reaction_reply;
pub mod registry;
pub mod role_club;
pub mod schedule;
pub mod status;
pub mod system_control;
pub mod time_signal;
pub mod trait_def;
pub mod url_convert;

pub use gaoo::GaooService;
pub use haipai::HaipaiService;
pub use kaiwa::KaiwaService;
pub use paifu_detect::PaifuDetectService;
pub use pin_proxy::PinProxyService;
pub use quest::QuestService;
pub use reaction_reply::ReactionReplyService;
pub use registry::ServiceRegistry;
pub use role_club::RoleClubService;
pub use schedule::ScheduleService;
pub use status::StatusService;
pub use system_control::SystemControlService;
pub use time_signal::TimeSignalService;
pub use trait_def::{ApplicationService, AsAny, ServiceKey};
pub use url_convert::UrlConvertService;

use chrono::{FixedOffset, Offset, Utc};

use crate::application::context::ServiceContext;
use crate::domain::entities::{InboundMessage, UserId};

const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Japan Standard Time, the bot's local clock
pub fn jst() -> FixedOffset {
    FixedOffset::east_opt(JST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Reply to `message`, addressed with the author's quest suffix when the
/// quest service is registered
pub fn reply(ctx: &mut ServiceContext<'_>, message: &InboundMessage, text: impl Into<String>) {
    let suffix = ctx
        .services()
        .get_mut::<QuestService>()
        .map(|quest| quest.player(message).mention_suffix());
    match suffix {
        Some(suffix) => ctx.post().reply_with_suffix(message, text, suffix),
        None => ctx.post().reply(message, text),
    }
}

/// Accept a bare id or a `<@id>` / `<@!id>` mention
pub fn parse_user_id(text: &str) -> Option<UserId> {
    let trimmed = text
        .strip_prefix("<@")
        .and_then(|t| t.strip_suffix('>'))
        .map(|t| t.trim_start_matches('!'))
        .unwrap_or(text);
    trimmed.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_ids_from_mentions() {
        assert_eq!(parse_user_id("12345"), Some(12345));
        assert_eq!(parse_user_id("<@12345>"), Some(12345));
        assert_eq!(parse_user_id("<@!12345>"), Some(12345));
        assert_eq!(parse_user_id("しのあ"), None);
    }

    #[test]
    fn jst_is_nine_hours_ahead() {
        assert_eq!(jst().local_minus_utc(), 9 * 3600);
    }
}
