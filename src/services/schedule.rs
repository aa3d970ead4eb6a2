//! Scheduled posts - one-shot or repeating messages at a JST date and time

use chrono::{DateTime, Duration, FixedOffset, Months, NaiveDate, NaiveTime, TimeZone};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{jst, reply, ApplicationService, ServiceKey};
use crate::application::context::ServiceContext;
use crate::application::errors::{BotError, CommandError};
use crate::application::messaging::{Command, CommandTable};
use crate::domain::entities::{ChannelId, InboundMessage, ParsedCommand, Permission};
use crate::domain::traits::StateStore;
use crate::infrastructure::storage::{load_json, save_json};

pub const SAVE_KEY: &str = "schedule.json";

const DATE_FORMATS: &[&str] = &["%Y/%m/%d", "%Y-%m-%d"];
const TIME_FORMATS: &[&str] = &["%H:%M", "%H:%M:%S"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interval {
    OneTime,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Interval {
    /// Anything other than a known keyword is a one-time job
    pub fn from_keyword(word: &str) -> Self {
        match word {
            "毎時" => Interval::Hourly,
            "毎日" => Interval::Daily,
            "毎週" => Interval::Weekly,
            "毎月" => Interval::Monthly,
            "毎年" => Interval::Yearly,
            _ => Interval::OneTime,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Interval::OneTime => "一回だけ",
            Interval::Hourly => "毎時",
            Interval::Daily => "毎日",
            Interval::Weekly => "毎週",
            Interval::Monthly => "毎月",
            Interval::Yearly => "毎年",
        }
    }

    /// The occurrence after `at`. `None` for one-time jobs or past the
    /// calendar's range.
    pub fn step(&self, at: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        match self {
            Interval::OneTime => None,
            Interval::Hourly => at.checked_add_signed(Duration::hours(1)),
            Interval::Daily => at.checked_add_signed(Duration::days(1)),
            Interval::Weekly => at.checked_add_signed(Duration::weeks(1)),
            Interval::Monthly => at.checked_add_months(Months::new(1)),
            Interval::Yearly => at.checked_add_months(Months::new(12)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: u64,
    pub active: bool,
    pub interval: Interval,
    pub at: DateTime<FixedOffset>,
    pub message: String,
    pub channel_id: ChannelId,
}

impl Job {
    /// Move past `now`, deactivating when there is no later occurrence
    fn advance(&mut self, now: DateTime<FixedOffset>) {
        while self.at <= now {
            match self.interval.step(self.at) {
                Some(next) => self.at = next,
                None => {
                    self.active = false;
                    return;
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleData {
    pub next_id: u64,
    pub jobs: Vec<Job>,
}

/// Date and time tokens read as JST
pub fn parse_jst(date: &str, time: &str) -> Option<DateTime<FixedOffset>> {
    let date = DATE_FORMATS.iter().find_map(|f| NaiveDate::parse_from_str(date, f).ok())?;
    let time = TIME_FORMATS.iter().find_map(|f| NaiveTime::parse_from_str(time, f).ok())?;
    jst().from_local_datetime(&date.and_time(time)).single()
}

static COMMANDS: Lazy<CommandTable<ScheduleService>> = Lazy::new(|| {
    CommandTable::new()
        .with(
            Command::new("スケジュールの登録", ScheduleService::add_job)
                .with_permission(Permission::SupervisorOrSub),
        )
        .with(Command::new("スケジュールの確認", ScheduleService::show_jobs))
});

/// Posts registered jobs to the channel they were registered in
pub struct ScheduleService {
    store: Box<dyn StateStore>,
    data: ScheduleData,
}

impl ServiceKey for ScheduleService {
    const ID: &'static str = "schedule";
}

impl ScheduleService {
    pub fn new(store: Box<dyn StateStore>) -> Result<Self, BotError> {
        let data = load_json(store.as_ref(), SAVE_KEY)?.unwrap_or_default();
        Ok(Self { store, data })
    }

    pub fn data(&self) -> &ScheduleData {
        &self.data
    }

    fn save(&self) -> Result<(), BotError> {
        save_json(self.store.as_ref(), SAVE_KEY, &self.data)?;
        Ok(())
    }

    fn tick(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), BotError> {
        let now = ctx.now().with_timezone(&jst());
        let mut changed = false;
        for job in self.data.jobs.iter_mut().filter(|j| j.active && j.at <= now) {
            match ctx.find_channel(job.channel_id) {
                Some(channel) => {
                    info!("Job {} fired in #{}", job.id, channel.name);
                    ctx.post().send(channel, job.message.clone());
                }
                None => debug!("Job {} skipped, channel {} unknown", job.id, job.channel_id),
            }
            job.advance(now);
            changed = true;
        }
        if changed {
            self.save()?;
        }
        Ok(())
    }

    fn add_job(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, parsed: &ParsedCommand) -> Result<(), BotError> {
        if !parsed.has_args(4) {
            return Err(CommandError::InvalidArgs("繰り返し、日付、時間、メッセージの順番で教えてね".to_string()).into());
        }
        let interval = Interval::from_keyword(&parsed.arguments[0]);
        let Some(at) = parse_jst(&parsed.arguments[1], &parsed.arguments[2]) else {
            return Err(CommandError::InvalidArgs("日付と時間は 2024/05/01 09:00 みたいに教えてね".to_string()).into());
        };

        let id = self.data.next_id;
        self.data.next_id += 1;
        self.data.jobs.push(Job {
            id,
            active: true,
            interval,
            at,
            message: parsed.arguments[3..].join(" "),
            channel_id: message.channel.id,
        });
        self.save()?;
        info!("Job {} registered ({}, {})", id, interval.label(), at);
        reply(ctx, message, format!("スケジュールを登録したよ！ JobID={}", id));
        Ok(())
    }

    fn show_jobs(&mut self, ctx: &mut ServiceContext<'_>, message: &InboundMessage, _: &ParsedCommand) -> Result<(), BotError> {
        let mut text = String::from("```\n");
        for job in &self.data.jobs {
            text.push_str(&format!(
                "[{}] {} {} {} {}\n",
                job.id,
                if job.active { "有効" } else { "終了" },
                job.interval.label(),
                job.at.format("%Y/%m/%d %H:%M"),
                job.message
            ));
        }
        text.push_str("```");
        reply(ctx, message, text);
        Ok(())
    }
}

impl ApplicationService for ScheduleService {
    fn update(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), BotError> {
        COMMANDS.dispatch_all(self, ctx);
        self.tick(ctx)
    }

    fn persist(&mut self) -> Result<(), BotError> {
        self.save()
    }

    fn terminate(&mut self) -> Result<(), BotError> {
        self.save()
    }
}
