//! Contexts handed to services while they run on the loop thread

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::messaging::{CommandParser, MessagePost};
use crate::domain::entities::{ChannelId, ChannelRef, Guild, InboundMessage, Permission, ReactionEvent, Role, RoleId, User, UserId};
use crate::services::ServiceRegistry;

/// Supervisor and sub-supervisors allowed to run restricted commands
#[derive(Debug, Clone)]
pub struct Permissions {
    supervisor: UserId,
    sub_supervisors: Vec<UserId>,
    supervisor_name: String,
    not_permitted: String,
}

impl Permissions {
    pub fn new(supervisor: UserId, sub_supervisors: Vec<UserId>) -> Self {
        Self {
            supervisor,
            sub_supervisors,
            supervisor_name: "管理者".to_string(),
            not_permitted: "ごめんなさい、%SV_NAME%以外の命令は聞けないの。".to_string(),
        }
    }

    /// Set the supervisor's display name and the not-permitted template
    pub fn with_messages(mut self, supervisor_name: impl Into<String>, not_permitted: impl Into<String>) -> Self {
        self.supervisor_name = supervisor_name.into();
        self.not_permitted = not_permitted.into();
        self
    }

    pub fn supervisor(&self) -> UserId {
        self.supervisor
    }

    pub fn sub_supervisors(&self) -> &[UserId] {
        &self.sub_supervisors
    }

    pub fn is_supervisor(&self, user: UserId) -> bool {
        user == self.supervisor
    }

    pub fn is_sub_supervisor(&self, user: UserId) -> bool {
        self.sub_supervisors.contains(&user)
    }

    pub fn allows(&self, user: UserId, permission: Permission) -> bool {
        match permission {
            Permission::Anyone => true,
            Permission::Supervisor => self.is_supervisor(user),
            Permission::SupervisorOrSub => self.is_supervisor(user) || self.is_sub_supervisor(user),
        }
    }

    /// Returns `false` if already present
    pub fn add_sub_supervisor(&mut self, user: UserId) -> bool {
        if self.is_sub_supervisor(user) {
            return false;
        }
        self.sub_supervisors.push(user);
        true
    }

    /// Returns `false` if absent
    pub fn remove_sub_supervisor(&mut self, user: UserId) -> bool {
        let before = self.sub_supervisors.len();
        self.sub_supervisors.retain(|&id| id != user);
        before != self.sub_supervisors.len()
    }

    pub fn not_permitted_message(&self) -> String {
        self.not_permitted.replace("%SV_NAME%", &self.supervisor_name)
    }
}

/// Loop timing exposed to services
#[derive(Debug, Clone)]
pub struct FrameStats {
    pub started_at: Instant,
    pub last_frame: Duration,
    pub frames: u64,
}

impl FrameStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            last_frame: Duration::ZERO,
            frames: 0,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Requests the loop to stop after the current frame
#[derive(Clone)]
pub struct QuitHandle(Arc<dyn Fn() + Send + Sync>);

impl QuitHandle {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn request(&self) {
        (self.0)()
    }
}

impl std::fmt::Debug for QuitHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("QuitHandle")
    }
}

/// Handed to [`crate::services::ApplicationService::startup`]
pub struct StartupContext<'a> {
    pub parser: &'a mut CommandParser,
}

/// Everything a service may see or touch during a frame
pub struct ServiceContext<'a> {
    pub(crate) post: MessagePost<'a>,
    pub(crate) parser: &'a CommandParser,
    pub(crate) guilds: &'a [Guild],
    pub(crate) permissions: &'a mut Permissions,
    pub(crate) services: &'a mut ServiceRegistry,
    pub(crate) bot_user: Option<&'a User>,
    pub(crate) stats: &'a FrameStats,
    pub(crate) now: DateTime<Utc>,
    pub(crate) quit: &'a QuitHandle,
}

impl<'a> ServiceContext<'a> {
    pub fn post(&mut self) -> &mut MessagePost<'a> {
        &mut self.post
    }

    pub fn received(&self) -> &'a [InboundMessage] {
        self.post.received()
    }

    pub fn reactions(&self) -> &'a [ReactionEvent] {
        self.post.reactions()
    }

    pub fn parser(&self) -> &'a CommandParser {
        self.parser
    }

    pub fn guilds(&self) -> &'a [Guild] {
        self.guilds
    }

    /// Find a channel across every known guild
    pub fn find_channel(&self, id: ChannelId) -> Option<&'a ChannelRef> {
        self.guilds.iter().find_map(|g| g.channel(id))
    }

    pub fn find_role(&self, id: RoleId) -> Option<(&'a Guild, &'a Role)> {
        self.guilds.iter().find_map(|g| g.role(id).map(|r| (g, r)))
    }

    pub fn permissions(&self) -> &Permissions {
        self.permissions
    }

    pub fn permissions_mut(&mut self) -> &mut Permissions {
        self.permissions
    }

    /// Other services. The one currently running is not reachable here.
    pub fn services(&mut self) -> &mut ServiceRegistry {
        self.services
    }

    pub fn bot_user(&self) -> Option<&'a User> {
        self.bot_user
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn last_frame(&self) -> Duration {
        self.stats.last_frame
    }

    pub fn uptime(&self) -> Duration {
        self.stats.uptime()
    }

    pub fn frames(&self) -> u64 {
        self.stats.frames
    }

    pub fn quit(&self) {
        self.quit.request()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::application::messaging::Outbound;
    use crate::domain::entities::{ChannelId, GatewayAction, GuildId};

    /// Owns one frame's worth of loop state so services can be driven directly
    pub(crate) struct Harness {
        pub inbound: Vec<InboundMessage>,
        pub reactions: Vec<ReactionEvent>,
        pub outbound: Vec<Outbound>,
        pub parser: CommandParser,
        pub guilds: Vec<Guild>,
        pub permissions: Permissions,
        pub services: ServiceRegistry,
        pub bot_user: User,
        pub stats: FrameStats,
        pub now: DateTime<Utc>,
        quit: QuitHandle,
        quit_flag: Arc<AtomicBool>,
        next_id: u64,
    }

    impl Harness {
        pub const SUPERVISOR: UserId = 1000;
        pub const SUB: UserId = 1001;
        pub const GUILD: GuildId = 100;
        pub const CHANNEL: ChannelId = 10;
        pub const ROLE: RoleId = 500;

        pub fn new() -> Self {
            let quit_flag = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&quit_flag);
            Self {
                inbound: Vec::new(),
                reactions: Vec::new(),
                outbound: Vec::new(),
                parser: CommandParser::new(["はるなちゃん、", "!HB:"]),
                guilds: vec![Guild::new(Self::GUILD, "港町")
                    .with_channel(Self::CHANNEL, "general")
                    .with_channel(11, "jihou")
                    .with_role(Self::ROLE, "囲碁部")],
                permissions: Permissions::new(Self::SUPERVISOR, vec![Self::SUB]),
                services: ServiceRegistry::new(),
                bot_user: User::new(1, "haruna").as_bot(),
                stats: FrameStats::new(),
                now: Utc::now(),
                quit: QuitHandle::new(move || flag.store(true, Ordering::SeqCst)),
                quit_flag,
                next_id: 1,
            }
        }

        pub fn channel(&self) -> ChannelRef {
            ChannelRef::new(Self::CHANNEL, "general").in_guild(Self::GUILD)
        }

        /// Build a message without buffering it
        pub fn message(&mut self, author: UserId, text: &str) -> InboundMessage {
            self.next_id += 1;
            InboundMessage::new(self.next_id, User::new(author, format!("user{}", author)), self.channel(), text)
        }

        /// Buffer a message for the next [`Harness::context`]
        pub fn receive(&mut self, author: UserId, text: &str) -> InboundMessage {
            let msg = self.message(author, text);
            self.inbound.push(msg.clone());
            msg
        }

        pub fn context(&mut self) -> ServiceContext<'_> {
            ServiceContext {
                post: MessagePost::new(&self.inbound, &self.reactions, &mut self.outbound),
                parser: &self.parser,
                guilds: &self.guilds,
                permissions: &mut self.permissions,
                services: &mut self.services,
                bot_user: Some(&self.bot_user),
                stats: &self.stats,
                now: self.now,
                quit: &self.quit,
            }
        }

        /// Rendered outbound messages in queue order
        pub fn replies(&self) -> Vec<String> {
            self.outbound
                .iter()
                .filter_map(Outbound::as_message)
                .map(|m| m.render())
                .collect()
        }

        pub fn actions(&self) -> Vec<GatewayAction> {
            self.outbound
                .iter()
                .filter_map(|o| match o {
                    Outbound::Action(a) => Some(a.clone()),
                    Outbound::Message(_) => None,
                })
                .collect()
        }

        /// Start a new frame: drop buffered input and queued output
        pub fn clear(&mut self) {
            self.inbound.clear();
            self.reactions.clear();
            self.outbound.clear();
        }

        pub fn quit_requested(&self) -> bool {
            self.quit_flag.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn permissions_follow_the_sub_supervisor_list() {
        let mut perms = Permissions::new(1, vec![]);
        assert!(perms.allows(1, Permission::Supervisor));
        assert!(!perms.allows(2, Permission::SupervisorOrSub));
        assert!(perms.add_sub_supervisor(2));
        assert!(!perms.add_sub_supervisor(2));
        assert!(perms.allows(2, Permission::SupervisorOrSub));
        assert!(!perms.allows(2, Permission::Supervisor));
        assert!(perms.remove_sub_supervisor(2));
        assert!(!perms.remove_sub_supervisor(2));
    }

    #[test]
    fn not_permitted_message_fills_supervisor_name() {
        let perms = Permissions::new(1, vec![]).with_messages("しのあ", "%SV_NAME%さんだけだよ");
        assert_eq!(perms.not_permitted_message(), "しのあさんだけだよ");
    }

    #[test]
    fn quit_goes_through_the_handle() {
        let mut harness = Harness::new();
        harness.context().quit();
        assert!(harness.quit_requested());
    }
}
