//! Application core - The single-threaded frame loop
//!
//! A frame drains the event pump, ticks the core hook and every service,
//! clears the per-frame buffers, flushes queued output through the gateway
//! and sleeps for the frame interval. Gateway callbacks only ever touch
//! [`Core`] through tasks posted on the pump.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::context::{FrameStats, Permissions, QuitHandle, ServiceContext, StartupContext};
use super::errors::{BotError, ConfigError};
use super::messaging::{CommandParser, MessagePost, Outbound};
use super::pump::{panic_message, EventPump};
use crate::domain::entities::{Guild, GuildId, InboundMessage, ReactionEvent, User, UserId};
use crate::domain::traits::{EventSink, Gateway, GatewayEvent};
use crate::services::{ApplicationService, ServiceKey, ServiceRegistry};

const PUMP_WAIT: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    NotStarted,
    Running,
    Stopped,
}

/// Runtime settings the loop needs
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub token: String,
    pub prefixes: Vec<String>,
    pub frame_interval: Duration,
    pub supervisor: UserId,
    pub sub_supervisors: Vec<UserId>,
    pub supervisor_name: String,
    pub not_permitted: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            token: String::new(),
            prefixes: Vec::new(),
            frame_interval: Duration::from_millis(10),
            supervisor: 0,
            sub_supervisors: Vec::new(),
            supervisor_name: "管理者".to_string(),
            not_permitted: "ごめんなさい、%SV_NAME%以外の命令は聞けないの。".to_string(),
        }
    }
}

/// Per-application callbacks. Every method defaults to doing nothing.
pub trait ApplicationHooks: Send {
    fn on_logged_in(&mut self, _user: &User) {}

    fn on_logged_out(&mut self) {}

    fn on_join_guild(&mut self, _guild: &Guild) {}

    fn on_leave_guild(&mut self, _guild: GuildId) {}

    fn on_guild_available(&mut self, _guild: &Guild) {}

    /// Runs every frame before the services
    fn update(&mut self, _ctx: &mut ServiceContext<'_>) {}

    fn on_startup_failed(&mut self, _error: &BotError) {}
}

struct NoHooks;

impl ApplicationHooks for NoHooks {}

/// Outcome of [`Application::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub sub_supervisors: Vec<UserId>,
    pub startup_failed: bool,
}

/// Loop state. Only the loop thread touches it.
pub struct Core {
    state: AppState,
    inbound: Vec<InboundMessage>,
    reactions: Vec<ReactionEvent>,
    outbound: Vec<Outbound>,
    guilds: Vec<Guild>,
    parser: CommandParser,
    permissions: Permissions,
    services: ServiceRegistry,
    bot_user: Option<User>,
    stats: FrameStats,
    hooks: Option<Box<dyn ApplicationHooks>>,
    quit: QuitHandle,
    login: Option<Result<User, BotError>>,
}

impl Core {
    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn guilds(&self) -> &[Guild] {
        &self.guilds
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn bot_user(&self) -> Option<&User> {
        self.bot_user.as_ref()
    }

    fn request_stop(&mut self) {
        if self.state == AppState::Running {
            info!("Quit requested");
        }
        self.state = AppState::Stopped;
    }

    fn context(&mut self) -> ServiceContext<'_> {
        ServiceContext {
            post: MessagePost::new(&self.inbound, &self.reactions, &mut self.outbound),
            parser: &self.parser,
            guilds: &self.guilds,
            permissions: &mut self.permissions,
            services: &mut self.services,
            bot_user: self.bot_user.as_ref(),
            stats: &self.stats,
            now: Utc::now(),
            quit: &self.quit,
        }
    }

    fn with_hooks(&mut self, f: impl FnOnce(&mut dyn ApplicationHooks, &mut Core)) {
        let Some(mut hooks) = self.hooks.take() else {
            return;
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(hooks.as_mut(), self))) {
            error!("Application hook panicked: {}", panic_message(payload.as_ref()));
        }
        self.hooks = Some(hooks);
    }

    fn handle_event(&mut self, event: GatewayEvent) {
        debug!("Gateway event: {}", event.as_str());
        match event {
            GatewayEvent::LoggedIn(user) => {
                info!("Logged in as {} ({})", user.username, user.id);
                self.with_hooks(|hooks, _| hooks.on_logged_in(&user));
                self.bot_user = Some(user);
            }
            GatewayEvent::LoggedOut => {
                info!("Logged out");
                self.with_hooks(|hooks, _| hooks.on_logged_out());
            }
            GatewayEvent::GuildJoined(guild) => {
                self.upsert_guild(guild.clone());
                self.with_hooks(|hooks, _| hooks.on_join_guild(&guild));
            }
            GatewayEvent::GuildLeft(id) => {
                self.guilds.retain(|g| g.id != id);
                self.with_hooks(|hooks, _| hooks.on_leave_guild(id));
            }
            GatewayEvent::GuildAvailable(guild) => {
                self.upsert_guild(guild.clone());
                self.with_hooks(|hooks, _| hooks.on_guild_available(&guild));
                self.for_each_service("on_guild_available", |service, ctx| {
                    service.on_guild_available(ctx, &guild)
                });
            }
            GatewayEvent::MessageReceived(message) => self.inbound.push(message),
            GatewayEvent::ReactionAdded(reaction) | GatewayEvent::ReactionRemoved(reaction) => {
                self.reactions.push(reaction)
            }
        }
    }

    fn upsert_guild(&mut self, guild: Guild) {
        match self.guilds.iter_mut().find(|g| g.id == guild.id) {
            Some(known) => *known = guild,
            None => {
                info!("Guild available: {} ({})", guild.name, guild.id);
                self.guilds.push(guild);
            }
        }
    }

    /// Run `f` for each service in registration order, each in its own
    /// fault boundary
    fn for_each_service<F>(&mut self, stage: &str, mut f: F)
    where
        F: FnMut(&mut dyn ApplicationService, &mut ServiceContext<'_>) -> Result<(), BotError>,
    {
        for index in 0..self.services.len() {
            let Some(id) = self.services.id_at(index) else {
                continue;
            };
            let Some(mut service) = self.services.take(index) else {
                continue;
            };

            let outcome = {
                let mut ctx = self.context();
                panic::catch_unwind(AssertUnwindSafe(|| f(service.as_mut(), &mut ctx)))
            };
            self.services.restore(index, service);

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Service '{}' {} failed: {}", id, stage, e),
                Err(payload) => error!(
                    "Service '{}' panicked in {}: {}",
                    id,
                    stage,
                    panic_message(payload.as_ref())
                ),
            }
        }
    }

    fn startup_services(&mut self) -> Result<(), BotError> {
        for index in 0..self.services.len() {
            let (Some(id), Some(mut service)) = (self.services.id_at(index), self.services.take(index)) else {
                continue;
            };
            let result = service.startup(&mut StartupContext {
                parser: &mut self.parser,
            });
            self.services.restore(index, service);
            result.map_err(|e| BotError::Service {
                service: id,
                reason: e.to_string(),
            })?;
            debug!("Service '{}' started", id);
        }
        Ok(())
    }

    fn terminate_services(&mut self) {
        for index in 0..self.services.len() {
            let (Some(id), Some(mut service)) = (self.services.id_at(index), self.services.take(index)) else {
                continue;
            };
            match panic::catch_unwind(AssertUnwindSafe(|| service.terminate())) {
                Ok(Ok(())) => debug!("Service '{}' terminated", id),
                Ok(Err(e)) => error!("Service '{}' terminate failed: {}", id, e),
                Err(payload) => error!("Service '{}' panicked in terminate: {}", id, panic_message(payload.as_ref())),
            }
            self.services.restore(index, service);
        }
    }

    fn update(&mut self) {
        self.with_hooks(|hooks, core| hooks.update(&mut core.context()));
        self.for_each_service("update", |service, ctx| service.update(ctx));
    }

    fn clear_buffers(&mut self) {
        self.inbound.clear();
        self.reactions.clear();
    }
}

/// Owns the gateway, the pump and the loop state
pub struct Application {
    core: Core,
    pump: EventPump<Core>,
    gateway: Arc<dyn Gateway>,
    runtime: Handle,
    token: String,
    frame_interval: Duration,
}

impl Application {
    pub fn new(settings: AppSettings, gateway: Arc<dyn Gateway>, runtime: Handle) -> Self {
        let pump: EventPump<Core> = EventPump::new();
        let handle = pump.handle();
        let quit = QuitHandle::new(move || {
            if let Err(e) = handle.post(|core: &mut Core| core.request_stop()) {
                warn!("Quit request dropped: {}", e);
            }
        });

        let permissions = Permissions::new(settings.supervisor, settings.sub_supervisors)
            .with_messages(settings.supervisor_name, settings.not_permitted);

        Self {
            core: Core {
                state: AppState::NotStarted,
                inbound: Vec::new(),
                reactions: Vec::new(),
                outbound: Vec::new(),
                guilds: Vec::new(),
                parser: CommandParser::new(settings.prefixes),
                permissions,
                services: ServiceRegistry::new(),
                bot_user: None,
                stats: FrameStats::new(),
                hooks: Some(Box::new(NoHooks)),
                quit,
                login: None,
            },
            pump,
            gateway,
            runtime,
            token: settings.token,
            frame_interval: settings.frame_interval,
        }
    }

    pub fn with_hooks(mut self, hooks: impl ApplicationHooks + 'static) -> Self {
        self.core.hooks = Some(Box::new(hooks));
        self
    }

    /// Register a service. A second service with the same id is ignored.
    pub fn add_service<T>(&mut self, service: T) -> bool
    where
        T: ApplicationService + ServiceKey,
    {
        self.core.services.add(service)
    }

    pub fn service<T>(&self) -> Option<&T>
    where
        T: ApplicationService + ServiceKey,
    {
        self.core.services.get::<T>()
    }

    pub fn state(&self) -> AppState {
        self.core.state
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    pub fn parser(&self) -> &CommandParser {
        &self.core.parser
    }

    pub fn permissions(&self) -> &Permissions {
        &self.core.permissions
    }

    pub fn quit_handle(&self) -> QuitHandle {
        self.core.quit.clone()
    }

    /// Start up, log in, run frames until quit, then terminate and log out
    pub fn run(&mut self) -> Result<RunSummary, BotError> {
        if self.core.state != AppState::NotStarted {
            return Err(BotError::Internal("application already ran".to_string()));
        }
        self.pump.bind_to_current_thread();

        if let Err(e) = self.startup() {
            error!("Startup failed: {}", e);
            self.core.with_hooks(|hooks, _| hooks.on_startup_failed(&e));
            self.core.state = AppState::Stopped;
            return Ok(self.summary(true));
        }

        self.core.state = AppState::Running;
        self.core.stats = FrameStats::new();
        info!("Entering frame loop");
        while self.frame() {}

        info!("Frame loop stopped after {} frames", self.core.stats.frames);
        self.core.terminate_services();
        self.shutdown();
        Ok(self.summary(false))
    }

    fn summary(&self, startup_failed: bool) -> RunSummary {
        RunSummary {
            frames: self.core.stats.frames,
            sub_supervisors: self.core.permissions.sub_supervisors().to_vec(),
            startup_failed,
        }
    }

    fn startup(&mut self) -> Result<(), BotError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingField("bot.token".to_string()).into());
        }
        self.core.startup_services()?;

        info!("Logging in via {} gateway", self.gateway.name());
        let gateway = Arc::clone(&self.gateway);
        let token = self.token.clone();
        let sink = self.event_sink();
        let handle = self.pump.handle();
        let task = self.runtime.spawn(async move {
            let result = gateway.login(&token, sink).await;
            let _ = handle.post(move |core: &mut Core| core.login = Some(result));
        });
        self.wait_pumping(std::slice::from_ref(&task));

        match self.core.login.take() {
            Some(Ok(user)) => {
                if self.core.bot_user.is_none() {
                    self.core.bot_user = Some(user);
                }
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => Err(BotError::Gateway("login task ended without a result".to_string())),
        }
    }

    fn shutdown(&mut self) {
        let gateway = Arc::clone(&self.gateway);
        let task = self.runtime.spawn(async move {
            if let Err(e) = gateway.logout().await {
                error!("Logout failed: {}", e);
            }
        });
        self.wait_pumping(std::slice::from_ref(&task));
    }

    fn event_sink(&self) -> EventSink {
        let handle = self.pump.handle();
        Arc::new(move |event: GatewayEvent| {
            if let Err(e) = handle.post(move |core: &mut Core| core.handle_event(event)) {
                warn!("Gateway event dropped: {}", e);
            }
        })
    }

    /// One frame. Returns `false` once a quit has been observed.
    fn frame(&mut self) -> bool {
        let started = Instant::now();

        self.pump.drain_once(&mut self.core);
        if self.core.state != AppState::Running {
            return false;
        }

        self.core.update();
        self.core.clear_buffers();
        self.flush();

        thread::sleep(self.frame_interval);
        self.core.stats.last_frame = started.elapsed();
        self.core.stats.frames += 1;
        true
    }

    /// Hand every queued item to the gateway concurrently and pump until all
    /// of them have reported back
    fn flush(&mut self) {
        if self.core.outbound.is_empty() {
            return;
        }

        let tasks: Vec<JoinHandle<()>> = self
            .core
            .outbound
            .drain(..)
            .map(|item| {
                let gateway = Arc::clone(&self.gateway);
                let handle = self.pump.handle();
                self.runtime.spawn(async move {
                    let result = match &item {
                        Outbound::Message(message) => gateway
                            .send_message(&message.channel, &message.render())
                            .await
                            .map(|_| ()),
                        Outbound::Action(action) => gateway.perform(action).await,
                    };
                    if let Err(e) = result {
                        let _ = handle.post(move |_: &mut Core| error!("Outbound {:?} failed: {}", item, e));
                    }
                })
            })
            .collect();

        debug!("Flushing {} outbound items", tasks.len());
        self.wait_pumping(&tasks);
    }

    fn wait_pumping(&mut self, tasks: &[JoinHandle<()>]) {
        while !tasks.iter().all(JoinHandle::is_finished) {
            self.pump.drain_once(&mut self.core);
            thread::sleep(PUMP_WAIT);
        }
        self.pump.drain_once(&mut self.core);
    }
}
