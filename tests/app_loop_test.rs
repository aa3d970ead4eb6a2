//! Frame loop integration tests against a scripted in-memory gateway
//! Run with: cargo test --test app_loop_test

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use haruna_bot::application::errors::BotError;
use haruna_bot::application::{AppSettings, Application, ApplicationHooks, ServiceContext};
use haruna_bot::domain::entities::{
    ChannelRef, Emoji, GatewayAction, Guild, InboundMessage, MessageId, ReactionEvent, User, UserId,
};
use haruna_bot::domain::traits::{EventSink, Gateway, GatewayEvent};
use haruna_bot::infrastructure::storage::MemoryStore;
use haruna_bot::services::{
    ApplicationService, KaiwaService, PinProxyService, QuestService, ServiceKey, SystemControlService,
};

static INIT: Once = Once::new();

fn ensure_init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

const SUPERVISOR: UserId = 1000;
const GUILD: u64 = 100;
const CHANNEL: u64 = 10;

fn channel() -> ChannelRef {
    ChannelRef::new(CHANNEL, "general").in_guild(GUILD)
}

fn message(id: MessageId, author: UserId, text: &str) -> GatewayEvent {
    GatewayEvent::MessageReceived(InboundMessage::new(
        id,
        User::new(author, format!("user{}", author)),
        channel(),
        text,
    ))
}

/// Delivers a fixed event script on login and records everything sent
#[derive(Default)]
struct ScriptedGateway {
    script: Mutex<Vec<GatewayEvent>>,
    sent: Arc<Mutex<Vec<String>>>,
    actions: Arc<Mutex<Vec<GatewayAction>>>,
    logins: AtomicUsize,
    logouts: AtomicUsize,
    fail_login: bool,
}

impl ScriptedGateway {
    fn new(script: Vec<GatewayEvent>) -> Self {
        Self {
            script: Mutex::new(script),
            ..Default::default()
        }
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn login(&self, _token: &str, events: EventSink) -> Result<User, BotError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if self.fail_login {
            return Err(BotError::Auth("bad token".to_string()));
        }
        let bot = User::new(1, "haruna").as_bot();
        events(GatewayEvent::LoggedIn(bot.clone()));
        events(GatewayEvent::GuildAvailable(
            Guild::new(GUILD, "港町").with_channel(CHANNEL, "general"),
        ));
        for event in self.script.lock().unwrap().drain(..) {
            events(event);
        }
        Ok(bot)
    }

    async fn send_message(&self, _channel: &ChannelRef, text: &str) -> Result<MessageId, BotError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(text.to_string());
        Ok(sent.len() as MessageId)
    }

    async fn perform(&self, action: &GatewayAction) -> Result<(), BotError> {
        self.actions.lock().unwrap().push(action.clone());
        Ok(())
    }

    async fn logout(&self) -> Result<(), BotError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn settings(token: &str) -> AppSettings {
    AppSettings {
        token: token.to_string(),
        prefixes: vec!["はるなちゃん、".to_string()],
        frame_interval: Duration::from_millis(1),
        supervisor: SUPERVISOR,
        ..Default::default()
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

/// Records every hook call into a shared log
struct Recorder<const N: usize> {
    log: Arc<Mutex<Vec<String>>>,
}

macro_rules! recorder_key {
    ($n:literal, $id:literal) => {
        impl ServiceKey for Recorder<$n> {
            const ID: &'static str = $id;
        }
    };
}
recorder_key!(0, "recorder-a");
recorder_key!(1, "recorder-b");

impl<const N: usize> ApplicationService for Recorder<N> {
    fn update(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), BotError> {
        for message in ctx.received() {
            self.log.lock().unwrap().push(format!("{}:{}", N, message.content));
        }
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), BotError> {
        self.log.lock().unwrap().push(format!("terminate:{}", N));
        Ok(())
    }
}

struct Faulty;

impl ServiceKey for Faulty {
    const ID: &'static str = "faulty";
}

impl ApplicationService for Faulty {
    fn update(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), BotError> {
        if !ctx.received().is_empty() {
            panic!("faulty service blew up");
        }
        Err(BotError::Internal("always failing".to_string()))
    }
}

/// Calls quit from inside its `stop_after`-th update
struct QuitAfter {
    stop_after: usize,
    updates: Arc<AtomicUsize>,
    terminations: Arc<AtomicUsize>,
}

impl ServiceKey for QuitAfter {
    const ID: &'static str = "quit-after";
}

impl ApplicationService for QuitAfter {
    fn update(&mut self, ctx: &mut ServiceContext<'_>) -> Result<(), BotError> {
        if self.updates.fetch_add(1, Ordering::SeqCst) + 1 == self.stop_after {
            ctx.quit();
        }
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), BotError> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn quit_during_a_frame_runs_no_further_frame() {
    ensure_init();
    let rt = runtime();
    let gateway = Arc::new(ScriptedGateway::new(Vec::new()));
    let updates = Arc::new(AtomicUsize::new(0));
    let terminations = Arc::new(AtomicUsize::new(0));

    let mut app = Application::new(settings("token"), gateway.clone(), rt.handle().clone());
    app.add_service(QuitAfter {
        stop_after: 3,
        updates: Arc::clone(&updates),
        terminations: Arc::clone(&terminations),
    });
    let summary = app.run().unwrap();

    assert_eq!(updates.load(Ordering::SeqCst), 3);
    assert_eq!(terminations.load(Ordering::SeqCst), 1);
    assert_eq!(summary.frames, 3);
    assert_eq!(gateway.logouts.load(Ordering::SeqCst), 1);
}

#[test]
fn greeting_reply_mentions_the_author() {
    ensure_init();
    let rt = runtime();
    let gateway = Arc::new(ScriptedGateway::new(vec![
        message(1, 5, "はるなちゃん、おはよう"),
        message(2, SUPERVISOR, "はるなちゃん、家に帰って"),
    ]));

    let mut app = Application::new(settings("token"), gateway.clone(), rt.handle().clone());
    let store = MemoryStore::new();
    app.add_service(SystemControlService::new());
    app.add_service(KaiwaService::new(Box::new(store), "kaiwa.json").unwrap());

    let summary = app.run().unwrap();

    assert!(!summary.startup_failed);
    let sent = gateway.sent();
    assert!(sent.iter().any(|s| s == "はーい！陽菜、お家に帰るね～、ばいばーい"));
    let greeting = sent.iter().find(|s| s.contains("今日の運勢は")).unwrap();
    assert!(greeting.starts_with("<@5> "));
    assert_eq!(gateway.logouts.load(Ordering::SeqCst), 1);
}

#[test]
fn stranger_cannot_stop_the_loop() {
    ensure_init();
    let rt = runtime();
    let gateway = Arc::new(ScriptedGateway::new(vec![message(1, 5, "はるなちゃん、家に帰って")]));

    let mut app = Application::new(settings("token"), gateway.clone(), rt.handle().clone());
    app.add_service(SystemControlService::new());

    let quit = app.quit_handle();
    let watched = Arc::clone(&gateway.sent);
    let watcher = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(5);
        while watched.lock().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(30));
        quit.request();
    });

    let summary = app.run().unwrap();
    watcher.join().unwrap();

    let sent = gateway.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].starts_with("<@5> ごめんなさい、知らない人の言葉"));
    assert!(summary.frames > 1);
}

#[test]
fn services_terminate_once_in_registration_order() {
    ensure_init();
    let rt = runtime();
    let log = Arc::new(Mutex::new(Vec::new()));
    let gateway = Arc::new(ScriptedGateway::new(vec![
        message(1, 5, "hello"),
        message(2, SUPERVISOR, "はるなちゃん、家に帰って"),
    ]));

    let mut app = Application::new(settings("token"), gateway.clone(), rt.handle().clone());
    app.add_service(Recorder::<0> { log: Arc::clone(&log) });
    app.add_service(Recorder::<1> { log: Arc::clone(&log) });
    assert!(!app.add_service(Recorder::<0> { log: Arc::clone(&log) }));
    app.add_service(SystemControlService::new());

    app.run().unwrap();

    let log = log.lock().unwrap().clone();
    // each message seen exactly once per service, so buffers were cleared between frames
    assert_eq!(
        log,
        vec![
            "0:hello",
            "0:はるなちゃん、家に帰って",
            "1:hello",
            "1:はるなちゃん、家に帰って",
            "terminate:0",
            "terminate:1",
        ]
    );
}

#[test]
fn faulty_service_does_not_stop_the_frame() {
    ensure_init();
    let rt = runtime();
    let log = Arc::new(Mutex::new(Vec::new()));
    let gateway = Arc::new(ScriptedGateway::new(vec![
        message(1, 5, "hi"),
        message(2, SUPERVISOR, "はるなちゃん、家に帰って"),
    ]));

    let mut app = Application::new(settings("token"), gateway.clone(), rt.handle().clone());
    app.add_service(Faulty);
    app.add_service(Recorder::<0> { log: Arc::clone(&log) });
    app.add_service(SystemControlService::new());

    let summary = app.run().unwrap();

    assert!(!summary.startup_failed);
    assert!(log.lock().unwrap().contains(&"0:hi".to_string()));
    assert_eq!(gateway.sent().len(), 1);
}

#[test]
fn pin_reaction_reaches_the_gateway() {
    ensure_init();
    let rt = runtime();
    let gateway = Arc::new(ScriptedGateway::new(vec![
        GatewayEvent::ReactionAdded(ReactionEvent {
            channel: channel(),
            message_id: 42,
            user_id: 5,
            emoji: Emoji::unicode("📌"),
            added: true,
        }),
        message(2, SUPERVISOR, "はるなちゃん、家に帰って"),
    ]));

    let mut app = Application::new(settings("token"), gateway.clone(), rt.handle().clone());
    app.add_service(PinProxyService::new());
    app.add_service(SystemControlService::new());
    app.run().unwrap();

    assert_eq!(
        gateway.actions.lock().unwrap().clone(),
        vec![GatewayAction::Pin {
            channel: channel(),
            message_id: 42
        }]
    );
}

#[test]
fn quest_suffix_and_sub_supervisors_survive_the_run() {
    ensure_init();
    let rt = runtime();
    let store = MemoryStore::new();
    let gateway = Arc::new(ScriptedGateway::new(vec![
        message(1, SUPERVISOR, "はるなちゃん、副管理者の登録 77"),
        message(2, SUPERVISOR, "はるなちゃん、家に帰って"),
    ]));

    let mut app = Application::new(settings("token"), gateway.clone(), rt.handle().clone());
    app.add_service(QuestService::new(Box::new(store.clone())).unwrap());
    app.add_service(SystemControlService::new());
    let summary = app.run().unwrap();

    assert_eq!(summary.sub_supervisors, vec![77]);
    assert!(gateway
        .sent()
        .iter()
        .any(|s| s == "<@1000> おにいちゃん！ <@77>を副管理者に登録したよ！"));
    assert!(haruna_bot::domain::traits::StateStore::load(&store, "harunachanquest.json")
        .unwrap()
        .is_some());
}

#[derive(Clone, Default)]
struct FailureHook {
    failures: Arc<AtomicUsize>,
}

impl ApplicationHooks for FailureHook {
    fn on_startup_failed(&mut self, _error: &BotError) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn empty_token_is_a_startup_failure() {
    ensure_init();
    let rt = runtime();
    let gateway = Arc::new(ScriptedGateway::new(Vec::new()));
    let hook = FailureHook::default();

    let mut app = Application::new(settings("  "), gateway.clone(), rt.handle().clone()).with_hooks(hook.clone());
    let summary = app.run().unwrap();

    assert!(summary.startup_failed);
    assert_eq!(summary.frames, 0);
    assert_eq!(gateway.logins.load(Ordering::SeqCst), 0);
    assert_eq!(hook.failures.load(Ordering::SeqCst), 1);
    assert!(app.run().is_err());
}

#[test]
fn login_error_is_a_startup_failure() {
    ensure_init();
    let rt = runtime();
    let gateway = Arc::new(ScriptedGateway {
        fail_login: true,
        ..Default::default()
    });

    let mut app = Application::new(settings("token"), gateway.clone(), rt.handle().clone());
    let summary = app.run().unwrap();

    assert!(summary.startup_failed);
    assert_eq!(gateway.logins.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.logouts.load(Ordering::SeqCst), 0);
}
