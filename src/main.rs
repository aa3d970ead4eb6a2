use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use haruna_bot::application::errors::{BotError, ConfigError, StorageError};
use haruna_bot::application::{Application, ApplicationHooks};
use haruna_bot::domain::entities::{Guild, GuildId, User};
use haruna_bot::domain::traits::Gateway;
use haruna_bot::infrastructure::adapters::ConsoleAdapter;
use haruna_bot::infrastructure::config::Config;
use haruna_bot::infrastructure::database::Database;
use haruna_bot::infrastructure::storage::JsonFileStore;
use haruna_bot::services::{
    GaooService, HaipaiService, KaiwaService, PaifuDetectService, PinProxyService, QuestService, ReactionReplyService,
    RoleClubService, ScheduleService, StatusService, SystemControlService, TimeSignalService, UrlConvertService,
};

/// How long in-flight gateway work gets once the loop has stopped
const RUNTIME_GRACE: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "haruna-bot")]
#[command(about = "Frame-loop chat bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Bot token (overrides config)
    #[arg(short, long)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

/// Operator-facing lifecycle output
struct ConsoleHooks;

impl ApplicationHooks for ConsoleHooks {
    fn on_logged_in(&mut self, user: &User) {
        println!("{} is online. Type a message, or Ctrl-D to stop reading input.", user);
    }

    fn on_join_guild(&mut self, guild: &Guild) {
        tracing::info!("Joined guild: {} ({})", guild.name, guild.id);
    }

    fn on_leave_guild(&mut self, guild: GuildId) {
        tracing::info!("Left guild: {}", guild);
    }

    fn on_startup_failed(&mut self, error: &BotError) {
        eprintln!("haruna-bot could not start: {}", error);
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            if let Err(e) = run_bot(&cli.config, cli.token) {
                tracing::error!("{}", e);
                std::process::exit(1);
            }
        }
        Commands::Version => {
            println!("haruna-bot v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::InitConfig => {
            init_config(&cli.config);
        }
    }
}

fn init_config(path: &str) {
    if Path::new(path).exists() {
        tracing::warn!("{} already exists, leaving it untouched", path);
        return;
    }
    match Config::default().save(path) {
        Ok(()) => println!("Created {}", path),
        Err(e) => tracing::error!("Failed to create config: {}", e),
    }
}

fn run_bot(config_path: &str, token_override: Option<String>) -> Result<(), BotError> {
    if !Path::new(config_path).exists() {
        Config::default().save(config_path)?;
        tracing::warn!("Created {}. Fill in the bot token and supervisor id, then start again.", config_path);
        return Ok(());
    }

    let mut config = Config::load(config_path)?;
    config.apply_env();
    if let Some(token) = token_override {
        config.bot.token = token;
    }
    if !config.is_set_up() {
        tracing::warn!("{} has not been set up yet, the bot token is still the placeholder", config_path);
        return Ok(());
    }
    config.validate()?;

    tracing::info!("Starting haruna-bot: {}", config.bot.name);

    let data_dir = config.storage.data_dir.clone();
    let store = JsonFileStore::new(&data_dir);
    store.init()?;
    let database = Database::new(config.storage.database_path()).map_err(StorageError::from)?;
    tracing::info!("Database initialized");

    if !config.console_enabled() {
        return Err(ConfigError::MissingField("adapters.console.enabled".to_string()).into());
    }
    let gateway: Arc<dyn Gateway> = Arc::new(ConsoleAdapter::new(&config.bot.name, config.supervisor.user_id));

    let rt = tokio::runtime::Runtime::new().map_err(|e| BotError::Internal(format!("Failed to start runtime: {}", e)))?;

    let mut app = Application::new(config.app_settings(), gateway, rt.handle().clone()).with_hooks(ConsoleHooks);
    app.add_service(QuestService::new(Box::new(store.clone()))?);
    app.add_service(SystemControlService::new());
    app.add_service(KaiwaService::new(Box::new(store.clone()), config.storage.conversation_file.clone())?);
    app.add_service(TimeSignalService::new(Box::new(store.clone()))?);
    app.add_service(ScheduleService::new(Box::new(store.clone()))?);
    app.add_service(ReactionReplyService::new(Box::new(store.clone()))?);
    app.add_service(PaifuDetectService::new(Box::new(store.clone()))?);
    app.add_service(GaooService::new());
    app.add_service(RoleClubService::new(database));
    app.add_service(UrlConvertService::new());
    app.add_service(PinProxyService::new());
    app.add_service(HaipaiService::new());
    app.add_service(StatusService::new());

    let summary = app.run();
    drop(app);
    // the console reader may still be parked on a blocking stdin read
    stop_runtime(rt);
    let summary = summary?;
    if summary.startup_failed {
        return Err(BotError::Internal("startup failed".to_string()));
    }
    tracing::info!("Stopped after {} frames", summary.frames);

    // write back only what the bot itself changes
    let mut on_disk = Config::load(config_path)?;
    on_disk.supervisor.sub_supervisors = summary.sub_supervisors;
    on_disk.save(config_path)?;
    Ok(())
}

fn stop_runtime(rt: tokio::runtime::Runtime) {
    rt.shutdown_timeout(RUNTIME_GRACE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn stopping_does_not_wait_for_parked_blocking_reads() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (_keep, parked) = std::sync::mpsc::channel::<()>();
        rt.spawn_blocking(move || parked.recv());

        let started = Instant::now();
        stop_runtime(rt);

        assert!(started.elapsed() < RUNTIME_GRACE * 4);
    }
}
