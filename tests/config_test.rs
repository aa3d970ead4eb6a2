//! Configuration and persistence integration tests
//! Run with: cargo test --test config_test

use haruna_bot::application::errors::ConfigError;
use haruna_bot::domain::traits::StateStore;
use haruna_bot::infrastructure::config::{Config, TOKEN_PLACEHOLDER};
use haruna_bot::infrastructure::storage::JsonFileStore;
use haruna_bot::services::{ApplicationService, KaiwaService, QuestService, TimeSignalService};

#[test]
fn fresh_config_file_needs_setting_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");

    Config::default().save(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains(TOKEN_PLACEHOLDER));
    assert!(text.contains("sub-supervisors"));

    let config = Config::load(&path).unwrap();
    assert!(!config.is_set_up());
    assert!(matches!(config.validate(), Err(ConfigError::NotSetUp(_))));
}

#[test]
fn sub_supervisors_are_written_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    let mut config = Config::default();
    config.bot.token = "secret".to_string();
    config.supervisor.user_id = 1000;
    config.save(&path).unwrap();

    let mut on_disk = Config::load(&path).unwrap();
    on_disk.supervisor.sub_supervisors = vec![77, 78];
    on_disk.save(&path).unwrap();

    let reloaded = Config::load(&path).unwrap();
    assert_eq!(reloaded.supervisor.sub_supervisors, vec![77, 78]);
    assert_eq!(reloaded.bot.token, "secret");
    assert!(reloaded.validate().is_ok());
}

#[test]
fn broken_yaml_is_a_parse_error() {
    assert!(matches!(Config::from_yaml("bot: [unclosed"), Err(ConfigError::Parse(_))));
}

#[test]
fn service_state_lands_in_the_data_directory() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("SaveData"));
    store.init().unwrap();

    QuestService::new(Box::new(store.clone())).unwrap().terminate().unwrap();
    TimeSignalService::new(Box::new(store.clone())).unwrap().terminate().unwrap();
    KaiwaService::new(Box::new(store.clone()), "kaiwa.json").unwrap().terminate().unwrap();

    for key in ["harunachanquest.json", "timesignal.json", "kaiwa.json"] {
        assert!(store.base_path().join(key).exists(), "{} missing", key);
        assert!(store.load(key).unwrap().is_some());
    }

    let kaiwa = KaiwaService::new(Box::new(store), "kaiwa.json").unwrap();
    assert_eq!(kaiwa.data().omikuji.len(), 9);
}
