//! Integration tests for parsing config fixtures from the workspace testkit.

use entity_stats_config::{
    CURRENT_CONFIG_VERSION, LogFormatSetting, LogLevelSetting, StatsEnv, StoreProvider,
    load_stats_config_from_path, parse_stats_config_json, parse_stats_config_toml,
};
use entity_stats_shared::ErrorCode;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

fn fixtures_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| manifest_dir.to_path_buf())
        .join("crates")
        .join("testkit")
        .join("fixtures")
}

fn read_fixture(relative: &str) -> Result<String, Box<dyn Error>> {
    Ok(fs::read_to_string(fixtures_root().join(relative))?)
}

#[test]
fn json_fixture_parses_every_section() -> Result<(), Box<dyn Error>> {
    let config = parse_stats_config_json(&read_fixture("config/stats.valid.json")?)?;

    assert_eq!(config.version, CURRENT_CONFIG_VERSION);
    assert_eq!(config.store.provider, StoreProvider::Sqlite);
    assert_eq!(config.store.path, PathBuf::from("var/stats.db"));
    assert_eq!(config.time_stats_table().as_str(), "request_timings");
    assert_eq!(config.tenant_column().as_str(), "team_id");
    assert_eq!(config.logging.level, LogLevelSetting::Debug);
    assert_eq!(config.logging.format, LogFormatSetting::Pretty);
    Ok(())
}

#[test]
fn toml_fixture_fills_defaults() -> Result<(), Box<dyn Error>> {
    let config = parse_stats_config_toml(&read_fixture("config/stats.valid.toml")?)?;

    assert_eq!(config.store.provider, StoreProvider::Postgres);
    assert!(config.store.connection.is_some());
    assert_eq!(config.tenant_column().as_str(), "tenant_id");
    assert_eq!(config.logging.level, LogLevelSetting::Warn);
    assert_eq!(config.logging.format, LogFormatSetting::Json);
    Ok(())
}

#[test]
fn unknown_fields_are_rejected() -> Result<(), Box<dyn Error>> {
    let error = parse_stats_config_json(&read_fixture("config/stats.unknown-field.json")?)
        .err()
        .ok_or_else(|| std::io::Error::other("expected unknown field error"))?;

    assert_eq!(error.code, ErrorCode::new("config", "invalid_json"));
    assert!(error.message.contains("poolSize"));
    Ok(())
}

#[test]
fn path_loader_picks_the_format_from_the_extension() -> Result<(), Box<dyn Error>> {
    let env = StatsEnv::default();

    let from_toml = load_stats_config_from_path(
        Some(&fixtures_root().join("config/stats.valid.toml")),
        &env,
    )?;
    assert_eq!(from_toml.store.provider, StoreProvider::Postgres);

    let error = load_stats_config_from_path(
        Some(&fixtures_root().join("config/stats.bad-identifier.toml")),
        &env,
    )
    .err()
    .ok_or_else(|| std::io::Error::other("expected identifier error"))?;
    assert_eq!(error.code, ErrorCode::new("config", "invalid_identifier"));
    assert_eq!(
        error.metadata.get("value").map(String::as_str),
        Some("time-stats events")
    );
    Ok(())
}
