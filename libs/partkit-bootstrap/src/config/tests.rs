use super::*;
use crate::{part_config, AppConfigProvider, ConfigProvider};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_default_config() {
    let config = AppConfig::default();

    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8087);
    assert_eq!(config.bind_addr(), "127.0.0.1:8087");
    assert_eq!(config.store.kind, StoreKind::Memory);
    assert!(config.store.dsn.is_none());

    let logging = config.logging.as_ref().unwrap();
    assert_eq!(logging["default"].console_level, "info");
    assert!(config.parts.is_empty());
}

#[test]
fn test_yaml_serialization() {
    let yaml = AppConfig::default().to_yaml().unwrap();
    assert!(yaml.contains("server:"));
    assert!(yaml.contains("store:"));
    assert!(yaml.contains("kind: memory"));
    assert!(yaml.contains("parts:"));
}

#[test]
fn test_layered_loading_yaml_only() {
    let tmp = tempdir().unwrap();
    let home = tmp.path().join("home");
    let config_path = tmp.path().join("config.yaml");
    fs::write(
        &config_path,
        format!(
            r#"
server:
  home_dir: "{}"
  host: "0.0.0.0"
  port: 9999
store:
  kind: sqlite
  dsn: "sqlite://@file(people.db)"
parts:
  rpc_ingress:
    path_prefix: "/api"
"#,
            home.display()
        ),
    )
    .unwrap();

    let config = AppConfig::load_layered(&config_path).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 9999);
    assert_eq!(config.home_dir(), home);
    assert!(home.is_dir(), "home_dir is created on load");
    assert_eq!(config.store.kind, StoreKind::Sqlite);
    assert!(config.logging.is_none());
    assert_eq!(config.parts["rpc_ingress"]["path_prefix"], "/api");
}

#[test]
fn test_unknown_top_level_key_is_rejected() {
    let tmp = tempdir().unwrap();
    let config_path = tmp.path().join("config.yaml");
    fs::write(&config_path, "databse:\n  url: x\n").unwrap();
    assert!(AppConfig::load_layered(&config_path).is_err());
}

#[test]
fn test_parts_dir_is_deep_merged() {
    let tmp = tempdir().unwrap();
    let parts_dir = tmp.path().join("parts");
    fs::create_dir_all(&parts_dir).unwrap();
    fs::write(
        parts_dir.join("people.yaml"),
        "auth:\n  secret: from-file\n",
    )
    .unwrap();
    fs::write(parts_dir.join("notes.txt"), "ignored").unwrap();

    let config_path = tmp.path().join("config.yaml");
    fs::write(
        &config_path,
        format!(
            r#"
server:
  home_dir: "{}"
  host: "127.0.0.1"
  port: 8087
parts_dir: "{}"
parts:
  people:
    auth:
      header: authorization
"#,
            tmp.path().join("home").display(),
            parts_dir.display()
        ),
    )
    .unwrap();

    let config = AppConfig::load_layered(&config_path).unwrap();
    assert_eq!(
        config.parts["people"],
        serde_json::json!({"auth": {"header": "authorization", "secret": "from-file"}})
    );
    assert_eq!(config.parts.len(), 1);
}

#[test]
fn test_cli_overrides() {
    let mut config = AppConfig::default();
    config.apply_cli_overrides(&CliArgs {
        port: Some(8888),
        verbose: 2,
        ..CliArgs::default()
    });
    assert_eq!(config.server.port, 8888);
    assert_eq!(config.logging.as_ref().unwrap()["default"].console_level, "trace");

    let mut quiet = AppConfig::default();
    quiet.apply_cli_overrides(&CliArgs::default());
    assert_eq!(quiet.logging.as_ref().unwrap()["default"].console_level, "info");
}

#[test]
fn test_sqlite_dsn_resolution() {
    let tmp = tempdir().unwrap();
    let home = tmp.path();

    let default = StoreConfig {
        kind: StoreKind::Sqlite,
        dsn: None,
    };
    let dsn = default.resolved_dsn(home).unwrap();
    assert!(dsn.starts_with("sqlite:"));
    assert!(dsn.ends_with("partkit.sqlite?mode=rwc"));

    let file = StoreConfig {
        kind: StoreKind::Sqlite,
        dsn: Some("sqlite://@file(data/people.db)".into()),
    };
    let dsn = file.resolved_dsn(home).unwrap();
    assert!(dsn.ends_with("data/people.db?mode=rwc"), "{dsn}");
    assert!(home.join("data").is_dir());

    let memory = StoreConfig {
        kind: StoreKind::Sqlite,
        dsn: Some("sqlite::memory:".into()),
    };
    assert_eq!(memory.resolved_dsn(home).unwrap(), "sqlite::memory:");

    let broken = StoreConfig {
        kind: StoreKind::Sqlite,
        dsn: Some("sqlite://@file(unterminated".into()),
    };
    assert!(broken.resolved_dsn(home).is_err());
}

#[test]
fn test_env_expansion_in_dsn() {
    std::env::set_var("PARTKIT_TEST_DB_FILE", "expanded.db");
    assert_eq!(
        expand_env_in_dsn("sqlite://@file(${PARTKIT_TEST_DB_FILE})").unwrap(),
        "sqlite://@file(expanded.db)"
    );
    assert!(expand_env_in_dsn("${PARTKIT_TEST_SURELY_UNSET_VAR}").is_err());
}

#[derive(Debug, Default, serde::Deserialize, PartialEq)]
struct IngressSettings {
    #[serde(default)]
    path_prefix: String,
}

#[test]
fn test_part_config_via_provider() {
    let mut config = AppConfig::default();
    config
        .parts
        .insert("rpc_ingress".into(), serde_json::json!({"path_prefix": "/rpc"}));
    let provider = AppConfigProvider::new(config);

    let typed: IngressSettings = part_config(&provider, "rpc_ingress").unwrap();
    assert_eq!(typed.path_prefix, "/rpc");

    let missing: IngressSettings = part_config(&provider, "absent").unwrap();
    assert_eq!(missing, IngressSettings::default());

    assert_eq!(
        provider.get_config_raw("server").unwrap()["port"],
        serde_json::json!(8087)
    );
    assert!(provider.get_config_raw("nope").is_none());
}
