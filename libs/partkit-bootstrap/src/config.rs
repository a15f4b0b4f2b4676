use anyhow::{Context, Result};
use partkit::merge::deep_merge;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::paths::home_dir::resolve_home_dir;

/// Application configuration: typed global sections plus a free-form bag
/// of per-part settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Document store backing the resources.
    #[serde(default)]
    pub store: StoreConfig,
    /// Logging configuration (optional, uses defaults if None).
    pub logging: Option<LoggingConfig>,
    /// Directory of per-part YAML files, deep-merged over `parts`.
    #[serde(default)]
    pub parts_dir: Option<String>,
    /// Part name → arbitrary JSON/YAML value.
    #[serde(default)]
    pub parts: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub home_dir: String, // normalized to an absolute path on load
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    /// SQLite DSN. `${VAR}` is expanded from the environment and
    /// `sqlite://@file(name.db)` resolves relative to the home directory.
    #[serde(default)]
    pub dsn: Option<String>,
}

/// Logging configuration - maps subsystem names to their logging settings.
/// Key "default" is the catch-all for logs that don't match explicit subsystems.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Section {
    pub console_level: String, // "info", "debug", "error", "off"
    #[serde(default)]
    pub file: String, // "logs/partkit.log"; empty disables the file sink
    #[serde(default)]
    pub file_level: String,
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

const DEFAULT_SUBDIR: &str = ".partkit";
const DEFAULT_SQLITE_FILE: &str = "partkit.sqlite";

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // empty: $HOME/.partkit (%APPDATA%\.partkit on Windows)
            home_dir: String::new(),
            host: "127.0.0.1".to_string(),
            port: 8087,
        }
    }
}

pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "info".to_string(),
            file: "logs/partkit.log".to_string(),
            file_level: "debug".to_string(),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            logging: Some(default_logging_config()),
            parts_dir: None,
            parts: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Layered load: defaults → YAML file → `APP__` environment variables.
    /// Normalizes (and creates) `server.home_dir`, then merges `parts_dir`.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        // optional sections stay None unless YAML/ENV provide them
        let base = AppConfig {
            logging: None,
            ..AppConfig::default()
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(base))
            .merge(Yaml::file(config_path.as_ref()))
            // APP__SERVER__PORT=8087 maps to server.port
            .merge(Env::prefixed("APP__").split("__"));

        let mut config: AppConfig = figment
            .extract()
            .context("Failed to extract config from figment")?;

        config.finish_loading()?;
        Ok(config)
    }

    /// Load from `config_path` if given, otherwise use defaults.
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => {
                let mut config = Self::default();
                config.finish_loading()?;
                Ok(config)
            }
        }
    }

    fn finish_loading(&mut self) -> Result<()> {
        normalize_home_dir_inplace(&mut self.server).context("Failed to resolve server.home_dir")?;
        if let Some(dir) = self.parts_dir.clone() {
            merge_part_files(&mut self.parts, dir)?;
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            self.server.port = port;
        }

        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            match args.verbose {
                0 => {}
                1 => default_section.console_level = "debug".to_string(),
                _ => default_section.console_level = "trace".to_string(),
            }
        }
    }

    pub fn home_dir(&self) -> PathBuf {
        PathBuf::from(&self.server.home_dir)
    }

    /// `host:port` the HTTP ingress binds to unless its part config says otherwise.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub port: Option<u16>,
    pub print_config: bool,
    pub verbose: u8,
}

fn normalize_home_dir_inplace(server: &mut ServerConfig) -> Result<()> {
    let resolved = resolve_home_dir(Some(server.home_dir.as_str()), DEFAULT_SUBDIR, true)
        .context("home_dir normalization failed")?;
    server.home_dir = resolved.to_string_lossy().to_string();
    Ok(())
}

/// Deep-merge every `<part>.yaml` / `<part>.yml` of `dir` over `bag[<part>]`.
fn merge_part_files(
    bag: &mut HashMap<String, serde_json::Value>,
    dir: impl AsRef<Path>,
) -> Result<()> {
    let dir = dir.as_ref();
    if !dir.exists() {
        tracing::debug!(dir = %dir.display(), "parts_dir does not exist; skipping");
        return Ok(());
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    // deterministic merge order
    paths.sort();

    for path in paths {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if ext != "yml" && ext != "yaml" {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let value: serde_yaml::Value = serde_yaml::from_str(&raw)
            .with_context(|| format!("Invalid YAML in {}", path.display()))?;
        let value = serde_json::to_value(value)?;
        match bag.get_mut(name) {
            Some(existing) => deep_merge(existing, value),
            None => {
                bag.insert(name.to_string(), value);
            }
        }
    }
    Ok(())
}

/// Replace `${VARNAME}` occurrences with environment values.
pub fn expand_env_in_dsn(dsn: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")?;
    let mut result = dsn.to_string();
    for cap in re.captures_iter(dsn) {
        let value = std::env::var(&cap[1])
            .with_context(|| format!("Environment variable '{}' not found in DSN", &cap[1]))?;
        result = result.replace(&cap[0], &value);
    }
    Ok(result)
}

fn sqlite_url(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    // Windows drive paths (C:/...) use the single-colon form
    if normalized.len() > 1 && normalized.chars().nth(1) == Some(':') {
        format!("sqlite:{normalized}?mode=rwc")
    } else {
        format!("sqlite://{normalized}?mode=rwc")
    }
}

impl StoreConfig {
    /// DSN for the SQLite store.
    ///
    /// - unset, `sqlite://`, `sqlite:` → `<home>/partkit.sqlite`
    /// - `sqlite://@file(rel.db)` → `<home>/rel.db`; absolute paths are kept
    /// - anything else is used as is after `${VAR}` expansion
    pub fn resolved_dsn(&self, home_dir: &Path) -> Result<String> {
        let dsn = match &self.dsn {
            Some(dsn) => expand_env_in_dsn(dsn)?,
            None => String::new(),
        };

        if matches!(dsn.as_str(), "" | "sqlite://" | "sqlite:///" | "sqlite:") {
            return Ok(sqlite_url(&home_dir.join(DEFAULT_SQLITE_FILE)));
        }

        if let Some(start) = dsn.find("@file(") {
            let rest = &dsn[start + "@file(".len()..];
            let end = rest
                .find(')')
                .with_context(|| format!("Invalid @file() syntax in SQLite DSN: {dsn}"))?;
            let file = Path::new(&rest[..end]);
            let path = if file.is_absolute() {
                file.to_path_buf()
            } else {
                home_dir.join(file)
            };
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            return Ok(sqlite_url(&path));
        }

        Ok(dsn)
    }
}

#[cfg(test)]
mod tests;
