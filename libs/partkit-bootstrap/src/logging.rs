//! Logging setup: human-readable console output plus optional rotating JSON
//! files, both filtered per target from the `logging` config section.
//!
//! `RUST_LOG`, when set, caps both sinks.

use crate::config::{LoggingConfig, Section};
use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};
use parking_lot::Mutex;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_SECTION: &str = "default";
const DEFAULT_MAX_SIZE_MB: u64 = 100;

// non-blocking console writer flushes until this guard drops
static CONSOLE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// `None` disables the sink; unknown names fall back to INFO.
fn parse_level(s: &str) -> Option<LevelFilter> {
    match s.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" => Some(LevelFilter::INFO),
        "warn" => Some(LevelFilter::WARN),
        "error" => Some(LevelFilter::ERROR),
        "off" | "none" => None,
        _ => Some(LevelFilter::INFO),
    }
}

/// `target` belongs to `prefix` when equal or nested under it (`prefix::...`).
fn target_matches(target: &str, prefix: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

type SharedRotate = Arc<Mutex<FileRotate<AppendTimestamp>>>;

/// Writer handle; `None` swallows records that have no file.
#[derive(Clone)]
struct LogFile(Option<SharedRotate>);

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &self.0 {
            Some(file) => file.lock().write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &self.0 {
            Some(file) => file.lock().flush(),
            None => Ok(()),
        }
    }
}

/// Routes each record to the file of the longest matching target section,
/// falling back to the default file.
#[derive(Clone, Default)]
struct FileRouter {
    default: Option<SharedRotate>,
    by_target: Vec<(String, SharedRotate)>,
}

impl FileRouter {
    fn resolve(&self, target: &str) -> Option<SharedRotate> {
        self.by_target
            .iter()
            .filter(|(prefix, _)| target_matches(target, prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, file)| Arc::clone(file))
            .or_else(|| self.default.clone())
    }

    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_target.is_empty()
    }
}

impl<'a> fmt::MakeWriter<'a> for FileRouter {
    type Writer = LogFile;

    fn make_writer(&'a self) -> Self::Writer {
        LogFile(self.default.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        LogFile(self.resolve(meta.target()))
    }
}

fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn open_rotating(section: &Section, base_dir: &Path) -> std::io::Result<Option<SharedRotate>> {
    if section.file.trim().is_empty() {
        return Ok(None);
    }
    let path = resolve_log_path(&section.file, base_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // keep N files when configured, otherwise keep by age
    let limit = match section.max_backups {
        Some(n) => FileLimit::MaxFiles(n),
        None => FileLimit::Age(chrono::Duration::days(
            i64::from(section.max_age_days.unwrap_or(1)),
        )),
    };
    let max_bytes = section.max_size_mb.unwrap_or(DEFAULT_MAX_SIZE_MB) as usize * 1024 * 1024;

    let rotate = FileRotate::new(
        path,
        AppendTimestamp::default(limit),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        None,
    );
    Ok(Some(Arc::new(Mutex::new(rotate))))
}

fn build_file_router(cfg: &LoggingConfig, base_dir: &Path) -> FileRouter {
    let mut router = FileRouter::default();
    for (name, section) in cfg {
        match open_rotating(section, base_dir) {
            Ok(Some(file)) if name == DEFAULT_SECTION => router.default = Some(file),
            Ok(Some(file)) => router.by_target.push((name.clone(), file)),
            Ok(None) => {}
            Err(e) => eprintln!("Failed to open log file '{}' for '{name}': {e}", section.file),
        }
    }
    router
}

#[derive(Clone, Copy)]
enum Sink {
    Console,
    File { has_default_file: bool },
}

/// Per-target level filter of one sink.
fn build_targets(cfg: &LoggingConfig, sink: Sink) -> Targets {
    let level_of = |section: &Section| match sink {
        Sink::Console => parse_level(&section.console_level),
        Sink::File { .. } if section.file.trim().is_empty() => None,
        Sink::File { .. } => parse_level(&section.file_level),
    };

    let fallback = match sink {
        Sink::Console => LevelFilter::INFO,
        Sink::File { has_default_file: true } => LevelFilter::INFO,
        Sink::File { has_default_file: false } => LevelFilter::OFF,
    };
    let default = match cfg.get(DEFAULT_SECTION) {
        Some(section) => level_of(section).unwrap_or(LevelFilter::OFF),
        None => fallback,
    };

    cfg.iter()
        .filter(|(name, _)| name.as_str() != DEFAULT_SECTION)
        .fold(Targets::new().with_default(default), |targets, (name, section)| {
            match level_of(section) {
                Some(level) => targets.with_target(name.clone(), level),
                None => targets.with_target(name.clone(), LevelFilter::OFF),
            }
        })
}

/// Install the global subscriber. Safe to call more than once; later calls
/// leave the first subscriber in place.
pub fn init_logging(cfg: &LoggingConfig, base_dir: &Path) {
    // bridge `log` records (sqlx, tower) into tracing
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("LogTracer init skipped: {e}");
    }

    let env = EnvFilter::try_from_default_env().ok();

    if cfg.is_empty() {
        let console = fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339());
        let _ = tracing_subscriber::registry().with(env).with(console).try_init();
        return;
    }

    let router = build_file_router(cfg, base_dir);
    let console_targets = build_targets(cfg, Sink::Console);
    let file_targets = build_targets(
        cfg,
        Sink::File {
            has_default_file: router.default.is_some(),
        },
    );

    let (stderr, guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = CONSOLE_GUARD.set(guard);

    let console = fmt::layer()
        .with_writer(stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(console_targets);

    let files = (!router.is_empty()).then(|| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_level(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(router)
            .with_filter(file_targets)
    });

    let _ = tracing_subscriber::registry()
        .with(env)
        .with(console)
        .with(files)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn section(console: &str, file: &str, file_level: &str) -> Section {
        Section {
            console_level: console.into(),
            file: file.into(),
            file_level: file_level.into(),
            max_age_days: None,
            max_backups: Some(2),
            max_size_mb: Some(1),
        }
    }

    #[test]
    fn levels_parse_with_info_fallback() {
        assert_eq!(parse_level("DEBUG"), Some(LevelFilter::DEBUG));
        assert_eq!(parse_level("off"), None);
        assert_eq!(parse_level("loud"), Some(LevelFilter::INFO));
    }

    #[test]
    fn target_prefix_matching_respects_module_boundaries() {
        assert!(target_matches("partkit_store", "partkit_store"));
        assert!(target_matches("partkit_store::sql", "partkit_store"));
        assert!(!target_matches("partkit_store_extra", "partkit_store"));
        assert!(!target_matches("partkit", "partkit_store"));
    }

    #[test]
    fn console_targets_follow_sections() {
        let mut cfg: LoggingConfig = HashMap::new();
        cfg.insert("default".into(), section("warn", "", ""));
        cfg.insert("partkit_store".into(), section("debug", "", ""));
        cfg.insert("sqlx".into(), section("off", "", ""));

        let targets = build_targets(&cfg, Sink::Console);
        assert!(targets.would_enable("partkit_store::sql", &tracing::Level::DEBUG));
        assert!(!targets.would_enable("partkit", &tracing::Level::INFO));
        assert!(targets.would_enable("partkit", &tracing::Level::WARN));
        assert!(!targets.would_enable("sqlx::query", &tracing::Level::ERROR));
    }

    #[test]
    fn file_targets_skip_sections_without_file() {
        let mut cfg: LoggingConfig = HashMap::new();
        cfg.insert("partkit_server".into(), section("info", "", "debug"));
        cfg.insert("partkit_store".into(), section("info", "store.log", "debug"));

        let targets = build_targets(&cfg, Sink::File { has_default_file: false });
        assert!(targets.would_enable("partkit_store", &tracing::Level::DEBUG));
        assert!(!targets.would_enable("partkit_server", &tracing::Level::ERROR));
        assert!(!targets.would_enable("other", &tracing::Level::ERROR));
    }

    #[test]
    fn router_prefers_longest_prefix_then_default() {
        let dir = tempdir().unwrap();
        let mut cfg: LoggingConfig = HashMap::new();
        cfg.insert("default".into(), section("info", "logs/all.log", "info"));
        cfg.insert("partkit".into(), section("info", "logs/kit.log", "info"));
        cfg.insert("partkit::resolver".into(), section("info", "logs/resolver.log", "info"));
        cfg.insert("quiet".into(), section("info", "", "info"));

        let router = build_file_router(&cfg, dir.path());
        assert_eq!(router.by_target.len(), 2);
        assert!(dir.path().join("logs").is_dir());

        let resolver = router.resolve("partkit::resolver").unwrap();
        let kit = router.resolve("partkit::function").unwrap();
        let fallback = router.resolve("quiet").unwrap();
        assert!(!Arc::ptr_eq(&resolver, &kit));
        assert!(Arc::ptr_eq(&fallback, router.default.as_ref().unwrap()));
    }

    #[test]
    fn writes_reach_the_rotating_file() {
        let dir = tempdir().unwrap();
        let file = open_rotating(&section("info", "out.log", "info"), dir.path())
            .unwrap()
            .unwrap();
        let mut handle = LogFile(Some(file));
        handle.write_all(b"{\"msg\":\"hello\"}\n").unwrap();
        handle.flush().unwrap();
        let written = std::fs::read_to_string(dir.path().join("out.log")).unwrap();
        assert!(written.contains("hello"));

        let mut sink = LogFile(None);
        assert_eq!(sink.write(b"dropped").unwrap(), 7);
    }
}
