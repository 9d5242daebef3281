use anyhow::{anyhow, Context, Result};
use std::fs;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Once, OnceLock};
use tracing::Level;
use tracing_appender::{
    non_blocking,
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_log::LogTracer;
use tracing_subscriber::{
    fmt::{self, time},
    layer::SubscriberExt,
    EnvFilter,
};

const LOG_FILE_PREFIX: &str = "nbcloud.log";

// 确保日志只初始化一次
static INIT: Once = Once::new();
static INITIALIZED: AtomicBool = AtomicBool::new(false);
static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// 日志目录路径
pub fn log_dir_path() -> PathBuf {
    match dirs::data_dir() {
        Some(data_dir) => data_dir.join("nbcloud").join("logs"),
        None => std::env::temp_dir().join("nbcloud").join("logs"),
    }
}

/// 日志文件路径
pub fn log_file_path() -> PathBuf {
    let log_dir = log_dir_path();

    // 寻找最新的按日期命名的日志文件
    if let Ok(entries) = fs::read_dir(&log_dir) {
        let latest = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.metadata().map(|m| m.is_file()).unwrap_or(false)
                    && e.file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX)
            })
            .max_by_key(|e| {
                e.metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
            });

        if let Some(file) = latest {
            return file.path();
        }
    }

    log_dir.join(LOG_FILE_PREFIX)
}

fn parse_level(log_level: &str) -> Level {
    match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize the logging system
pub fn init_logger(log_level: &str, to_file: bool) -> Result<()> {
    if INITIALIZED.load(Ordering::SeqCst) {
        return Ok(());
    }

    let mut outcome = Ok(());
    INIT.call_once(|| {
        outcome = install(parse_level(log_level), to_file);
        if outcome.is_ok() {
            INITIALIZED.store(true, Ordering::SeqCst);
        }
    });
    outcome
}

fn install(level: Level, to_file: bool) -> Result<()> {
    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    // Terminal layer; stdout is left to command output
    let terminal_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(true)
        .with_timer(time::SystemTime)
        .with_target(false);

    if to_file {
        fs::create_dir_all(log_dir_path()).context("Failed to create log directory")?;

        // Daily rotation, non-blocking writer
        let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir_path(), LOG_FILE_PREFIX);
        let (non_blocking_appender, guard) = non_blocking(file_appender);

        let file_layer = fmt::layer()
            .with_writer(non_blocking_appender)
            .with_ansi(false)
            .with_timer(time::SystemTime)
            .with_file(true)
            .with_line_number(true)
            .with_target(false);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(terminal_layer)
            .with(file_layer);
        tracing::subscriber::set_global_default(subscriber).context("Failed to set global tracing subscriber")?;

        // Keep the file appender alive for the rest of the process
        let _ = GUARD.set(guard);
    } else {
        let subscriber = tracing_subscriber::registry().with(env_filter).with(terminal_layer);
        tracing::subscriber::set_global_default(subscriber).context("Failed to set global tracing subscriber")?;
    }

    // Forward events from log crate to tracing
    LogTracer::init().map_err(|e| anyhow!("Failed to initialize log tracer: {}", e))?;

    if to_file {
        tracing::info!("Logging system initialized, output to file: {}", log_file_path().display());
    } else {
        tracing::debug!("Logging system initialized, output to console");
    }
    Ok(())
}

/// Read the last lines of the log file
pub fn read_log_tail(lines: usize) -> Result<String> {
    let log_file = log_file_path();

    if !log_file.exists() {
        return Ok("Log file does not exist".to_string());
    }

    let file = File::open(&log_file).with_context(|| format!("Cannot open log file: {}", log_file.display()))?;

    let reader = BufReader::new(file);
    let log_lines: Vec<String> = reader
        .lines()
        .collect::<io::Result<Vec<String>>>()
        .with_context(|| "Failed to read log file")?;

    Ok(tail(&log_lines, lines))
}

fn tail(log_lines: &[String], lines: usize) -> String {
    if log_lines.is_empty() {
        "Log file is empty".to_string()
    } else {
        log_lines[log_lines.len().saturating_sub(lines)..].join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("verbose"), Level::INFO);
    }

    #[test]
    fn test_tail() {
        let lines: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(tail(&lines, 2), "b\nc");
        assert_eq!(tail(&lines, 10), "a\nb\nc");
        assert_eq!(tail(&[], 3), "Log file is empty");
    }

    #[test]
    fn test_log_paths() {
        assert!(log_dir_path().ends_with("nbcloud/logs"));
        assert!(log_file_path().starts_with(log_dir_path()));
    }

    #[test]
    fn test_init_logger_is_idempotent() {
        init_logger("debug", false).unwrap();
        init_logger("info", false).unwrap();
    }
}
