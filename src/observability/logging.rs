//! Logging configuration and utilities.

use std::sync::OnceLock;

use regex::Regex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Maximum number of characters of a payload that reaches a log line.
pub const PREVIEW_LIMIT: usize = 200;

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl From<LogLevel> for tracing::level_filters::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level when `RUST_LOG` is not set.
    pub level: LogLevel,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Include the module target.
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: false,
            include_target: true,
        }
    }
}

impl LogConfig {
    /// Creates a new log configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the log level.
    #[must_use]
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Switches to JSON output.
    #[must_use]
    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Sets whether the module target is printed.
    #[must_use]
    pub fn include_target(mut self, include: bool) -> Self {
        self.include_target = include;
        self
    }
}

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Returns `false` when
/// a global subscriber was already installed, in which case nothing changes.
pub fn init_tracing(config: &LogConfig) -> bool {
    let level: tracing::level_filters::LevelFilter = config.level.into();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let result = if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(config.include_target))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(config.include_target))
            .try_init()
    };

    result.is_ok()
}

fn redaction_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"Bearer\s+[A-Za-z0-9._~+/=-]+", "Bearer ***"),
            (r"fastgpt-[A-Za-z0-9_-]+", "fastgpt-***"),
            (r#"(?i)"?api[_-]?key"?\s*[=:]\s*"?[^\s,}"]+"?"#, "api_key=***"),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| {
            Regex::new(pattern).ok().map(|re| (re, replacement))
        })
        .collect()
    })
}

/// Masks bearer tokens and API keys.
pub fn redact(text: &str) -> String {
    redaction_patterns()
        .iter()
        .fold(text.to_string(), |acc, (re, replacement)| {
            re.replace_all(&acc, *replacement).into_owned()
        })
}

/// Redacts `text` and cuts it to [`PREVIEW_LIMIT`] characters.
pub fn preview(text: &str) -> String {
    let redacted = redact(text);
    if redacted.chars().count() <= PREVIEW_LIMIT {
        return redacted;
    }

    let mut cut: String = redacted.chars().take(PREVIEW_LIMIT).collect();
    cut.push_str("...");
    cut
}
