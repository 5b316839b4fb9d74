//! Logging setup shared by the CLI and worker processes.
//!
//! All output goes to stderr (and optionally a file). Stdout belongs to the
//! worker protocol and must never carry log lines.
//!
//! # Environment Variables
//!
//! - `FORKCALL_LOG` - Log filter (overrides RUST_LOG)
//! - `FORKCALL_LOG_LEVEL` - Log level: error, warn, info, debug, trace
//! - `FORKCALL_LOG_FORMAT` - Output format: pretty, compact, json
//! - `FORKCALL_LOG_FILE` - Path to log file (in addition to stderr)
//! - `RUST_LOG` - Standard Rust log filter (fallback)
//!
//! # Example
//!
//! ```no_run
//! use forkcall::logging::{LogConfig, init};
//!
//! // Initialize with default settings
//! init(LogConfig::default());
//!
//! // Or with custom configuration
//! let config = LogConfig::for_worker().with_env_overrides();
//! init(config);
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, MakeWriter, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// A formatting layer with its writer and format erased.
type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format (default for development)
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for log aggregation systems
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "full" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Unknown log format: '{}'. Valid options: pretty, compact, json",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Compact => write!(f, "compact"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Log rotation configuration for file output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogRotation {
    /// Rotate hourly
    Hourly,
    /// Rotate daily (default)
    #[default]
    Daily,
    /// Never rotate (single file)
    Never,
}

impl FromStr for LogRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "never" => Ok(Self::Never),
            _ => Err(format!(
                "Unknown log rotation: '{}'. Valid options: hourly, daily, never",
                s
            )),
        }
    }
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Logging configuration.
///
/// Use the builder methods to customize, then pass to [`init`] or [`init_with_file`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base log level (default: INFO)
    pub level: Level,
    /// Log format (default: Pretty)
    pub format: LogFormat,
    /// Path to log file (None = stderr only)
    pub file_path: Option<PathBuf>,
    /// Log rotation for file output (default: Daily)
    pub rotation: LogRotation,
    /// Log span timing on close (default: false)
    pub span_events: bool,
    /// Custom filter string (overrides level if set)
    pub filter: Option<String>,
    /// Show target module in logs (default: true)
    pub show_target: bool,
    /// Show thread IDs (default: false)
    pub show_thread_ids: bool,
    /// Show line numbers (default: false)
    pub show_line_numbers: bool,
    /// Colorize stderr output (default: true, never applied to files)
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            file_path: None,
            rotation: LogRotation::Daily,
            span_events: false,
            filter: None,
            show_target: true,
            show_thread_ids: false,
            show_line_numbers: false,
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Create a new LogConfig with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for worker processes.
    ///
    /// Workers share the caller's stderr, so they default to WARN and compact
    /// lines tagged with the thread ID. Environment overrides still apply.
    pub fn for_worker() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Compact,
            show_thread_ids: true,
            ..Self::default()
        }
    }

    /// Set the log level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set the log format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the log file path.
    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    /// Set log rotation.
    pub fn with_rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Enable span timing events.
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// Enable or disable colors on stderr.
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// Set a custom filter string.
    pub fn with_filter(mut self, filter: String) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Apply environment variable overrides.
    ///
    /// Reads from:
    /// - `FORKCALL_LOG` or `RUST_LOG` for filter (only if filter not already set from CLI)
    /// - `FORKCALL_LOG_FORMAT` for format
    /// - `FORKCALL_LOG_FILE` for file path
    /// - `FORKCALL_LOG_LEVEL` for level (only if filter not already set)
    ///
    /// Note: CLI arguments take precedence over environment variables. If a filter
    /// is already set (e.g., from -v or --log-level), env vars won't override it.
    pub fn with_env_overrides(mut self) -> Self {
        // FORKCALL_LOG takes precedence over RUST_LOG, and neither overrides -v/-q
        if self.filter.is_none() {
            if let Ok(filter) = std::env::var("FORKCALL_LOG") {
                self.filter = Some(filter);
            } else if let Ok(filter) = std::env::var("RUST_LOG") {
                self.filter = Some(filter);
            }
        }

        // FORKCALL_LOG_LEVEL overrides level (only if no filter is set)
        if self.filter.is_none()
            && let Ok(level_str) = std::env::var("FORKCALL_LOG_LEVEL")
        {
            self.level = parse_level(&level_str).unwrap_or(self.level);
        }

        // FORKCALL_LOG_FORMAT overrides format
        if let Ok(format) = std::env::var("FORKCALL_LOG_FORMAT")
            && let Ok(f) = format.parse()
        {
            self.format = f;
        }

        // FORKCALL_LOG_FILE enables file logging
        if let Ok(path) = std::env::var("FORKCALL_LOG_FILE") {
            self.file_path = Some(PathBuf::from(path));
        }

        self
    }

    /// Build one formatting layer for `writer` in the configured format.
    fn fmt_layer<W>(&self, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let span_events = if self.span_events {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let layer = fmt::layer()
            .with_span_events(span_events)
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids)
            .with_ansi(ansi)
            .with_writer(writer);

        match self.format {
            LogFormat::Json => layer.json().boxed(),
            LogFormat::Compact => layer.compact().with_line_number(self.show_line_numbers).boxed(),
            LogFormat::Pretty => layer.with_line_number(self.show_line_numbers).boxed(),
        }
    }

    /// Build the EnvFilter for this configuration.
    fn build_filter(&self) -> EnvFilter {
        if let Some(ref filter) = self.filter {
            EnvFilter::try_new(filter).unwrap_or_else(|_| {
                eprintln!("Warning: Invalid log filter '{}', using default", filter);
                EnvFilter::new(format!("{}", self.level).to_lowercase())
            })
        } else {
            EnvFilter::new(format!("{}", self.level).to_lowercase())
        }
    }
}

/// Parse a log level string.
fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

/// Initialize the global tracing subscriber.
///
/// This should be called once at program startup. Subsequent calls are silently ignored.
///
/// For file logging, use [`init_with_file`] instead.
///
/// # Example
///
/// ```no_run
/// use forkcall::logging::{LogConfig, init};
///
/// init(LogConfig::default());
/// ```
pub fn init(config: LogConfig) {
    let layers = vec![config.fmt_layer(std::io::stderr, config.ansi)];

    // Silently ignore if already initialized (idempotent)
    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(config.build_filter())
        .try_init();
}

/// Initialize logging with file appender support.
///
/// Logs to both stderr and the configured file. Falls back to [`init`] when
/// `config.file_path` is not set.
///
/// # Example
///
/// ```no_run
/// use std::path::PathBuf;
/// use forkcall::logging::{LogConfig, init_with_file};
///
/// let config = LogConfig::default().with_file(PathBuf::from("/var/log/forkcall.log"));
/// init_with_file(config);
/// ```
pub fn init_with_file(config: LogConfig) {
    let Some(path) = config.file_path.clone() else {
        init(config);
        return;
    };

    let parent = path.parent().unwrap_or(Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("forkcall.log");
    let appender = RollingFileAppender::new(config.rotation.into(), parent, file_name);

    let layers = vec![
        config.fmt_layer(std::io::stderr, config.ansi),
        config.fmt_layer(appender, false),
    ];

    // Silently ignore if already initialized
    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(config.build_filter())
        .try_init();
}
