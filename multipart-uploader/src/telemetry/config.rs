use serde::*;
use tracing::metadata::LevelFilter;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::Directive;

/// Logging configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct TelemetryConfig {
    #[serde(default = "default_enabled")]
    pub enable: bool,
    /// Global level, applied before the per-output ones.
    #[serde(default = "Default::default")]
    pub max_level: LoggingLevel,
    /// Extra `EnvFilter` directives, e.g. `service_upload=debug`.
    #[serde(default = "Default::default")]
    pub level_filter: String,
    /// Environment variable read for directives instead of `RUST_LOG`.
    #[serde(default = "Default::default")]
    pub level_filter_env: String,
    #[serde(default = "Default::default")]
    pub console: ConsoleConfig,
    #[serde(default = "Default::default")]
    pub file: FileConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enable: default_enabled(),
            max_level: Default::default(),
            level_filter: Default::default(),
            level_filter_env: Default::default(),
            console: Default::default(),
            file: Default::default(),
        }
    }
}

#[derive(Default, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub enum LoggingLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
    Off,
}

impl From<LoggingLevel> for LevelFilter {
    fn from(val: LoggingLevel) -> Self {
        match val {
            LoggingLevel::Error => LevelFilter::ERROR,
            LoggingLevel::Warn => LevelFilter::WARN,
            LoggingLevel::Info => LevelFilter::INFO,
            LoggingLevel::Debug => LevelFilter::DEBUG,
            LoggingLevel::Trace => LevelFilter::TRACE,
            LoggingLevel::Off => LevelFilter::OFF,
        }
    }
}

impl From<LoggingLevel> for Directive {
    fn from(val: LoggingLevel) -> Self {
        let level: LevelFilter = val.into();
        level.into()
    }
}

/// Output to stderr.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ConsoleConfig {
    #[serde(default = "default_enabled")]
    pub enable: bool,
    /// Print file, line, thread and target with each record.
    #[serde(default = "Default::default")]
    pub enable_debug_logging: bool,
    #[serde(default = "Default::default")]
    pub max_level: LoggingLevel,
    #[serde(default = "Default::default")]
    pub level_filter: String,
    #[serde(default = "Default::default")]
    pub level_filter_env: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enable: default_enabled(),
            enable_debug_logging: Default::default(),
            max_level: Default::default(),
            level_filter: Default::default(),
            level_filter_env: Default::default(),
        }
    }
}

/// Output to log files, off unless enabled.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct FileConfig {
    #[serde(default = "Default::default")]
    pub enable: bool,
    #[serde(default = "Default::default")]
    pub enable_debug_logging: bool,
    #[serde(default = "Default::default")]
    pub max_level: LoggingLevel,
    #[serde(default = "Default::default")]
    pub level_filter: String,
    #[serde(default = "Default::default")]
    pub level_filter_env: String,
    /// Log directory, `./logs` by default.
    #[serde(default = "default_path")]
    pub path: String,
    /// Log file name, or its prefix when rolling.
    #[serde(default = "default_filename")]
    pub prefix: String,
    #[serde(default = "Default::default")]
    pub rolling_time: RotationLevel,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enable: Default::default(),
            enable_debug_logging: Default::default(),
            max_level: Default::default(),
            level_filter: Default::default(),
            level_filter_env: Default::default(),
            path: default_path(),
            prefix: default_filename(),
            rolling_time: Default::default(),
        }
    }
}

#[derive(Default, Deserialize, Serialize, Clone, Debug)]
pub enum RotationLevel {
    Daily,
    Hourly,
    Minutely,
    #[default]
    Never,
}

impl From<RotationLevel> for Rotation {
    fn from(val: RotationLevel) -> Self {
        match val {
            RotationLevel::Daily => Rotation::DAILY,
            RotationLevel::Hourly => Rotation::HOURLY,
            RotationLevel::Minutely => Rotation::MINUTELY,
            RotationLevel::Never => Rotation::NEVER,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_path() -> String {
    "./logs".to_string()
}

fn default_filename() -> String {
    "multipart-uploader.log".to_string()
}
