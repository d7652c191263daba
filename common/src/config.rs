use config::{Config, ConfigError, FileFormat};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub storage: StorageSettings,
    #[serde(default)]
    pub s3: Option<S3Settings>,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// Root holding `song_data/` and `log_data/`.
    pub input_url: String,
    /// Root the five star-schema tables are written under.
    pub output_url: String,
}

/// Credentials and endpoint for S3-compatible stores (AWS or MinIO).
#[derive(Debug, Deserialize, Clone)]
pub struct S3Settings {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_s3_region")]
    pub region: String,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineSettings {
    #[serde(default = "default_song_data_pattern")]
    pub song_data_pattern: String,
    #[serde(default = "default_log_data_pattern")]
    pub log_data_pattern: String,
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,
    #[serde(default)]
    pub weekday_convention: WeekdayConvention,
    #[serde(default)]
    pub user_dedup: UserDedupPolicy,
    #[serde(default)]
    pub join_normalization: JoinKeyNormalization,
    #[serde(default = "default_max_rows_per_file")]
    pub max_rows_per_file: usize,
    #[serde(default = "default_read_concurrency")]
    pub read_concurrency: usize,
}

/// Numbering used for the `weekday` column of the time table.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeekdayConvention {
    /// 1 = Sunday ... 7 = Saturday
    #[default]
    SundayFirst,
    /// 1 = Monday ... 7 = Sunday (ISO 8601)
    MondayFirst,
}

/// How repeated users in the activity log collapse into the users table.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserDedupPolicy {
    /// One row per user_id, attributes taken from the latest event.
    #[default]
    LatestLevel,
    /// Plain row-distinct; a level change keeps both rows.
    ExactRow,
}

/// Matching applied to song title / artist name before the songplay join.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum JoinKeyNormalization {
    #[default]
    Exact,
    /// Trimmed, whitespace-collapsed, lowercased.
    Relaxed,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            song_data_pattern: default_song_data_pattern(),
            log_data_pattern: default_log_data_pattern(),
            shard_count: default_shard_count(),
            weekday_convention: WeekdayConvention::default(),
            user_dedup: UserDedupPolicy::default(),
            join_normalization: JoinKeyNormalization::default(),
            max_rows_per_file: default_max_rows_per_file(),
            read_concurrency: default_read_concurrency(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_song_data_pattern() -> String {
    "song_data/A/A/A/*.json".to_string()
}

fn default_log_data_pattern() -> String {
    "log_data/*/*/*.json".to_string()
}

fn default_shard_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_max_rows_per_file() -> usize {
    1_000_000
}

fn default_read_concurrency() -> usize {
    16
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;

        debug!(
            input = %settings.storage.input_url,
            output = %settings.storage.output_url,
            shards = settings.pipeline.shard_count,
            "Loaded pipeline settings"
        );

        Ok(settings)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
