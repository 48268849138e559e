//! Configuration management for league-sync
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables. Every field has a default so an
//! empty document is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "LEAGUE_SYNC_";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Upstream provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Distributed lock configuration
    #[serde(default)]
    pub lock: LockConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Scheduler loop configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Sync policy configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Health thresholds
    #[serde(default)]
    pub health: HealthConfig,

    /// OpenTelemetry configuration
    #[serde(default)]
    pub otel: OtelConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables with prefix LEAGUE_SYNC_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay the handful of settings that deployments set per environment
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(url) = env_var("PROVIDER_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(key) = env_var("PROVIDER_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(path) = env_var("DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(backend) = env_var("CACHE_BACKEND") {
            self.cache.backend = parse_enum(&backend, "CACHE_BACKEND")?;
        }
        if let Some(url) = env_var("REDIS_URL") {
            self.cache.redis.url = url.clone();
            self.lock.redis_url = Some(url);
        }
        if let Some(backend) = env_var("LOCK_BACKEND") {
            self.lock.backend = parse_enum(&backend, "LOCK_BACKEND")?;
        }
        if let Some(enabled) = env_var("OTEL_ENABLED") {
            self.otel.enabled = enabled.parse().unwrap_or(false);
        }
        if let Some(endpoint) = env_var("OTEL_ENDPOINT") {
            self.otel.endpoint = Some(endpoint);
        }
        if let Some(level) = env_var("LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Reject combinations that would make the engine misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.base_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired("provider.base_url".into()));
        }
        if self.sync.future_days == 0 {
            return Err(ConfigError::InvalidValue(
                "sync.future_days must be at least 1".into(),
            ));
        }
        if self.sync.expected_team_count == 0 {
            return Err(ConfigError::InvalidValue(
                "sync.expected_team_count must be positive".into(),
            ));
        }
        if !(-12..=14).contains(&self.sync.utc_offset_hours) {
            return Err(ConfigError::InvalidValue(format!(
                "sync.utc_offset_hours out of range: {}",
                self.sync.utc_offset_hours
            )));
        }
        if self.scheduler.live_interval_secs == 0 || self.scheduler.baseline_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "scheduler intervals must be positive".into(),
            ));
        }
        if self.provider.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidValue(
                "provider.circuit_breaker.failure_threshold must be positive".into(),
            ));
        }
        if self.lock.lease_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "lock.lease_secs must be positive".into(),
            ));
        }
        // A unit outliving its lease would let a second instance run it concurrently
        if self.sync.unit_timeout_secs >= self.lock.lease_secs {
            return Err(ConfigError::InvalidValue(format!(
                "sync.unit_timeout_secs ({}) must be shorter than lock.lease_secs ({})",
                self.sync.unit_timeout_secs, self.lock.lease_secs
            )));
        }
        if self.sync.unit_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "sync.unit_timeout_secs must be positive".into(),
            ));
        }
        if self.cache.max_size_mb == 0 {
            return Err(ConfigError::InvalidValue(
                "cache.max_size_mb must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{name}")).ok()
}

fn parse_enum<T: serde::de::DeserializeOwned>(value: &str, name: &str) -> Result<T, ConfigError> {
    serde_yaml::from_str(value.trim())
        .map_err(|_| ConfigError::InvalidValue(format!("{ENV_PREFIX}{name}={value}")))
}

/// Upstream sports data provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Base URL of the provider API
    #[serde(default = "default_provider_url")]
    pub base_url: String,

    /// API key sent in the Authorization header
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Upper bound for one logical call, including pagination
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Page size requested from paginated endpoints
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout(),
            call_timeout_secs: default_call_timeout(),
            page_size: default_page_size(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

fn default_provider_url() -> String {
    "https://api.balldontlie.io/v1".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_call_timeout() -> u64 {
    60
}

fn default_page_size() -> u32 {
    100
}

/// Retry configuration for provider calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff duration in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Whether to add jitter to backoff
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

/// Rate limiting configuration for HTTP clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    /// Minimum interval between requests in milliseconds
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,

    /// Maximum number of concurrent requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Assumed wait when a 429 carries no Retry-After header (seconds)
    #[serde(default = "default_rate_limit_wait")]
    pub rate_limit_wait_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval(),
            max_concurrent: default_max_concurrent(),
            rate_limit_wait_secs: default_rate_limit_wait(),
        }
    }
}

fn default_min_interval() -> u64 {
    1000
}

fn default_max_concurrent() -> usize {
    2
}

fn default_rate_limit_wait() -> u64 {
    60
}

/// Circuit breaker guarding the provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive transient failures that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Failures older than this window do not count towards the threshold
    #[serde(default = "default_failure_window")]
    pub failure_window_secs: u64,

    /// How long the circuit stays open before a trial call
    #[serde(default = "default_open_duration")]
    pub open_duration_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            failure_window_secs: default_failure_window(),
            open_duration_secs: default_open_duration(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_failure_window() -> u64 {
    120
}

fn default_open_duration() -> u64 {
    60
}

/// Which cache backend to run against
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Memory,
    Redis,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackendKind,

    /// Size budget for the in-memory backend
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,

    #[serde(default)]
    pub redis: RedisCacheConfig,

    #[serde(default)]
    pub ttl: CacheTtlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::default(),
            max_size_mb: default_max_size_mb(),
            redis: RedisCacheConfig::default(),
            ttl: CacheTtlConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb * 1024 * 1024
    }
}

fn default_max_size_mb() -> u64 {
    64
}

/// Redis cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedisCacheConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Key prefix for all cache entries
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,

    /// Timeout for establishing the connection
    #[serde(default = "default_redis_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Timeout applied to every cache command
    #[serde(default = "default_redis_op_timeout")]
    pub op_timeout_ms: u64,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            prefix: default_redis_prefix(),
            connect_timeout_ms: default_redis_connect_timeout(),
            op_timeout_ms: default_redis_op_timeout(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_redis_prefix() -> String {
    "league-sync:cache:".to_string()
}

fn default_redis_connect_timeout() -> u64 {
    2000
}

fn default_redis_op_timeout() -> u64 {
    500
}

/// Per-category cache lifetimes (seconds)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheTtlConfig {
    #[serde(default = "default_teams_ttl")]
    pub teams_secs: u64,

    #[serde(default = "default_games_ttl")]
    pub games_secs: u64,

    /// Used for dates that currently have games in progress
    #[serde(default = "default_live_games_ttl")]
    pub live_games_secs: u64,

    #[serde(default = "default_stats_ttl")]
    pub stats_secs: u64,

    /// Refresh the lifetime on every hit instead of counting from the write
    #[serde(default)]
    pub sliding: bool,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            teams_secs: default_teams_ttl(),
            games_secs: default_games_ttl(),
            live_games_secs: default_live_games_ttl(),
            stats_secs: default_stats_ttl(),
            sliding: false,
        }
    }
}

fn default_teams_ttl() -> u64 {
    86_400
}

fn default_games_ttl() -> u64 {
    300
}

fn default_live_games_ttl() -> u64 {
    30
}

fn default_stats_ttl() -> u64 {
    600
}

/// Which lock backend coordinates instances
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LockBackendKind {
    /// In-process only; correct for a single instance
    #[default]
    Local,
    Sqlite,
    Redis,
    /// No coordination at all
    None,
}

/// Distributed lock configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockConfig {
    #[serde(default)]
    pub backend: LockBackendKind,

    /// Lease length; a crashed holder releases after this
    #[serde(default = "default_lease")]
    pub lease_secs: u64,

    /// How long to wait for a held lock before skipping the unit
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,

    #[serde(default = "default_lock_retry_interval")]
    pub retry_interval_ms: u64,

    #[serde(default = "default_lock_prefix")]
    pub key_prefix: String,

    /// Defaults to the cache redis URL
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Timeout applied to every backend command
    #[serde(default = "default_lock_op_timeout")]
    pub op_timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: LockBackendKind::default(),
            lease_secs: default_lease(),
            max_wait_secs: default_max_wait(),
            retry_interval_ms: default_lock_retry_interval(),
            key_prefix: default_lock_prefix(),
            redis_url: None,
            op_timeout_ms: default_lock_op_timeout(),
        }
    }
}

impl LockConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

fn default_lease() -> u64 {
    300
}

fn default_max_wait() -> u64 {
    10
}

fn default_lock_retry_interval() -> u64 {
    500
}

fn default_lock_prefix() -> String {
    "league-sync:lock:".to_string()
}

fn default_lock_op_timeout() -> u64 {
    1000
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// How long a writer waits on a locked database
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

fn default_database_path() -> String {
    "data/league-sync.db".to_string()
}

fn default_busy_timeout() -> u64 {
    5000
}

/// Scheduler loop configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Interval while games are in progress
    #[serde(default = "default_live_interval")]
    pub live_interval_secs: u64,

    /// Interval with no live games
    #[serde(default = "default_baseline_interval")]
    pub baseline_interval_secs: u64,

    /// Interval when no upcoming games are known; `null` disables it
    #[serde(default = "default_off_season_interval")]
    pub off_season_interval_secs: Option<u64>,

    /// Sleep after a tick that failed as a whole
    #[serde(default = "default_error_cooldown")]
    pub error_cooldown_secs: u64,

    /// Upper bound for one tick
    #[serde(default = "default_tick_timeout")]
    pub tick_timeout_secs: u64,

    /// Delay before the first tick
    #[serde(default)]
    pub initial_delay_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            live_interval_secs: default_live_interval(),
            baseline_interval_secs: default_baseline_interval(),
            off_season_interval_secs: default_off_season_interval(),
            error_cooldown_secs: default_error_cooldown(),
            tick_timeout_secs: default_tick_timeout(),
            initial_delay_secs: 0,
        }
    }
}

fn default_live_interval() -> u64 {
    60
}

fn default_baseline_interval() -> u64 {
    900
}

fn default_off_season_interval() -> Option<u64> {
    Some(21_600)
}

fn default_error_cooldown() -> u64 {
    120
}

fn default_tick_timeout() -> u64 {
    900
}

/// How often the yesterday/future units run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CadenceMode {
    /// Elapsed time since the unit last succeeded
    #[default]
    WallClock,
    /// Number of ticks since the unit last succeeded
    TickCount,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CadenceConfig {
    #[serde(default)]
    pub mode: CadenceMode,

    #[serde(default = "default_yesterday_interval")]
    pub yesterday_interval_secs: u64,

    #[serde(default = "default_future_interval")]
    pub future_interval_secs: u64,

    #[serde(default = "default_yesterday_ticks")]
    pub yesterday_every_n_ticks: u32,

    #[serde(default = "default_future_ticks")]
    pub future_every_n_ticks: u32,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            mode: CadenceMode::default(),
            yesterday_interval_secs: default_yesterday_interval(),
            future_interval_secs: default_future_interval(),
            yesterday_every_n_ticks: default_yesterday_ticks(),
            future_every_n_ticks: default_future_ticks(),
        }
    }
}

fn default_yesterday_interval() -> u64 {
    21_600
}

fn default_future_interval() -> u64 {
    10_800
}

fn default_yesterday_ticks() -> u32 {
    24
}

fn default_future_ticks() -> u32 {
    12
}

/// Sync policy configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// Teams are only fetched while fewer than this many are stored
    #[serde(default = "default_expected_teams")]
    pub expected_team_count: u64,

    /// Number of days after today covered by the future unit
    #[serde(default = "default_future_days")]
    pub future_days: u32,

    /// League-local offset used to decide what "today" is
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,

    /// Upper bound for one unit
    #[serde(default = "default_unit_timeout")]
    pub unit_timeout_secs: u64,

    #[serde(default)]
    pub cadence: CadenceConfig,

    /// Whether box-score lines are synced for live and finished games
    #[serde(default = "default_player_stats")]
    pub player_stats: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            expected_team_count: default_expected_teams(),
            future_days: default_future_days(),
            utc_offset_hours: default_utc_offset(),
            unit_timeout_secs: default_unit_timeout(),
            cadence: CadenceConfig::default(),
            player_stats: default_player_stats(),
        }
    }
}

fn default_expected_teams() -> u64 {
    30
}

fn default_future_days() -> u32 {
    7
}

fn default_utc_offset() -> i32 {
    -5
}

fn default_unit_timeout() -> u64 {
    120
}

fn default_player_stats() -> bool {
    true
}

/// Health evaluation thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthConfig {
    /// Hit rate (percent) below which the cache counts as degraded
    #[serde(default = "default_min_hit_rate")]
    pub min_hit_rate_percent: f64,

    /// The hit rate is only judged after this many requests
    #[serde(default = "default_min_requests")]
    pub min_requests_for_hit_rate: u64,

    /// More consecutive failures than this is unhealthy
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u64,

    /// No successful sync for longer than this is degraded
    #[serde(default = "default_max_staleness")]
    pub max_sync_staleness_secs: u64,

    /// How often the binary logs a health report
    #[serde(default = "default_health_log_interval")]
    pub log_interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            min_hit_rate_percent: default_min_hit_rate(),
            min_requests_for_hit_rate: default_min_requests(),
            max_consecutive_failures: default_max_consecutive_failures(),
            max_sync_staleness_secs: default_max_staleness(),
            log_interval_secs: default_health_log_interval(),
        }
    }
}

fn default_min_hit_rate() -> f64 {
    10.0
}

fn default_min_requests() -> u64 {
    100
}

fn default_max_consecutive_failures() -> u64 {
    5
}

fn default_max_staleness() -> u64 {
    6 * 3600
}

fn default_health_log_interval() -> u64 {
    300
}

/// OpenTelemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtelConfig {
    /// Whether OpenTelemetry is enabled
    #[serde(default)]
    pub enabled: bool,

    /// OTLP endpoint URL
    pub endpoint: Option<String>,

    /// Whether to use insecure connection
    #[serde(default)]
    pub insecure: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            insecure: false,
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "league-sync".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: `json` or `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: Parse complete configuration from YAML
    #[test]
    fn test_parse_complete_yaml_config() {
        let yaml = r#"
provider:
  base_url: "https://stats.example.com/v1"
  api_key: "k-123"
  call_timeout_secs: 20
  retry:
    max_retries: 5
    initial_backoff_ms: 100
  circuit_breaker:
    failure_threshold: 3
    open_duration_secs: 15

cache:
  backend: redis
  max_size_mb: 16
  redis:
    url: "redis://cache:6379"
  ttl:
    games_secs: 120
    sliding: true

lock:
  backend: sqlite
  lease_secs: 60
  max_wait_secs: 2

scheduler:
  live_interval_secs: 30
  baseline_interval_secs: 600
  off_season_interval_secs: null

sync:
  expected_team_count: 32
  future_days: 3
  utc_offset_hours: -8
  unit_timeout_secs: 45
  cadence:
    mode: tick_count
    yesterday_every_n_ticks: 4

health:
  max_consecutive_failures: 2

logging:
  level: debug
  format: pretty
"#;

        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.provider.base_url, "https://stats.example.com/v1");
        assert_eq!(config.provider.api_key.as_deref(), Some("k-123"));
        assert_eq!(config.provider.call_timeout_secs, 20);
        assert_eq!(config.provider.retry.max_retries, 5);
        assert_eq!(config.provider.retry.initial_backoff_ms, 100);
        assert_eq!(config.provider.retry.max_backoff_ms, 30_000);
        assert_eq!(config.provider.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.provider.circuit_breaker.failure_window_secs, 120);

        assert_eq!(config.cache.backend, CacheBackendKind::Redis);
        assert_eq!(config.cache.max_size_bytes(), 16 * 1024 * 1024);
        assert_eq!(config.cache.redis.url, "redis://cache:6379");
        assert_eq!(config.cache.redis.prefix, "league-sync:cache:");
        assert_eq!(config.cache.ttl.games_secs, 120);
        assert!(config.cache.ttl.sliding);

        assert_eq!(config.lock.backend, LockBackendKind::Sqlite);
        assert_eq!(config.lock.lease(), Duration::from_secs(60));
        assert_eq!(config.lock.max_wait(), Duration::from_secs(2));

        assert_eq!(config.scheduler.live_interval_secs, 30);
        assert_eq!(config.scheduler.off_season_interval_secs, None);

        assert_eq!(config.sync.expected_team_count, 32);
        assert_eq!(config.sync.future_days, 3);
        assert_eq!(config.sync.utc_offset_hours, -8);
        assert_eq!(config.sync.unit_timeout_secs, 45);
        assert_eq!(config.sync.cadence.mode, CadenceMode::TickCount);
        assert_eq!(config.sync.cadence.yesterday_every_n_ticks, 4);
        assert_eq!(config.sync.cadence.future_every_n_ticks, 12);

        assert_eq!(config.health.max_consecutive_failures, 2);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");
    }

    // Test 2: Default values applied for empty document
    #[test]
    fn test_empty_yaml_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config, Config::default());

        assert_eq!(config.cache.backend, CacheBackendKind::Memory);
        assert_eq!(config.lock.backend, LockBackendKind::Local);
        assert_eq!(config.lock.lease_secs, 300);
        assert_eq!(config.lock.max_wait_secs, 10);
        assert_eq!(config.scheduler.live_interval_secs, 60);
        assert_eq!(config.scheduler.off_season_interval_secs, Some(21_600));
        assert_eq!(config.sync.cadence.mode, CadenceMode::WallClock);
        assert_eq!(config.sync.expected_team_count, 30);
        assert_eq!(config.health.min_hit_rate_percent, 10.0);
        assert_eq!(config.health.min_requests_for_hit_rate, 100);
        assert_eq!(config.health.max_consecutive_failures, 5);
        assert_eq!(config.health.max_sync_staleness_secs, 21_600);
    }

    // Test 3: Environment variable expansion
    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("TEST_LS_API_KEY", "env_secret");
        std::env::set_var("TEST_LS_DB_PATH", "/var/data/test.db");

        let yaml = r#"
provider:
  api_key: "${TEST_LS_API_KEY}"

database:
  path: "${TEST_LS_DB_PATH}"
"#;

        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.provider.api_key, Some("env_secret".to_string()));
        assert_eq!(config.database.path, "/var/data/test.db");

        std::env::remove_var("TEST_LS_API_KEY");
        std::env::remove_var("TEST_LS_DB_PATH");
    }

    // Test 4: from_env loads config from environment variables
    #[test]
    fn test_from_env() {
        std::env::set_var("LEAGUE_SYNC_PROVIDER_API_KEY", "abc");
        std::env::set_var("LEAGUE_SYNC_DATABASE_PATH", "/env/test.db");
        std::env::set_var("LEAGUE_SYNC_CACHE_BACKEND", "redis");
        std::env::set_var("LEAGUE_SYNC_LOCK_BACKEND", "none");
        std::env::set_var("LEAGUE_SYNC_REDIS_URL", "redis://r:6379");

        let config = Config::from_env().unwrap();

        assert_eq!(config.provider.api_key.as_deref(), Some("abc"));
        assert_eq!(config.database.path, "/env/test.db");
        assert_eq!(config.cache.backend, CacheBackendKind::Redis);
        assert_eq!(config.lock.backend, LockBackendKind::None);
        assert_eq!(config.cache.redis.url, "redis://r:6379");
        assert_eq!(config.lock.redis_url.as_deref(), Some("redis://r:6379"));

        std::env::remove_var("LEAGUE_SYNC_PROVIDER_API_KEY");
        std::env::remove_var("LEAGUE_SYNC_DATABASE_PATH");
        std::env::remove_var("LEAGUE_SYNC_CACHE_BACKEND");
        std::env::remove_var("LEAGUE_SYNC_LOCK_BACKEND");
        std::env::remove_var("LEAGUE_SYNC_REDIS_URL");
    }

    // Test 5: Parse error for invalid YAML
    #[test]
    fn test_parse_error_invalid_yaml() {
        let yaml = r#"
scheduler:
  live_interval_secs: "not_a_number"
"#;
        match Config::from_yaml(yaml) {
            Err(ConfigError::Parse(msg)) => assert!(msg.contains("Failed to parse YAML")),
            other => panic!("Expected parse error, got {other:?}"),
        }
    }

    // Test 6: Validation rejects nonsensical values
    #[test]
    fn test_validation_rejects_bad_values() {
        let err = Config::from_yaml("sync:\n  future_days: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));

        let err = Config::from_yaml("sync:\n  utc_offset_hours: 20\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));

        let err = Config::from_yaml("provider:\n  base_url: \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired(_)));

        let err = Config::from_yaml("cache:\n  backend: memcached\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    // Test 7: A unit must time out before its lock lease runs out
    #[test]
    fn test_unit_timeout_shorter_than_lease() {
        let err = Config::from_yaml("lock:\n  lease_secs: 60\nsync:\n  unit_timeout_secs: 60\n")
            .unwrap_err();
        match err {
            ConfigError::InvalidValue(msg) => assert!(msg.contains("lock.lease_secs")),
            other => panic!("Expected invalid value, got {other:?}"),
        }

        let err = Config::from_yaml("lock:\n  lease_secs: 30\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));

        let config = Config::from_yaml("lock:\n  lease_secs: 60\nsync:\n  unit_timeout_secs: 59\n").unwrap();
        assert_eq!(config.sync.unit_timeout_secs, 59);
    }

    // Test 8: Serialization roundtrip keeps enums readable
    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = Config::default();
        config.lock.backend = LockBackendKind::Redis;
        config.sync.cadence.mode = CadenceMode::TickCount;

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("backend: redis"));
        assert!(yaml.contains("mode: tick_count"));

        let parsed = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config, parsed);
    }
}
