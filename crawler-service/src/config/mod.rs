use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;

/// Full configuration for the crawler service.
///
/// Loaded from `configuration.*` files and `APP__`-prefixed environment
/// variables (e.g. `APP__DATABASE__URL`, `APP__KAFKA__BROKERS`).
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    #[serde(flatten)]
    pub common: core_config::Config,

    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub otlp_endpoint: Option<String>,

    pub database: DatabaseConfig,
    pub mongodb: MongoConfig,
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub integration: IntegrationConfig,
    #[serde(default)]
    pub crawler: CrawlSettings,
    #[serde(default)]
    pub microsoft_rate_limit: MicrosoftRateLimit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    #[serde(default = "default_mongo_database")]
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_chunk_topic")]
    pub chunk_topic: String,
    #[serde(default = "default_google_signal_topic")]
    pub google_signal_topic: String,
    #[serde(default = "default_microsoft_signal_topic")]
    pub microsoft_signal_topic: String,
    #[serde(default = "default_notion_signal_topic")]
    pub notion_signal_topic: String,
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
}

impl KafkaConfig {
    /// Inbound acknowledgement topics, one per platform.
    pub fn signal_topics(&self) -> [&str; 3] {
        [
            self.google_signal_topic.as_str(),
            self.microsoft_signal_topic.as_str(),
            self.notion_signal_topic.as_str(),
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorConfig {
    pub endpoint: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9091".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntegrationConfig {
    pub endpoint: String,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9092".to_string(),
        }
    }
}

/// Tunables for the crawl pipeline itself.
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlSettings {
    /// Background refresh ticker interval.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Age past which a `requires_update` token is considered overdue.
    #[serde(default = "default_token_overdue_secs")]
    pub token_overdue_secs: i64,
    /// Upper bound for one background refresh cycle.
    #[serde(default = "default_refresh_cycle_timeout_secs")]
    pub refresh_cycle_timeout_secs: u64,
    /// Concurrent message/file fetchers inside Gmail and OneDrive crawls.
    #[serde(default = "default_fetch_workers")]
    pub fetch_workers: usize,
    /// Concurrent single-chunk retrievals per GetChunks request.
    #[serde(default = "default_retrieval_workers")]
    pub retrieval_workers: usize,
    /// Scratch space for OneDrive downloads before extraction.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: std::path::PathBuf,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            token_overdue_secs: default_token_overdue_secs(),
            refresh_cycle_timeout_secs: default_refresh_cycle_timeout_secs(),
            fetch_workers: default_fetch_workers(),
            retrieval_workers: default_retrieval_workers(),
            temp_dir: default_temp_dir(),
        }
    }
}

/// Microsoft Graph is the one governed service without built-in defaults;
/// deployments size it to their tenant throttling budget.
#[derive(Debug, Clone, Deserialize)]
pub struct MicrosoftRateLimit {
    #[serde(default = "default_ms_user_rate")]
    pub user_rate: u32,
    #[serde(default = "default_ms_user_burst")]
    pub user_burst: u32,
    #[serde(default = "default_ms_project_rate")]
    pub project_rate: u32,
    #[serde(default = "default_ms_project_burst")]
    pub project_burst: u32,
}

impl Default for MicrosoftRateLimit {
    fn default() -> Self {
        Self {
            user_rate: default_ms_user_rate(),
            user_burst: default_ms_user_burst(),
            project_rate: default_ms_project_rate(),
            project_burst: default_ms_project_burst(),
        }
    }
}

fn default_service_name() -> String {
    "crawler-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_mongo_database() -> String {
    "crawler".to_string()
}

fn default_chunk_topic() -> String {
    "text-chunks".to_string()
}

fn default_google_signal_topic() -> String {
    "google-crawling-signals".to_string()
}

fn default_microsoft_signal_topic() -> String {
    "microsoft-crawling-signals".to_string()
}

fn default_notion_signal_topic() -> String {
    "notion-crawling-signals".to_string()
}

fn default_consumer_group() -> String {
    "crawler-service".to_string()
}

fn default_refresh_interval_secs() -> u64 {
    30
}

fn default_token_overdue_secs() -> i64 {
    60
}

fn default_refresh_cycle_timeout_secs() -> u64 {
    300
}

fn default_fetch_workers() -> usize {
    10
}

fn default_retrieval_workers() -> usize {
    5
}

fn default_temp_dir() -> std::path::PathBuf {
    std::env::temp_dir().join("crawler-service")
}

fn default_ms_user_rate() -> u32 {
    20
}

fn default_ms_user_burst() -> u32 {
    40
}

fn default_ms_project_rate() -> u32 {
    100
}

fn default_ms_project_burst() -> u32 {
    200
}

impl CrawlerConfig {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crawl_settings_defaults() {
        let settings = CrawlSettings::default();
        assert_eq!(settings.refresh_interval_secs, 30);
        assert_eq!(settings.token_overdue_secs, 60);
        assert_eq!(settings.fetch_workers, 10);
    }

    #[test]
    fn kafka_defaults_deserialize() {
        let kafka: KafkaConfig =
            serde_json::from_value(serde_json::json!({ "brokers": "localhost:9092" })).unwrap();
        assert_eq!(kafka.chunk_topic, "text-chunks");
        assert_eq!(
            kafka.signal_topics(),
            [
                "google-crawling-signals",
                "microsoft-crawling-signals",
                "notion-crawling-signals"
            ]
        );
    }
}
