use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub bloom: BloomConfig,
    #[serde(default)]
    pub ring: RingConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_cpu_count")]
    pub cpu_count: usize,
    /// 生成短链接时使用的外部基础 URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_code_length")]
    pub random_code_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 存储后端："memory" / "redis" / "sharded"
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// sharded 模式下的物理节点（name -> redis url）
    #[serde(default)]
    pub nodes: Vec<ShardNode>,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardNode {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// 全局缓存开关，关闭后 L2 不再回填
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_l1_capacity")]
    pub l1_capacity: usize,
    /// L2 插件名："redis" / "moka" / "null"
    #[serde(default = "default_l2_plugin")]
    pub l2_plugin: String,
    #[serde(default = "default_l2_ttl")]
    pub l2_ttl: u64,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_retry_timeout_secs")]
    pub retry_timeout_secs: u64,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BloomConfig {
    #[serde(default = "default_bloom_capacity")]
    pub capacity: usize,
    #[serde(default = "default_bloom_fp_rate")]
    pub fp_rate: f64,
    /// 启用计数数组以支持 remove
    #[serde(default = "default_true")]
    pub counting: bool,
    /// 为空则不做持久化
    #[serde(default)]
    pub persist_path: Option<String>,
    /// 读路径负向短路开关，默认关闭
    #[serde(default)]
    pub read_path_filter: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingConfig {
    #[serde(default = "default_virtual_nodes")]
    pub virtual_nodes_per_node: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 队列后端："memory" / "redis"
    #[serde(default = "default_queue_backend")]
    pub queue_backend: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_queue_key")]
    pub queue_key: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_prefetch")]
    pub prefetch: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rate_limit_max")]
    pub max_requests: u32,
    #[serde(default = "default_rate_limit_window")]
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 为空则输出到控制台
    #[serde(default)]
    pub file: Option<String>,
    /// "console" 或 "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_cpu_count() -> usize {
    num_cpus::get()
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_code_length() -> usize {
    7
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_command_timeout_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_l1_capacity() -> usize {
    1000
}

fn default_l2_plugin() -> String {
    "moka".to_string()
}

fn default_l2_ttl() -> u64 {
    60
}

fn default_key_prefix() -> String {
    "resilink:".to_string()
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_retry_timeout_secs() -> u64 {
    10
}

fn default_call_timeout_ms() -> u64 {
    1000
}

fn default_bloom_capacity() -> usize {
    100_000
}

fn default_bloom_fp_rate() -> f64 {
    0.01
}

fn default_virtual_nodes() -> usize {
    10
}

fn default_queue_backend() -> String {
    "memory".to_string()
}

fn default_queue_key() -> String {
    "resilink:clicks:queue".to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_prefetch() -> usize {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_rate_limit_max() -> u32 {
    100
}

fn default_rate_limit_window() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            cpu_count: default_cpu_count(),
            base_url: default_base_url(),
            random_code_length: default_code_length(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            redis_url: default_redis_url(),
            nodes: Vec::new(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            l1_capacity: default_l1_capacity(),
            l2_plugin: default_l2_plugin(),
            l2_ttl: default_l2_ttl(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            retry_timeout_secs: default_retry_timeout_secs(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            capacity: default_bloom_capacity(),
            fp_rate: default_bloom_fp_rate(),
            counting: true,
            persist_path: None,
            read_path_filter: false,
        }
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            virtual_nodes_per_node: default_virtual_nodes(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_backend: default_queue_backend(),
            redis_url: default_redis_url(),
            queue_key: default_queue_key(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            prefetch: default_prefetch(),
            max_retries: default_max_retries(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_rate_limit_max(),
            window_secs: default_rate_limit_window(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file with environment variable fallback
    pub fn load() -> Self {
        let mut config = Self::load_from_file();
        config.override_with_env();
        config
    }

    /// Load configuration from TOML file
    fn load_from_file() -> Self {
        let config_paths = [
            "resilink.toml",
            "config/resilink.toml",
            "/etc/resilink/resilink.toml",
        ];

        for path in &config_paths {
            if Path::new(path).exists() {
                debug!("Loading config from: {}", path);
                match fs::read_to_string(path) {
                    Ok(content) => match toml::from_str::<Config>(&content) {
                        Ok(config) => {
                            debug!("Successfully loaded config from: {}", path);
                            return config;
                        }
                        Err(e) => {
                            warn!("Failed to parse config file {}: {}", path, e);
                        }
                    },
                    Err(e) => {
                        warn!("Failed to read config file {}: {}", path, e);
                    }
                }
            }
        }

        debug!("No config file found, using defaults");
        Self::default()
    }

    /// Override configuration with environment variables
    fn override_with_env(&mut self) {
        // Server config
        if let Ok(host) = env::var("SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
        }
        if let Ok(cpu_count) = env::var("CPU_COUNT")
            && let Ok(count) = cpu_count.parse()
        {
            self.server.cpu_count = count;
        }
        if let Ok(base_url) = env::var("BASE_URL") {
            self.server.base_url = base_url;
        }

        // Storage config
        if let Ok(backend) = env::var("STORAGE_BACKEND") {
            self.storage.backend = backend;
        }
        if let Ok(redis_url) = env::var("REDIS_URL") {
            self.storage.redis_url = redis_url.clone();
            self.cache.redis_url = redis_url.clone();
            self.analytics.redis_url = redis_url;
        }

        // Cache config
        if let Ok(enabled) = env::var("CACHE_ENABLED") {
            self.cache.enabled = enabled == "true";
        }
        if let Ok(plugin) = env::var("CACHE_L2_PLUGIN") {
            self.cache.l2_plugin = plugin;
        }
        if let Ok(ttl) = env::var("CACHE_L2_TTL")
            && let Ok(ttl) = ttl.parse()
        {
            self.cache.l2_ttl = ttl;
        }

        // Bloom config
        if let Ok(path) = env::var("BLOOM_PERSIST_PATH") {
            self.bloom.persist_path = Some(path);
        }

        // Analytics config
        if let Ok(enabled) = env::var("ANALYTICS_ENABLED") {
            self.analytics.enabled = enabled == "true";
        }
        if let Ok(backend) = env::var("ANALYTICS_QUEUE_BACKEND") {
            self.analytics.queue_backend = backend;
        }

        // Logging config
        if let Ok(log_level) = env::var("RUST_LOG") {
            self.logging.level = log_level;
        }
    }

    /// Generate a sample TOML configuration file
    pub fn generate_sample_config() -> String {
        let sample_config = Config::default();
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }
}

// Global configuration instance
use std::sync::OnceLock;
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration instance
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(Config::load)
}

/// Initialize the global configuration
pub fn init_config() {
    CONFIG.get_or_init(Config::load);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.retry_timeout_secs, 10);
        assert_eq!(config.cache.l1_capacity, 1000);
        assert_eq!(config.cache.l2_ttl, 60);
        assert_eq!(config.analytics.batch_size, 10);
        assert_eq!(config.analytics.max_retries, 3);
        assert_eq!(config.ring.virtual_nodes_per_node, 10);
        assert!(!config.bloom.read_path_filter);
    }

    #[test]
    fn test_sample_config_roundtrip() {
        let sample = Config::generate_sample_config();
        let parsed: Config = toml::from_str(&sample).expect("sample config must parse");
        assert_eq!(parsed.server.port, 8080);
        assert_eq!(parsed.analytics.prefetch, 100);
    }
}
