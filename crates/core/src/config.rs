use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub broker: BrokerConfig,
    pub streams: StreamsConfig,
    pub topics: TopicsConfig,
    pub groups: GroupsConfig,
    pub signals: SignalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
}

/// Which broker backend carries frames between stream tasks and consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    /// Redis Streams with consumer groups
    Redis,
    /// In-process partitioned log; only useful when streams and consumers share a process
    Memory,
}

/// Where a consumer group with no committed position starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialOffset {
    Earliest,
    Latest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub kind: BrokerKind,
    /// Partition count per topic for the in-process broker
    pub partitions: u32,
    pub initial_offset: InitialOffset,
    pub connect_attempts: u32,
    pub connect_delay_secs: u64,
    /// Approximate cap on stream length (per partition in process); 0 disables trimming
    pub stream_max_len: usize,
    /// How long a Redis consumer blocks waiting for new entries
    pub block_ms: usize,
}

impl BrokerConfig {
    #[must_use]
    pub fn connect_delay(&self) -> Duration {
        Duration::from_secs(self.connect_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamsConfig {
    pub dial_attempts: u32,
    pub dial_delay_secs: u64,
    /// Raw topics the supervisor opens streams for
    pub enabled: Vec<String>,
}

impl StreamsConfig {
    #[must_use]
    pub fn dial_delay(&self) -> Duration {
        Duration::from_secs(self.dial_delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    pub raw_trade: String,
    pub raw_depth: String,
    pub raw_candle: String,
    pub relational_trade: String,
    pub relational_depth: String,
}

/// Consumer group ids, one per (store, topic) loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupsConfig {
    pub trade_documents: String,
    pub depth_documents: String,
    pub candle_documents: String,
    pub trade_relational: String,
    pub depth_relational: String,
    pub candle_relational: String,
    pub candle_signals: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub fast_window: usize,
    pub slow_window: usize,
    /// Candles requested from the historical endpoint on cold start
    pub history_limit: u32,
    pub request_timeout_secs: u64,
    pub rate_limit_per_second: u32,
    pub history_attempts: u32,
    pub history_retry_delay_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/market_relay".to_string(),
            max_connections: 10,
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            kind: BrokerKind::Redis,
            partitions: 1,
            initial_offset: InitialOffset::Latest,
            connect_attempts: 5,
            connect_delay_secs: 5,
            stream_max_len: 100_000,
            block_ms: 5_000,
        }
    }
}

impl Default for StreamsConfig {
    fn default() -> Self {
        let topics = TopicsConfig::default();
        Self {
            dial_attempts: 5,
            dial_delay_secs: 5,
            enabled: vec![topics.raw_trade, topics.raw_depth, topics.raw_candle],
        }
    }
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            raw_trade: "agg-trade-data".to_string(),
            raw_depth: "depth-data".to_string(),
            raw_candle: "candlestick-data".to_string(),
            relational_trade: "agg-trade-data-pg".to_string(),
            relational_depth: "depth-data-pg".to_string(),
        }
    }
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self {
            trade_documents: "mongo-agg-trade-group".to_string(),
            depth_documents: "db-order-book-group".to_string(),
            candle_documents: "mongo-candle-stick-group".to_string(),
            trade_relational: "pg-agg-trade-group".to_string(),
            depth_relational: "pg-order-book-group".to_string(),
            candle_relational: "pg-candlestick-group".to_string(),
            candle_signals: "signal-candle-stick-group".to_string(),
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            fast_window: 50,
            slow_window: 200,
            history_limit: 200,
            request_timeout_secs: 30,
            rate_limit_per_second: 10,
            history_attempts: 3,
            history_retry_delay_ms: 1_000,
        }
    }
}
