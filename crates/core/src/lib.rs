pub mod config;
pub mod config_loader;
pub mod events;
pub mod market;

pub use config::{
    AppConfig, BrokerConfig, BrokerKind, DatabaseConfig, GroupsConfig, InitialOffset,
    RedisConfig, SignalConfig, StreamsConfig, TopicsConfig,
};
pub use config_loader::ConfigLoader;
pub use events::{StreamKind, TopicRole};
pub use market::{normalize_symbol, BookSide, LevelStatus, SignalDirection, ZERO_QUANTITY};
