//! Stream kinds and broker topic roles.
//!
//! A stream kind is the category of exchange feed a supervisor task reads.
//! Each kind publishes onto one raw topic; some raw topics have a secondary
//! topic that carries document-writer envelopes to relational handlers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::TopicsConfig;

/// Category of exchange feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Aggregated trade ticks (`@aggTrade`)
    Trade,
    /// Order book depth snapshots (`@depth`)
    Depth,
    /// Interval candles (`@kline_{interval}`), one stream per signal interval
    Candle,
}

impl StreamKind {
    pub const ALL: [StreamKind; 3] = [StreamKind::Trade, StreamKind::Depth, StreamKind::Candle];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Trade => "trade",
            StreamKind::Depth => "depth",
            StreamKind::Candle => "candle",
        }
    }

    /// Raw topic role this kind publishes onto.
    #[must_use]
    pub const fn raw_topic(&self) -> TopicRole {
        match self {
            StreamKind::Trade => TopicRole::RawTrade,
            StreamKind::Depth => TopicRole::RawDepth,
            StreamKind::Candle => TopicRole::RawCandle,
        }
    }

    /// Stream name suffix as used in exchange stream paths.
    ///
    /// Candle streams require an interval label; other kinds ignore it.
    #[must_use]
    pub fn stream_name(&self, interval: Option<&str>) -> String {
        match self {
            StreamKind::Trade => "aggTrade".to_string(),
            StreamKind::Depth => "depth".to_string(),
            StreamKind::Candle => format!("kline_{}", interval.unwrap_or("1m")),
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trade" | "aggtrade" => Ok(StreamKind::Trade),
            "depth" | "orderbook" => Ok(StreamKind::Depth),
            "candle" | "kline" | "candlestick" => Ok(StreamKind::Candle),
            _ => Err(anyhow::anyhow!(
                "Invalid stream kind: '{}'. Valid values: trade, depth, candle",
                s
            )),
        }
    }
}

/// Logical role of a broker topic. Concrete names come from [`TopicsConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicRole {
    RawTrade,
    RawDepth,
    RawCandle,
    RelationalTrade,
    RelationalDepth,
}

impl TopicRole {
    /// Resolves the configured topic name for this role.
    #[must_use]
    pub fn name<'a>(&self, topics: &'a TopicsConfig) -> &'a str {
        match self {
            TopicRole::RawTrade => &topics.raw_trade,
            TopicRole::RawDepth => &topics.raw_depth,
            TopicRole::RawCandle => &topics.raw_candle,
            TopicRole::RelationalTrade => &topics.relational_trade,
            TopicRole::RelationalDepth => &topics.relational_depth,
        }
    }

    /// Secondary topic a document writer forwards envelopes onto, if any.
    #[must_use]
    pub const fn relational(&self) -> Option<TopicRole> {
        match self {
            TopicRole::RawTrade => Some(TopicRole::RelationalTrade),
            TopicRole::RawDepth => Some(TopicRole::RelationalDepth),
            _ => None,
        }
    }
}

impl TopicsConfig {
    /// Maps a raw topic name back to the stream kind that feeds it.
    #[must_use]
    pub fn stream_kind(&self, topic: &str) -> Option<StreamKind> {
        StreamKind::ALL
            .into_iter()
            .find(|kind| kind.raw_topic().name(self) == topic)
    }
}
