//! Market vocabulary shared by every crate in the relay.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Zero-quantity sentinel the exchange sends for a removed price level.
pub const ZERO_QUANTITY: &str = "0.00000000";

/// Normalizes an exchange ticker (e.g. `BTCUSDT`) to the stored lowercase form.
#[must_use]
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_lowercase()
}

/// Side of an order book level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Bid,
    Ask,
}

impl BookSide {
    pub const BOTH: [BookSide; 2] = [BookSide::Bid, BookSide::Ask];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            BookSide::Bid => "bid",
            BookSide::Ask => "ask",
        }
    }

    /// Parses from string (non-failing version).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bid" | "bids" => Some(Self::Bid),
            "ask" | "asks" => Some(Self::Ask),
            _ => None,
        }
    }
}

impl fmt::Display for BookSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a persisted order book level. Closed levels are kept as history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelStatus {
    Open,
    Closed,
}

impl LevelStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            LevelStatus::Open => "open",
            LevelStatus::Closed => "closed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for LevelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Crossover signal direction.
///
/// `Hold` is never emitted by the crossover itself; it is the implied state
/// of a (symbol, interval) pair that has not emitted anything yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalDirection {
    Buy,
    Sell,
    Hold,
}

impl SignalDirection {
    /// Lowercase form stored in the audit trail.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SignalDirection::Buy => "buy",
            SignalDirection::Sell => "sell",
            SignalDirection::Hold => "hold",
        }
    }

    /// Uppercase marker stored in the cache as the last emitted signal.
    #[must_use]
    pub const fn marker(&self) -> &'static str {
        match self {
            SignalDirection::Buy => "BUY",
            SignalDirection::Sell => "SELL",
            SignalDirection::Hold => "HOLD",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Some(Self::Buy),
            "sell" => Some(Self::Sell),
            "hold" => Some(Self::Hold),
            _ => None,
        }
    }
}

impl fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
