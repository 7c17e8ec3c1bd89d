//! Moving average math and cache keys for the crossover windows.

use std::cmp::Ordering;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use market_relay_core::SignalDirection;
use rust_decimal::Decimal;

/// `{symbol}:{interval}:ma50` style key for a window of `len` closes.
#[must_use]
pub fn window_key(symbol: &str, interval: &str, len: usize) -> String {
    format!("{symbol}:{interval}:ma{len}")
}

/// `{symbol}:{interval}:lastSignal`
#[must_use]
pub fn last_signal_key(symbol: &str, interval: &str) -> String {
    format!("{symbol}:{interval}:lastSignal")
}

/// Arithmetic mean, `None` for an empty window.
///
/// # Errors
/// Returns an error if the window sum overflows `Decimal`.
pub fn moving_average(prices: &[Decimal]) -> Result<Option<Decimal>> {
    if prices.is_empty() {
        return Ok(None);
    }
    let sum = prices
        .iter()
        .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(*p))
        .ok_or_else(|| anyhow!("sum of {} cached closes overflows", prices.len()))?;
    Ok(Some(sum / Decimal::from(prices.len())))
}

/// Fast above slow is a buy, below is a sell, equal is no signal.
#[must_use]
pub fn crossover(fast_ma: Decimal, slow_ma: Decimal) -> Option<SignalDirection> {
    match fast_ma.cmp(&slow_ma) {
        Ordering::Greater => Some(SignalDirection::Buy),
        Ordering::Less => Some(SignalDirection::Sell),
        Ordering::Equal => None,
    }
}

/// Parses cached close prices.
///
/// # Errors
/// Returns an error naming the first entry that is not a decimal.
pub fn parse_window(values: &[String]) -> Result<Vec<Decimal>> {
    values
        .iter()
        .map(|v| Decimal::from_str(v).map_err(|e| anyhow!("invalid cached close {v:?}: {e}")))
        .collect()
}

/// Decimal rendered without trailing zeros, e.g. `200.0` as `"200"`.
#[must_use]
pub fn format_ma(value: Decimal) -> String {
    value.normalize().to_string()
}
