//! Stream URL construction.

use market_relay_core::{normalize_symbol, StreamKind};

/// Trims trailing slashes and repeated `/ws` segments, then appends exactly one `/ws`.
#[must_use]
pub fn normalize_ws_base(base: &str) -> String {
    let mut trimmed = base.trim().trim_end_matches('/');
    while let Some(stripped) = trimmed.strip_suffix("/ws") {
        trimmed = stripped.trim_end_matches('/');
    }
    format!("{trimmed}/ws")
}

/// `{ws_base}/{symbol}@aggTrade`, `@depth` or `@kline_{interval}`.
#[must_use]
pub fn stream_url(ws_base: &str, symbol: &str, kind: StreamKind, interval: Option<&str>) -> String {
    format!(
        "{}/{}@{}",
        normalize_ws_base(ws_base),
        normalize_symbol(symbol),
        kind.stream_name(interval)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_gets_exactly_one_ws_segment() {
        for base in [
            "wss://stream.binance.com:443",
            "wss://stream.binance.com:443/",
            "wss://stream.binance.com:443/ws",
            "wss://stream.binance.com:443/ws/",
            "wss://stream.binance.com:443/ws/ws",
        ] {
            assert_eq!(normalize_ws_base(base), "wss://stream.binance.com:443/ws", "{base}");
        }
    }

    #[test]
    fn urls_per_stream_kind() {
        let base = "wss://stream.binance.com:443/ws";
        assert_eq!(
            stream_url(base, "BTCUSDT", StreamKind::Trade, None),
            "wss://stream.binance.com:443/ws/btcusdt@aggTrade"
        );
        assert_eq!(
            stream_url(base, "btcusdt", StreamKind::Depth, None),
            "wss://stream.binance.com:443/ws/btcusdt@depth"
        );
        assert_eq!(
            stream_url(base, "ethusdt", StreamKind::Candle, Some("1h")),
            "wss://stream.binance.com:443/ws/ethusdt@kline_1h"
        );
    }
}
