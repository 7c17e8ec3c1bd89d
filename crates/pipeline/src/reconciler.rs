//! Order book reconciler.
//!
//! Each depth frame is a full snapshot. Per side, the previous snapshot is read
//! from the cache, prices that vanished or went to zero are closed in both
//! stores, every non-zero level is upserted, and the cached snapshot is
//! replaced by the new one. A failure on one price is logged and the rest of
//! the frame still applies.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use market_relay_broker::{BrokerMessage, MessageHandler};
use market_relay_core::{normalize_symbol, BookSide, LevelStatus, ZERO_QUANTITY};
use market_relay_data::models::orderbook::level_document_key;
use market_relay_data::{
    collections, Cache, DocumentStore, OrderBookLevelRecord, OrderBookStore, ReferenceData,
};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::frames::{decode_depth, DepthFrame};

/// `orderbook:{symbol}:{side}`
#[must_use]
pub fn snapshot_key(symbol: &str, side: BookSide) -> String {
    format!("orderbook:{symbol}:{}", side.as_str())
}

/// Zero is the exchange's `0.00000000` sentinel or any decimal equal to zero.
#[must_use]
pub fn is_zero_amount(amount: &str) -> bool {
    amount == ZERO_QUANTITY || Decimal::from_str(amount.trim()).is_ok_and(|d| d.is_zero())
}

/// Operations issued for one frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub closed: usize,
    pub upserted: usize,
    pub failed: usize,
}

impl std::ops::AddAssign for ReconcileReport {
    fn add_assign(&mut self, other: Self) {
        self.closed += other.closed;
        self.upserted += other.upserted;
        self.failed += other.failed;
    }
}

pub struct OrderBookReconciler {
    cache: Arc<dyn Cache>,
    store: Arc<dyn OrderBookStore>,
    documents: Arc<dyn DocumentStore>,
    reference: Arc<dyn ReferenceData>,
}

impl OrderBookReconciler {
    #[must_use]
    pub fn new(
        cache: Arc<dyn Cache>,
        store: Arc<dyn OrderBookStore>,
        documents: Arc<dyn DocumentStore>,
        reference: Arc<dyn ReferenceData>,
    ) -> Self {
        Self {
            cache,
            store,
            documents,
            reference,
        }
    }

    /// Applies one snapshot. `fallback_symbol` is used when the frame carries none.
    ///
    /// # Errors
    /// Returns an error if the symbol is not registered, since every stored level
    /// must reference a known symbol.
    pub async fn apply(&self, frame: &DepthFrame, fallback_symbol: &str) -> Result<ReconcileReport> {
        let symbol = normalize_symbol(frame.symbol.as_deref().unwrap_or(fallback_symbol));
        let registered = self
            .reference
            .find_symbol(&symbol)
            .await?
            .ok_or_else(|| anyhow!("Depth frame for unregistered symbol {symbol}"))?;

        let mut report = ReconcileReport::default();
        for side in BookSide::BOTH {
            report += self
                .apply_side(&symbol, registered.exchange_id, side, frame.levels(side))
                .await;
        }

        debug!(
            %symbol,
            closed = report.closed,
            upserted = report.upserted,
            failed = report.failed,
            "reconciled depth frame"
        );
        Ok(report)
    }

    async fn apply_side(
        &self,
        symbol: &str,
        exchange_id: Uuid,
        side: BookSide,
        levels: Vec<(String, String)>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let key = snapshot_key(symbol, side);

        let previous = match self.cache.hash_get_all(&key).await {
            Ok(previous) => previous,
            Err(e) => {
                // Without the previous snapshot nothing can be diffed; leave the side alone.
                error!(%symbol, side = %side, error = %e, "failed to read cached snapshot");
                report.failed += 1;
                return report;
            }
        };

        // Last occurrence of a price wins, first occurrence fixes its position.
        let mut current: HashMap<&str, &str> = HashMap::with_capacity(levels.len());
        let mut order: Vec<&str> = Vec::with_capacity(levels.len());
        for (price, amount) in &levels {
            if current.insert(price.as_str(), amount.as_str()).is_none() {
                order.push(price.as_str());
            }
        }

        let mut to_close: Vec<&String> = previous
            .keys()
            .filter(|price| {
                current
                    .get(price.as_str())
                    .map_or(true, |amount| is_zero_amount(amount))
            })
            .collect();
        to_close.sort();
        for price in to_close {
            match self.close(symbol, side, price).await {
                Ok(()) => report.closed += 1,
                Err(e) => {
                    error!(%symbol, side = %side, %price, error = %e, "failed to close level");
                    report.failed += 1;
                }
            }
        }

        for price in order {
            let amount = current[price];
            if is_zero_amount(amount) {
                continue;
            }
            let level = OrderBookLevelRecord::open(symbol, Some(exchange_id), side, price, amount);
            match self.upsert(&level).await {
                Ok(()) => report.upserted += 1,
                Err(e) => {
                    error!(%symbol, side = %side, %price, error = %e, "failed to upsert level");
                    report.failed += 1;
                }
            }
        }

        let snapshot: Vec<(String, String)> = current
            .iter()
            .map(|(p, a)| ((*p).to_string(), (*a).to_string()))
            .collect();
        if let Err(e) = self.cache.hash_replace(&key, &snapshot).await {
            error!(%symbol, side = %side, error = %e, "failed to replace cached snapshot");
            report.failed += 1;
        }
        report
    }

    async fn close(&self, symbol: &str, side: BookSide, price: &str) -> Result<()> {
        let changed = self.store.close_level(symbol, side, price).await?;
        let key = level_document_key(symbol, price, side.as_str());
        let mirrored = self
            .documents
            .update(
                collections::ORDER_BOOK_LEVELS,
                &key,
                &json!({ "status": LevelStatus::Closed.as_str() }),
            )
            .await?;
        if changed == 0 && mirrored == 0 {
            warn!(%symbol, side = %side, %price, "closed level had no open row");
        }
        Ok(())
    }

    async fn upsert(&self, level: &OrderBookLevelRecord) -> Result<()> {
        self.store.upsert_level(level).await?;
        self.documents
            .upsert(
                collections::ORDER_BOOK_LEVELS,
                &level.document_key(),
                &level.to_document(),
            )
            .await
    }
}

#[async_trait]
impl MessageHandler for OrderBookReconciler {
    async fn handle(&self, message: &BrokerMessage) -> Result<()> {
        let frame = decode_depth(&message.value)?;
        self.apply(&frame, &message.key).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_detection_accepts_sentinel_and_any_decimal_zero() {
        assert!(is_zero_amount("0.00000000"));
        assert!(is_zero_amount("0.0"));
        assert!(is_zero_amount("0"));
        assert!(!is_zero_amount("0.00000001"));
        assert!(!is_zero_amount("garbage"));
    }

    #[test]
    fn snapshot_keys_per_side() {
        assert_eq!(snapshot_key("btcusdt", BookSide::Bid), "orderbook:btcusdt:bid");
        assert_eq!(snapshot_key("btcusdt", BookSide::Ask), "orderbook:btcusdt:ask");
    }
}
