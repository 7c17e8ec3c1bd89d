//! Crossover signal engine.
//!
//! Keeps two rolling windows of closes per (symbol, interval) in the cache and
//! compares their means on every closed candle. A signal is only emitted when
//! it differs from the last one emitted for the pair; repeats come back as
//! [`SignalOutcome::Suppressed`]. Cold windows are seeded from stored candles,
//! topped up from the exchange's history endpoint when too few are stored.

use std::sync::Arc;

use market_relay_core::{SignalConfig, SignalDirection};
use market_relay_data::{
    collections, Cache, CandleRecord, CandleStore, DocumentStore, ErrorLogRecord, ErrorLogStore,
    HistoricalCandles, ReferenceData, SignalIntervalRecord, SignalRecord, SignalStore,
};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::crossover::{
    crossover, format_ma, last_signal_key, moving_average, parse_window, window_key,
};
use crate::error::SignalError;

/// Result of feeding one closed candle to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalOutcome {
    /// A new signal was recorded.
    Emitted {
        direction: SignalDirection,
        ma50: String,
        ma200: String,
    },
    /// Same direction as the last emitted signal; nothing recorded.
    Suppressed { direction: SignalDirection },
    /// Averages are equal.
    Neutral { ma: String },
    /// A window is not full yet.
    InsufficientData { fast_len: usize, slow_len: usize },
    /// The (symbol, interval) pair is not tracked.
    NoInterval,
}

/// Collaborators of the engine, injected by the caller.
#[derive(Clone)]
pub struct SignalDeps {
    pub reference: Arc<dyn ReferenceData>,
    pub candles: Arc<dyn CandleStore>,
    pub signals: Arc<dyn SignalStore>,
    pub error_logs: Arc<dyn ErrorLogStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub cache: Arc<dyn Cache>,
    pub history: Arc<dyn HistoricalCandles>,
}

pub struct SignalEngine {
    deps: SignalDeps,
    config: SignalConfig,
}

impl SignalEngine {
    #[must_use]
    pub fn new(deps: SignalDeps, config: SignalConfig) -> Self {
        Self { deps, config }
    }

    /// Feeds one closed candle.
    ///
    /// # Errors
    /// Returns [`SignalError::BackfillExhausted`] when a cold window cannot be seeded
    /// at all, and [`SignalError::Store`] when a store or cache call fails.
    pub async fn on_closed_candle(&self, candle: &CandleRecord) -> Result<SignalOutcome, SignalError> {
        let Some(tracked) = self
            .deps
            .reference
            .find_interval(&candle.symbol, &candle.interval)
            .await?
        else {
            debug!(symbol = %candle.symbol, interval = %candle.interval, "interval not tracked");
            return Ok(SignalOutcome::NoInterval);
        };

        let symbol = tracked.symbol.as_str();
        let interval = tracked.interval.as_str();
        let fast_key = window_key(symbol, interval, self.config.fast_window);
        let slow_key = window_key(symbol, interval, self.config.slow_window);

        if self.deps.cache.exists(&fast_key).await? {
            let close = [candle.close.to_string()];
            self.deps
                .cache
                .list_push_capped(&fast_key, &close, self.config.fast_window)
                .await?;
            self.deps
                .cache
                .list_push_capped(&slow_key, &close, self.config.slow_window)
                .await?;
        } else {
            self.cold_start(&tracked, &fast_key, &slow_key).await?;
        }

        self.evaluate(symbol, interval).await
    }

    /// Computes the crossover from the cached windows and applies hysteresis.
    ///
    /// # Errors
    /// Returns [`SignalError::Store`] when a cache or store call fails or a
    /// cached window cannot be averaged.
    pub async fn evaluate(&self, symbol: &str, interval: &str) -> Result<SignalOutcome, SignalError> {
        let fast_key = window_key(symbol, interval, self.config.fast_window);
        let slow_key = window_key(symbol, interval, self.config.slow_window);
        let fast = parse_window(&self.deps.cache.list_all(&fast_key).await?)?;
        let slow = parse_window(&self.deps.cache.list_all(&slow_key).await?)?;
        let insufficient = SignalOutcome::InsufficientData {
            fast_len: fast.len(),
            slow_len: slow.len(),
        };
        if fast.len() < self.config.fast_window || slow.len() < self.config.slow_window {
            return Ok(insufficient);
        }

        match (moving_average(&fast)?, moving_average(&slow)?) {
            (Some(fast_ma), Some(slow_ma)) => self.decide(symbol, interval, fast_ma, slow_ma).await,
            _ => Ok(insufficient),
        }
    }

    async fn decide(
        &self,
        symbol: &str,
        interval: &str,
        fast_ma: Decimal,
        slow_ma: Decimal,
    ) -> Result<SignalOutcome, SignalError> {
        let Some(direction) = crossover(fast_ma, slow_ma) else {
            return Ok(SignalOutcome::Neutral {
                ma: format_ma(fast_ma),
            });
        };

        let marker_key = last_signal_key(symbol, interval);
        let last = self
            .deps
            .cache
            .get(&marker_key)
            .await?
            .and_then(|m| SignalDirection::parse(&m))
            .unwrap_or(SignalDirection::Hold);
        if last == direction {
            return Ok(SignalOutcome::Suppressed { direction });
        }

        self.deps.cache.set(&marker_key, direction.marker()).await?;

        let record = SignalRecord::crossover(
            symbol,
            interval,
            direction,
            fast_ma.normalize(),
            slow_ma.normalize(),
        );
        self.deps.signals.append_signal(&record).await?;
        if let Err(e) = self
            .deps
            .documents
            .insert(collections::SIGNALS, &record.to_document())
            .await
        {
            warn!(%symbol, %interval, error = %e, "failed to mirror signal document");
        }

        let outcome = SignalOutcome::Emitted {
            direction,
            ma50: format_ma(fast_ma),
            ma200: format_ma(slow_ma),
        };
        info!(%symbol, %interval, signal = %direction, ?outcome, "signal emitted");
        Ok(outcome)
    }

    /// Rebuilds both windows from candle history.
    async fn cold_start(
        &self,
        tracked: &SignalIntervalRecord,
        fast_key: &str,
        slow_key: &str,
    ) -> Result<(), SignalError> {
        let symbol = tracked.symbol.as_str();
        let interval = tracked.interval.as_str();
        let wanted = self.config.slow_window;
        info!(%symbol, %interval, "cold start, rebuilding windows");

        self.deps.cache.delete(slow_key).await?;

        let mut stored = self
            .deps
            .candles
            .recent_candles(symbol, interval, wanted as u32)
            .await?;

        if stored.len() < wanted {
            match self.backfill(tracked).await {
                Ok(inserted) => {
                    debug!(%symbol, %interval, inserted, "backfilled candles");
                    stored = self
                        .deps
                        .candles
                        .recent_candles(symbol, interval, wanted as u32)
                        .await?;
                }
                Err(e) if stored.is_empty() => {
                    let reason = format!("{e:#}");
                    error!(%symbol, %interval, error = %reason, "backfill exhausted");
                    let entry = ErrorLogRecord::error(
                        "Signal backfill exhausted",
                        format!("{symbol} {interval}: {reason}"),
                        "signal",
                    );
                    if let Err(log_err) = self.deps.error_logs.append_error_log(&entry).await {
                        warn!(error = %log_err, "failed to record backfill failure");
                    }
                    return Err(SignalError::BackfillExhausted {
                        symbol: symbol.to_string(),
                        interval: interval.to_string(),
                        reason,
                    });
                }
                Err(e) => {
                    warn!(
                        %symbol,
                        %interval,
                        stored = stored.len(),
                        error = %e,
                        "backfill failed, seeding from stored candles"
                    );
                }
            }
        }

        // stored is newest first
        let closes: Vec<String> = stored.iter().rev().map(|c| c.close.to_string()).collect();
        let fast_start = closes.len().saturating_sub(self.config.fast_window);

        self.deps
            .cache
            .list_replace(slow_key, &closes, self.config.slow_window)
            .await?;
        self.deps
            .cache
            .list_replace(fast_key, &closes[fast_start..], self.config.fast_window)
            .await?;
        Ok(())
    }

    /// Fetches history and stores the bars not already present. Returns how many were new.
    async fn backfill(&self, tracked: &SignalIntervalRecord) -> Result<usize, SignalError> {
        let exchange = self
            .deps
            .reference
            .exchange(tracked.exchange_id)
            .await?
            .ok_or(SignalError::UnknownExchange(tracked.exchange_id))?;

        let fetched = self
            .deps
            .history
            .fetch_candles(
                &exchange,
                &tracked.symbol,
                &tracked.interval,
                self.config.history_limit,
            )
            .await?;

        let mut inserted = 0;
        for mut candle in fetched {
            candle.exchange_id.get_or_insert(exchange.id);
            if self
                .deps
                .candles
                .candle_exists(&candle.symbol, &candle.interval, candle.open_time)
                .await?
            {
                continue;
            }
            if self.deps.candles.insert_candle(&candle).await? {
                inserted += 1;
                if let Err(e) = self
                    .deps
                    .documents
                    .insert(collections::CANDLESTICKS, &candle.to_document())
                    .await
                {
                    warn!(symbol = %candle.symbol, error = %e, "failed to mirror candle document");
                }
            }
        }
        Ok(inserted)
    }
}
