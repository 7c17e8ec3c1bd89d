use thiserror::Error;

/// Errors the signal engine surfaces to its caller.
#[derive(Error, Debug)]
pub enum SignalError {
    /// Cold start found no stored candles and the historical fetch failed.
    #[error("backfill exhausted for {symbol} {interval}: {reason}")]
    BackfillExhausted {
        symbol: String,
        interval: String,
        reason: String,
    },

    #[error("exchange {0} for signal interval not found")]
    UnknownExchange(uuid::Uuid),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
