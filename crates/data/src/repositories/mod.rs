//! Postgres repositories for the market data relay.
//!
//! Each repository wraps one table and implements the matching seam from
//! [`crate::store`].

pub mod candle_repo;
pub mod error_log_repo;
pub mod orderbook_repo;
pub mod reference_repo;
pub mod signal_repo;
pub mod trade_tick_repo;

pub use candle_repo::CandleRepository;
pub use error_log_repo::ErrorLogRepository;
pub use orderbook_repo::OrderBookRepository;
pub use reference_repo::ReferenceRepository;
pub use signal_repo::SignalRepository;
pub use trade_tick_repo::PriceTickRepository;

use sqlx::PgPool;

/// Creates all repositories from a single database pool.
#[derive(Debug, Clone)]
pub struct Repositories {
    pub reference: ReferenceRepository,
    pub candles: CandleRepository,
    pub orderbook: OrderBookRepository,
    pub price_ticks: PriceTickRepository,
    pub signals: SignalRepository,
    pub error_logs: ErrorLogRepository,
}

impl Repositories {
    /// Creates a new set of repositories from a database pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            reference: ReferenceRepository::new(pool.clone()),
            candles: CandleRepository::new(pool.clone()),
            orderbook: OrderBookRepository::new(pool.clone()),
            price_ticks: PriceTickRepository::new(pool.clone()),
            signals: SignalRepository::new(pool.clone()),
            error_logs: ErrorLogRepository::new(pool),
        }
    }
}
