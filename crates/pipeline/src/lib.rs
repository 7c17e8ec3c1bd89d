//! Handlers that consume broker topics and write the stores.
//!
//! - [`DocumentWriter`]: archives raw frames and forwards them for relational work
//! - [`TradeWriter`] and [`CandleWriter`]: relational trade ticks and closed candles
//! - [`OrderBookReconciler`]: snapshot diffing into open/closed price levels

pub mod document_writer;
pub mod error;
pub mod frames;
pub mod reconciler;
pub mod relational;

pub use document_writer::DocumentWriter;
pub use error::FrameError;
pub use frames::{decode_depth, AggTradeFrame, DepthFrame, Envelope, KlineBar, KlineFrame};
pub use reconciler::{is_zero_amount, snapshot_key, OrderBookReconciler, ReconcileReport};
pub use relational::{CandleWrite, CandleWriter, TradeWriter};
