//! Moving average crossover signals.
//!
//! The engine keeps a fast and a slow window of closing prices per
//! (symbol, interval) and emits a buy or sell when the fast mean crosses the
//! slow one, suppressing repeats of the last emitted direction.

pub mod crossover;
pub mod engine;
pub mod error;
pub mod handler;

pub use engine::{SignalDeps, SignalEngine, SignalOutcome};
pub use error::SignalError;
pub use handler::SignalHandler;
