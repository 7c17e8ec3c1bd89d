//! Exchange-facing side of the relay.
//!
//! - [`supervisor`]: one task per (symbol, stream kind, interval) that dials
//!   the exchange feed and republishes every frame onto the broker
//! - [`source`]: the WebSocket frame source those tasks read from
//! - [`history`]: the REST klines client used for cold-start backfill

pub mod error;
pub mod history;
pub mod source;
pub mod supervisor;
pub mod url;

pub use error::StreamError;
pub use history::BinanceKlineClient;
pub use source::{FrameSource, FrameStream, WsFrameSource};
pub use supervisor::{DialPolicy, StreamExit, StreamSupervisor, StreamTarget};
pub use url::{normalize_ws_base, stream_url};
