use thiserror::Error;

/// Errors decoding exchange frames and forwarded envelopes.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("invalid decimal {raw:?} in {field}")]
    InvalidDecimal { field: &'static str, raw: String },

    /// Payload looked like an envelope but its body did not parse.
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
}
