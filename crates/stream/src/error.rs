use thiserror::Error;
use uuid::Uuid;

/// Errors from planning and dialling exchange streams.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The topic is not one of the raw topics streams publish to.
    #[error("topic {0} is not fed by any stream")]
    NotAStreamTopic(String),

    #[error("exchange {0} not found")]
    UnknownExchange(Uuid),

    #[error("exchange {0} has no streaming URL registered")]
    NoStreamingUrl(String),

    /// Every dial attempt failed; `error` is the last failure.
    #[error("dial failed after {attempts} attempts: {error}")]
    DialExhausted { attempts: u32, error: String },

    /// Reference data lookup failed.
    #[error(transparent)]
    Reference(#[from] anyhow::Error),
}
