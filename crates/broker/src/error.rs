use thiserror::Error;

/// Errors from broker operations.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Could not reach the broker after exhausting startup retries.
    #[error("broker unreachable after {attempts} attempts: {source}")]
    Unreachable {
        attempts: u32,
        #[source]
        source: redis::RedisError,
    },

    /// Transport-level failure talking to Redis.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A stream entry did not carry the expected fields.
    #[error("malformed entry {id} on {topic}: {reason}")]
    MalformedEntry {
        topic: String,
        id: String,
        reason: String,
    },

    /// Commit for a message this subscription never delivered.
    #[error("unknown offset {offset} on {topic}")]
    UnknownOffset { topic: String, offset: String },

    #[error("broker closed")]
    Closed,
}
