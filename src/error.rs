use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to subscribe to broker topic {topic}: {reason}")]
    Connection { topic: String, reason: String },

    #[error("Failed to (de)serialize message: {0}")]
    Serialization(String),

    #[error("Topic name too long")]
    TopicTooLong,

    #[error("Invalid topic name: {0}")]
    InvalidTopic(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Topic already completed: {0}")]
    TopicCompleted(String),

    #[error("Buffer is empty")]
    BufferEmpty,

    #[error("End of stream")]
    EndOfStream,

    #[error("Operation timeout")]
    Timeout,

    #[error("Subscription limit exceeded for broker: {0}")]
    SubscriptionLimitExceeded(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
