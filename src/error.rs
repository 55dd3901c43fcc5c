use thiserror::Error;

pub type Result<T> = std::result::Result<T, BotError>;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed script entry: {0}")]
    Script(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("database error: {0}")]
    Database(#[from] rocksdb::Error),
}
