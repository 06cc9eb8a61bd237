//! Crate-wide error type.
//!
//! Structured error handling via `thiserror`: named variants matching the
//! abstract error kinds from the failure-semantics table, `#[from]`
//! conversions for the libraries each component touches, and small
//! constructor helpers for the variants callers build by hand.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// In-memory transport failures.
    #[error("transport connection failed: {message}")]
    TransportConnection { message: String },

    #[error("transport publish failed: {message}")]
    TransportPublish { message: String },

    #[error("transport subscribe failed: {message}")]
    TransportSubscribe { message: String },

    #[error("transport request timed out")]
    TransportTimeout,

    /// Ring / disk storage failures.
    #[error("storage entry not found: {0}")]
    StorageNotFound(String),

    #[error("storage write failed: {message}")]
    StorageWrite { message: String },

    #[error("storage read failed: {message}")]
    StorageRead { message: String },

    #[error("storage io error")]
    StorageIo(#[from] std::io::Error),

    /// Redis secmaster cache failures.
    #[error("cache connection failed: {message}")]
    CacheConnection { message: String },

    #[error("cache operation failed: {message}")]
    CacheOperation { message: String },

    /// In-memory journal failures.
    #[error("journal append failed: {message}")]
    JournalAppend { message: String },

    #[error("journal read failed: {message}")]
    JournalRead { message: String },

    #[error("journal topic not found: {0}")]
    JournalTopicNotFound(String),

    /// PostgreSQL logical-replication slot/connection failures.
    #[error("replication error: {message}")]
    Replication { message: String },

    /// Missing or invalid configuration.
    #[error("configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Postgres(#[from] tokio_postgres::Error),

    #[error(transparent)]
    Nats(#[from] async_nats::Error),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn transport_connection<S: Into<String>>(message: S) -> Self {
        Self::TransportConnection { message: message.into() }
    }

    pub fn transport_publish<S: Into<String>>(message: S) -> Self {
        Self::TransportPublish { message: message.into() }
    }

    pub fn transport_subscribe<S: Into<String>>(message: S) -> Self {
        Self::TransportSubscribe { message: message.into() }
    }

    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::CacheOperation { message: message.into() }
    }

    pub fn replication<S: Into<String>>(message: S) -> Self {
        Self::Replication { message: message.into() }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn journal_append<S: Into<String>>(message: S) -> Self {
        Self::JournalAppend { message: message.into() }
    }

    pub fn storage_write<S: Into<String>>(message: S) -> Self {
        Self::StorageWrite { message: message.into() }
    }
}
