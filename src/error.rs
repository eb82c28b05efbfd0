//! Error types for admitq.
//!
//! Queue operations on unknown ids are no-ops, not errors, so this enum only
//! covers the ambient failures: configuration, the dispatch boundary, I/O.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("no cluster node available for model {0:?}")]
    NoNodeAvailable(Option<String>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
