//! Crate-wide error taxonomy.
//!
//! Mirrors the kinds called out for the orchestrator's error handling design: each
//! variant carries enough context to populate `diagnostics.error_kind` on the produced
//! `RetrievalResult`. Internal plumbing (file IO, JSON, driver glue) mostly works in
//! `anyhow::Result` and converts to a `HerError` at the module boundary facing the
//! orchestrator, keeping the distinction between "unexpected internal failure"
//! (`anyhow`) and "a caller-meaningful outcome" (`HerError`) at that one seam.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HerError {
    #[error("input error: {0}")]
    Input(String),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("rerank error: {0}")]
    Rerank(String),

    #[error("verification error: {0}")]
    Verification(String),

    #[error("promotion store error: {0}")]
    Store(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("no elements in pool")]
    NoElements,

    #[error("no locator verified uniquely")]
    NotUnique,
}

impl HerError {
    /// The lowercase-hyphenated label that lands in `diagnostics.error_kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            HerError::Input(_) => "input",
            HerError::Driver(_) => "driver",
            HerError::Snapshot(_) => "snapshot",
            HerError::Embedding(_) => "embedding",
            HerError::Rerank(_) => "rerank",
            HerError::Verification(_) => "verification",
            HerError::Store(_) => "store",
            HerError::Timeout(_) => "timeout",
            HerError::Cancelled => "cancelled",
            HerError::NoElements => "no-elements",
            HerError::NotUnique => "not-unique",
        }
    }

    /// Whether the orchestrator should retry the whole `resolve()` call once.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HerError::Driver(_) | HerError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, HerError>;
