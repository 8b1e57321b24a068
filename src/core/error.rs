// src/core/error.rs

//! Error types for the scan engine.
//!
//! Registry and dispatcher errors are returned to the caller of the
//! triggering operation. Probe failures are values, recorded in the findings
//! store and never raised.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::models::ScanStatus;

/// Errors returned by the engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("scan '{scan_id}' already exists")]
    DuplicateScan { scan_id: String },

    #[error("scan '{scan_id}' not found")]
    ScanNotFound { scan_id: String },

    /// Backpressure: the caller should retry once a running scan completes.
    #[error("scan refused: max concurrent active scans reached ({max_scans})")]
    CapacityExceeded { max_scans: usize },

    #[error("scan '{scan_id}' is not running (status={status})")]
    InvalidTransition { scan_id: String, status: ScanStatus },

    #[error("scan '{scan_id}' not finished (status={status})")]
    ScanNotFinished { scan_id: String, status: ScanStatus },

    #[error("invalid scan options: {reason}")]
    InvalidOptions { reason: String },

    #[error("engine is shutting down")]
    ShuttingDown,

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Only capacity refusals are worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }

    pub fn not_found(scan_id: impl Into<String>) -> Self {
        Self::ScanNotFound { scan_id: scan_id.into() }
    }

    pub fn invalid_options(reason: impl Into<String>) -> Self {
        Self::InvalidOptions { reason: reason.into() }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// A probe that could not produce data for one `(check, asset)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{check} failed for '{asset}': {reason}")]
pub struct ProbeFailure {
    pub check: String,
    pub asset: String,
    pub reason: String,
}

impl ProbeFailure {
    pub fn new(check: impl Into<String>, asset: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { check: check.into(), asset: asset.into(), reason: reason.into() }
    }
}

/// Outcome type for probe invocations.
pub type ProbeResult<T> = Result<T, ProbeFailure>;
