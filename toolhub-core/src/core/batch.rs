// toolhub-core/src/core/batch.rs
// ============================================================================
// Module: ToolHub Batch Laws
// Description: Batch mode parsing and aggregate status derivation.
// Purpose: Keep per-item statuses binary while deriving aggregate status.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Stored per-item tool call statuses are strictly `ok` or `fail`; `partial`
//! exists only as a response-layer derivation over the aggregate counters and
//! is never persisted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Batch Mode
// ============================================================================

/// Error handling mode for batch endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Keep processing after item errors and report per-item outcomes.
    #[default]
    Partial,
    /// Stop at the first collaborator error; prior items are not rolled back.
    Strict,
}

impl BatchMode {
    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Partial => "partial",
            Self::Strict => "strict",
        }
    }
}

impl fmt::Display for BatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Batch mode parsing errors.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid BATCH_MODE {value:?}, expected partial or strict")]
pub struct BatchModeParseError {
    /// Rejected input value.
    pub value: String,
}

impl FromStr for BatchMode {
    type Err = BatchModeParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "partial" => Ok(Self::Partial),
            "strict" => Ok(Self::Strict),
            _ => Err(BatchModeParseError {
                value: value.to_string(),
            }),
        }
    }
}

// ============================================================================
// SECTION: Status Derivation
// ============================================================================

/// Aggregate batch status derived at response time, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every item succeeded or replayed.
    Ok,
    /// Some fresh items succeeded and some failed.
    Partial,
    /// Every fresh item failed.
    Fail,
}

impl BatchStatus {
    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Partial => "partial",
            Self::Fail => "fail",
        }
    }
}

/// Derives the aggregate status from batch counters.
#[must_use]
pub const fn derive_batch_status(total: usize, replayed: usize, errors: usize) -> BatchStatus {
    if errors == 0 {
        return BatchStatus::Ok;
    }
    if errors == total - replayed {
        return BatchStatus::Fail;
    }
    BatchStatus::Partial
}
