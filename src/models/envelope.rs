//! Uniform response envelope for `execute` / `execute_transaction`.
//!
//! Every ad hoc call resolves to a [`QueryOutcome`], success or failure;
//! errors inside `execute` are captured here, never propagated. Field names
//! serialize in camelCase to match the wire contract.

use crate::error::StoreError;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Instant;

/// Timing and origin metadata attached to every envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeMetadata {
    /// Wall-clock duration in milliseconds, measured up to completion or the
    /// point of failure.
    pub execution_time: u64,
    /// Backend that served the call ("sqlite", "postgres", "mongodb").
    pub db_type: &'static str,
}

/// The envelope itself.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub metadata: OutcomeMetadata,
}

impl QueryOutcome {
    /// Success envelope. `row_count` is rows/documents for reads and
    /// modified/deleted/inserted counts for writes.
    pub fn success(
        data: JsonValue,
        row_count: u64,
        started: Instant,
        db_type: &'static str,
    ) -> Self {
        Self {
            success: true,
            data: Some(data),
            row_count: Some(row_count),
            error: None,
            code: None,
            metadata: OutcomeMetadata {
                execution_time: started.elapsed().as_millis() as u64,
                db_type,
            },
        }
    }

    /// Failure envelope carrying the error message and, when the backend
    /// exposes one, a native error code.
    pub fn failure(error: &StoreError, started: Instant, db_type: &'static str) -> Self {
        Self {
            success: false,
            data: None,
            row_count: None,
            error: Some(error.to_string()),
            code: error.error_code().map(String::from),
            metadata: OutcomeMetadata {
                execution_time: started.elapsed().as_millis() as u64,
                db_type,
            },
        }
    }
}
