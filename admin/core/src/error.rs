// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Errors produced while consuming and executing admin commands.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AdminError {
    #[error("malformed admin record: {0}")]
    MalformedRecord(String),

    #[error("operation is not supported in this deployment: {0}")]
    UnsupportedOperation(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("admin backend rejected the operation: {0}")]
    Rejected(String),

    #[error("watermark regression on {scope}: attempted {attempted} behind {current}")]
    WatermarkRegression {
        scope: String,
        current: u64,
        attempted: u64,
    },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("shutting down")]
    Shutdown,
}

pub type AdminResult<T> = Result<T, AdminError>;

/// How the worker loop reacts to a handler failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// Leave the queue head in place, back off and retry.
    Retriable,
    /// Count as success: advance the watermark and pop the head.
    Ignorable,
    /// Halt the worker pool and surface to the operator.
    Fatal,
}

impl AdminError {
    pub fn classification(&self) -> FailureClass {
        match self {
            AdminError::Transient(_) => FailureClass::Retriable,
            AdminError::UnsupportedOperation(_) => FailureClass::Ignorable,
            AdminError::MalformedRecord(_)
            | AdminError::Rejected(_)
            | AdminError::WatermarkRegression { .. }
            | AdminError::InvariantViolation(_)
            | AdminError::Shutdown => FailureClass::Fatal,
        }
    }
}
