//! Error types for call automation operations
//!
//! Errors fall into two groups. Argument and validation errors are raised by the
//! request builder before anything is dispatched and are never worth retrying.
//! Transport errors come back from the dispatch collaborator unchanged, and
//! correlation errors are only ever seen by the caller that was waiting.

use std::time::Duration;

use thiserror::Error;

use crate::types::{CallConnectionId, OperationContext};

/// Result type for call automation operations
pub type Result<T> = std::result::Result<T, CallAutomationError>;

/// Errors that can occur while issuing commands or correlating their outcomes
#[derive(Debug, Error)]
pub enum CallAutomationError {
    /// A required field is missing or empty
    #[error("Required argument missing: {field}")]
    Argument { field: &'static str },

    /// A field violates a length, range or format constraint
    #[error("Invalid value for {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// The dispatch collaborator failed or the service rejected the command
    #[error("Transport error{}: {message}", status_suffix(.status))]
    Transport { status: Option<u16>, message: String },

    /// No matching event arrived before the wait expired
    #[error("No event for operation {operation_context} on call {call_connection_id} within {timeout:?}")]
    CorrelationTimeout {
        call_connection_id: CallConnectionId,
        operation_context: OperationContext,
        timeout: Duration,
    },

    /// The waiting caller cancelled before a matching event arrived
    #[error("Wait for operation {operation_context} on call {call_connection_id} was cancelled")]
    Cancelled {
        call_connection_id: CallConnectionId,
        operation_context: OperationContext,
    },

    /// Client configuration is unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An acknowledgment or event body could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|code| format!(" (status {code})")).unwrap_or_default()
}

impl CallAutomationError {
    /// Create an argument error for a missing field
    pub fn argument(field: &'static str) -> Self {
        Self::Argument { field }
    }

    /// Create a validation error for a field
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Create a transport error with an optional HTTP-like status
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// True for errors raised before any network interaction
    pub fn is_pre_dispatch(&self) -> bool {
        matches!(self, Self::Argument { .. } | Self::Validation { .. })
    }

    /// Whether the caller may reasonably re-issue the same prepared command.
    ///
    /// Only transport failures qualify: connection failures without a status,
    /// request timeouts, throttling and server errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { status: None, .. } => true,
            Self::Transport { status: Some(code), .. } => {
                *code == 408 || *code == 429 || (500..600).contains(code)
            }
            _ => false,
        }
    }

    /// True if this is a correlation timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::CorrelationTimeout { .. })
    }
}
