//! Dispatch collaborator interface
//!
//! The crate never talks to the network itself. A [`CallConnectionTransport`]
//! carries a [`CallCommand`] for one call connection, attaches the
//! repeatability headers when present, and returns the service's synchronous
//! acknowledgment. Authentication, retries and HTTP details all live behind
//! this trait.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::errors::Result;
use crate::repeatability::RepeatabilityToken;
use crate::request::CallCommand;
use crate::types::CallConnectionId;

/// Synchronous acknowledgment of a dispatched command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandAck {
    /// Status reported by the service, e.g. 200 or 202
    pub status: u16,
    /// Response body, if the service returned one
    pub body: Option<serde_json::Value>,
}

impl CommandAck {
    pub fn new(status: u16) -> Self {
        Self { status, body: None }
    }

    pub fn with_body(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    /// Decode the body into a response model; an absent body decodes as `null`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.body.clone().unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(value)?)
    }
}

/// Sends commands for a call connection and returns the acknowledgment.
///
/// Implementations report service failures as
/// [`crate::errors::CallAutomationError::Transport`]; an `Ok` ack always means
/// the service accepted the command.
#[async_trait]
pub trait CallConnectionTransport: Send + Sync + std::fmt::Debug {
    async fn send(
        &self,
        call_connection_id: &CallConnectionId,
        command: &CallCommand,
        repeatability: Option<&RepeatabilityToken>,
    ) -> Result<CommandAck>;
}
