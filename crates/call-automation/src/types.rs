//! Core value types shared across the crate

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identifier::{CommunicationIdentifier, PhoneNumberIdentifier};

/// Identity of one active call
///
/// Assigned by the service when the call is established and held for the
/// lifetime of the call. Never reused after teardown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallConnectionId(pub String);

impl CallConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CallConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Correlation token travelling with a command and echoed back in its events
///
/// Always non-empty once it has been through [`crate::context::allocate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationContext(pub String);

impl OperationContext {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationContext {
    fn from(context: &str) -> Self {
        Self(context.to_string())
    }
}

impl From<String> for OperationContext {
    fn from(context: String) -> Self {
        Self(context)
    }
}

/// Key the event processor indexes on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub call_connection_id: CallConnectionId,
    pub operation_context: OperationContext,
}

impl CorrelationKey {
    pub fn new(call_connection_id: CallConnectionId, operation_context: OperationContext) -> Self {
        Self {
            call_connection_id,
            operation_context,
        }
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.call_connection_id, self.operation_context)
    }
}

/// Server-side state of a call connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallConnectionState {
    Connecting,
    Connected,
    Transferring,
    TransferAccepted,
    Disconnecting,
    Disconnected,
    /// Any state this crate does not recognise
    #[default]
    #[serde(other)]
    Unknown,
}

/// A participant as reported by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallParticipant {
    pub identifier: CommunicationIdentifier,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default)]
    pub is_on_hold: bool,
}

/// Properties of an established call connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallConnectionProperties {
    pub call_connection_id: CallConnectionId,
    #[serde(default)]
    pub server_call_id: Option<String>,
    #[serde(default)]
    pub targets: Vec<CommunicationIdentifier>,
    #[serde(default)]
    pub call_connection_state: CallConnectionState,
    #[serde(default)]
    pub callback_uri: Option<String>,
    #[serde(default)]
    pub source_caller_id_number: Option<String>,
    #[serde(default)]
    pub source_display_name: Option<String>,
    #[serde(default)]
    pub source: Option<CommunicationIdentifier>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub answered_by: Option<CommunicationIdentifier>,
}

impl CallConnectionProperties {
    /// Caller id the call was placed with, if it was a PSTN call
    pub fn source_caller_id(&self) -> Option<PhoneNumberIdentifier> {
        self.source_caller_id_number
            .as_ref()
            .map(|number| PhoneNumberIdentifier::new(number.clone()))
    }
}
