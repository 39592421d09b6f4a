//! Inbound event model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifier::CommunicationIdentifier;
use crate::types::{CallConnectionId, CorrelationKey, OperationContext};

/// Kind of an asynchronously delivered call event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallAutomationEventKind {
    CallConnected,
    CallDisconnected,
    CallTransferAccepted,
    CallTransferFailed,
    AddParticipantSucceeded,
    AddParticipantFailed,
    RemoveParticipantSucceeded,
    RemoveParticipantFailed,
    CancelAddParticipantSucceeded,
    CancelAddParticipantFailed,
    ParticipantsUpdated,
    /// An event type this crate does not model, kept by name
    Other(String),
}

impl CallAutomationEventKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "CallConnected" => Self::CallConnected,
            "CallDisconnected" => Self::CallDisconnected,
            "CallTransferAccepted" => Self::CallTransferAccepted,
            "CallTransferFailed" => Self::CallTransferFailed,
            "AddParticipantSucceeded" => Self::AddParticipantSucceeded,
            "AddParticipantFailed" => Self::AddParticipantFailed,
            "RemoveParticipantSucceeded" => Self::RemoveParticipantSucceeded,
            "RemoveParticipantFailed" => Self::RemoveParticipantFailed,
            "CancelAddParticipantSucceeded" => Self::CancelAddParticipantSucceeded,
            "CancelAddParticipantFailed" => Self::CancelAddParticipantFailed,
            "ParticipantsUpdated" => Self::ParticipantsUpdated,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::CallConnected => "CallConnected",
            Self::CallDisconnected => "CallDisconnected",
            Self::CallTransferAccepted => "CallTransferAccepted",
            Self::CallTransferFailed => "CallTransferFailed",
            Self::AddParticipantSucceeded => "AddParticipantSucceeded",
            Self::AddParticipantFailed => "AddParticipantFailed",
            Self::RemoveParticipantSucceeded => "RemoveParticipantSucceeded",
            Self::RemoveParticipantFailed => "RemoveParticipantFailed",
            Self::CancelAddParticipantSucceeded => "CancelAddParticipantSucceeded",
            Self::CancelAddParticipantFailed => "CancelAddParticipantFailed",
            Self::ParticipantsUpdated => "ParticipantsUpdated",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for CallAutomationEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome details the service attaches to completion events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultInformation {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub sub_code: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
}

/// An event delivered independently of any particular command
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub kind: CallAutomationEventKind,
    pub call_connection_id: CallConnectionId,
    /// Echo of the command's operation context; absent for unsolicited events
    pub operation_context: Option<OperationContext>,
    pub server_call_id: Option<String>,
    pub correlation_id: Option<String>,
    pub result_information: Option<ResultInformation>,
    /// Participant the event is about, when there is one
    pub participant: Option<CommunicationIdentifier>,
    /// The full `data` payload as delivered
    pub data: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    /// Minimal event, mostly useful for tests and synthetic events
    pub fn new(
        kind: CallAutomationEventKind,
        call_connection_id: CallConnectionId,
        operation_context: Option<OperationContext>,
    ) -> Self {
        Self {
            kind,
            call_connection_id,
            operation_context,
            server_call_id: None,
            correlation_id: None,
            result_information: None,
            participant: None,
            data: serde_json::Value::Null,
            received_at: Utc::now(),
        }
    }

    /// Correlation key, if the event carries an operation context
    pub fn correlation_key(&self) -> Option<CorrelationKey> {
        self.operation_context
            .as_ref()
            .filter(|context| !context.as_str().is_empty())
            .map(|context| CorrelationKey::new(self.call_connection_id.clone(), context.clone()))
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.kind,
            CallAutomationEventKind::CallTransferFailed
                | CallAutomationEventKind::AddParticipantFailed
                | CallAutomationEventKind::RemoveParticipantFailed
                | CallAutomationEventKind::CancelAddParticipantFailed
        )
    }
}
