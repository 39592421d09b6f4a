//! Normalisation of raw webhook deliveries
//!
//! The event-delivery path hands us request bodies in CloudEvents JSON form,
//! either a single event object or an array of them. Each entry becomes an
//! [`InboundEvent`].

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::Deserialize;

use crate::errors::Result;
use crate::identifier::CommunicationIdentifier;
use crate::types::{CallConnectionId, OperationContext};

use super::types::{CallAutomationEventKind, InboundEvent, ResultInformation};

const EVENT_TYPE_PREFIX: &str = "Microsoft.Communication.";
const SUBJECT_PREFIX: &str = "calling/callConnections/";

#[derive(Debug, Deserialize)]
struct CloudEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    time: Option<DateTime<Utc>>,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventData {
    #[serde(default)]
    call_connection_id: Option<String>,
    #[serde(default)]
    server_call_id: Option<String>,
    #[serde(default)]
    correlation_id: Option<String>,
    #[serde(default)]
    operation_context: Option<String>,
    #[serde(default)]
    result_information: Option<ResultInformation>,
    #[serde(default)]
    participant: Option<CommunicationIdentifier>,
}

/// Parse one webhook body into events.
///
/// A malformed entry fails the whole batch so the delivery can be retried
/// by the sender.
pub fn parse_events(body: &str) -> Result<Vec<InboundEvent>> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    let raw_events: Vec<CloudEvent> = match value {
        serde_json::Value::Array(_) => serde_json::from_value(value)?,
        other => vec![serde_json::from_value(other)?],
    };
    raw_events.into_iter().map(normalize).collect()
}

fn normalize(raw: CloudEvent) -> Result<InboundEvent> {
    let name = raw
        .event_type
        .strip_prefix(EVENT_TYPE_PREFIX)
        .unwrap_or(&raw.event_type);
    let kind = CallAutomationEventKind::from_name(name);

    let data: EventData = if raw.data.is_null() {
        EventData::default()
    } else {
        serde_json::from_value(raw.data.clone())?
    };

    let call_connection_id = data
        .call_connection_id
        .filter(|id| !id.is_empty())
        .or_else(|| {
            raw.subject
                .as_deref()
                .and_then(|subject| subject.strip_prefix(SUBJECT_PREFIX))
                .map(str::to_string)
        })
        .ok_or_else(|| {
            serde_json::Error::custom(format!("{} event has no callConnectionId", raw.event_type))
        })?;

    Ok(InboundEvent {
        kind,
        call_connection_id: CallConnectionId(call_connection_id),
        operation_context: data
            .operation_context
            .filter(|context| !context.is_empty())
            .map(OperationContext),
        server_call_id: data.server_call_id,
        correlation_id: data.correlation_id,
        result_information: data.result_information,
        participant: data.participant,
        data: raw.data,
        received_at: raw.time.unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CallAutomationError;

    #[test]
    fn test_parse_batch() {
        let body = r#"[
            {
                "id": "1",
                "source": "calling/callConnections/call-7",
                "type": "Microsoft.Communication.AddParticipantSucceeded",
                "specversion": "1.0",
                "time": "2024-05-01T10:00:00Z",
                "data": {
                    "callConnectionId": "call-7",
                    "serverCallId": "srv",
                    "correlationId": "corr",
                    "operationContext": "ctx-1",
                    "participant": { "rawId": "4:+15550100" },
                    "resultInformation": { "code": 200, "subCode": 0, "message": "ok" }
                }
            },
            {
                "id": "2",
                "type": "Microsoft.Communication.ParticipantsUpdated",
                "subject": "calling/callConnections/call-7",
                "data": { "participants": [] }
            }
        ]"#;

        let events = parse_events(body).unwrap();
        assert_eq!(events.len(), 2);

        let added = &events[0];
        assert_eq!(added.kind, CallAutomationEventKind::AddParticipantSucceeded);
        assert_eq!(added.call_connection_id.as_str(), "call-7");
        assert_eq!(added.operation_context, Some(OperationContext::from("ctx-1")));
        assert!(added.participant.as_ref().unwrap().is_phone_number());
        assert_eq!(added.result_information.as_ref().unwrap().code, Some(200));

        let updated = &events[1];
        assert_eq!(updated.kind, CallAutomationEventKind::ParticipantsUpdated);
        assert_eq!(updated.call_connection_id.as_str(), "call-7");
        assert!(updated.correlation_key().is_none());
    }

    #[test]
    fn test_single_object_and_unknown_kind() {
        let body = r#"{
            "type": "Microsoft.Communication.RecordingStateChanged",
            "data": { "callConnectionId": "c", "operationContext": "" }
        }"#;
        let events = parse_events(body).unwrap();
        assert_eq!(
            events[0].kind,
            CallAutomationEventKind::Other("RecordingStateChanged".to_string())
        );
        assert!(events[0].operation_context.is_none());
    }

    #[test]
    fn test_missing_call_connection_id_fails_batch() {
        let body = r#"[{ "type": "Microsoft.Communication.CallConnected", "data": {} }]"#;
        assert!(matches!(parse_events(body), Err(CallAutomationError::Serialization(_))));
    }
}
