mod common;

use std::collections::HashSet;

use chrono::Utc;
use uuid::Uuid;

use common::{client, init_tracing, RecordingTransport};
use rvoip_call_automation::prelude::*;
use rvoip_call_automation::request::CallCommand;

#[tokio::test]
async fn test_pstn_add_without_caller_id_never_dispatches() {
    init_tracing();
    let transport = RecordingTransport::new();
    let connection = client(transport.clone(), CallAutomationConfig::default())
        .get_call_connection("call-1")
        .unwrap();

    let options = AddParticipantsOptions::new(vec![
        CommunicationIdentifier::communication_user("8:acs:alice"),
        CommunicationIdentifier::phone_number("+15550100"),
    ]);
    let err = connection.add_participants(options).await.unwrap_err();

    assert!(matches!(err, CallAutomationError::Argument { field: "source_caller_id" }));
    assert!(err.is_pre_dispatch());
    assert_eq!(transport.sent_count(), 0);
}

#[tokio::test]
async fn test_length_limit_is_inclusive() {
    let transport = RecordingTransport::new();
    let connection = client(transport.clone(), CallAutomationConfig::new().with_string_max_length(40))
        .get_call_connection("call-1")
        .unwrap();

    let at_limit = UnmuteAllParticipantsOptions::new().with_operation_context("c".repeat(40));
    assert!(connection.unmute_all_participants(at_limit).await.is_ok());

    let over_limit = UnmuteAllParticipantsOptions::new().with_operation_context("c".repeat(41));
    let err = connection.unmute_all_participants(over_limit).await.unwrap_err();
    assert!(matches!(err, CallAutomationError::Validation { field: "operation_context", .. }));

    assert_eq!(transport.sent_count(), 1);
}

#[test]
fn test_limit_below_generated_context_length_is_rejected() {
    let err = CallAutomationClient::builder()
        .transport(RecordingTransport::new())
        .config(CallAutomationConfig::new().with_string_max_length(16))
        .build()
        .unwrap_err();
    assert!(matches!(err, CallAutomationError::Configuration(_)));
}

#[tokio::test]
async fn test_generated_contexts_are_unique_and_supplied_ones_kept() {
    let transport = RecordingTransport::new();
    let connection = client(transport.clone(), CallAutomationConfig::default())
        .get_call_connection("call-1")
        .unwrap();
    let target = || ParticipantMuteOptions::new(CommunicationIdentifier::communication_user("8:acs:bob"));

    let mut seen = HashSet::new();
    for _ in 0..20 {
        let result = connection.mute_participant(target()).await.unwrap();
        assert!(!result.operation_context.as_str().is_empty());
        assert!(seen.insert(result.operation_context.clone()));
    }

    let supplied = connection
        .unmute_participant(target().with_operation_context("chained-7"))
        .await
        .unwrap();
    assert_eq!(supplied.operation_context.as_str(), "chained-7");

    match &transport.sent().last().unwrap().command {
        CallCommand::UnmuteParticipant(request) => assert_eq!(request.operation_context.as_str(), "chained-7"),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[tokio::test]
async fn test_retry_of_prepared_command_is_one_logical_attempt() {
    let transport = RecordingTransport::new();
    let connection = client(transport.clone(), CallAutomationConfig::default())
        .get_call_connection("call-1")
        .unwrap();

    transport.fail_next(CallAutomationError::transport(Some(503), "service unavailable"));

    let mut options: CommandOptions = TransferToParticipantOptions::new(CommunicationIdentifier::phone_number("+15550102"))
        .with_source_caller_id(PhoneNumberIdentifier::new("+15550199"))
        .into();
    let prepared = connection.prepare(&mut options).unwrap();

    let first = connection.dispatch(&prepared).await.unwrap_err();
    assert!(first.is_retryable());
    let second = connection.dispatch(&prepared).await.unwrap();

    // Preparing the same options again must not mint a new attempt either.
    let again = connection.prepare(&mut options).unwrap();
    assert_eq!(again, prepared);

    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].command, sent[1].command);
    assert_eq!(sent[0].repeatability, sent[1].repeatability);
    assert_eq!(second.repeatability, prepared.repeatability);
    assert_eq!(second.operation_context, prepared.operation_context);
}

#[tokio::test]
async fn test_malformed_repeatability_pair_fails_validation() {
    let transport = RecordingTransport::new();
    let connection = client(transport.clone(), CallAutomationConfig::default())
        .get_call_connection("call-1")
        .unwrap();

    let half = RepeatabilityHeaders {
        request_id: Some(Uuid::new_v4()),
        first_sent: None,
    };
    let err = connection
        .remove_participants(
            RemoveParticipantsOptions::new(vec![CommunicationIdentifier::communication_user("8:acs:c")])
                .with_repeatability_headers(half),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CallAutomationError::Validation { field: "repeatability_headers", .. }));
    assert_eq!(transport.sent_count(), 0);
}

#[tokio::test]
async fn test_supplied_repeatability_is_forwarded() {
    let transport = RecordingTransport::new();
    let connection = client(transport.clone(), CallAutomationConfig::default())
        .get_call_connection("call-1")
        .unwrap();

    let request_id = Uuid::new_v4();
    let headers = RepeatabilityHeaders::with_values(request_id, Utc::now());
    connection
        .hang_up_with(HangUpOptions::new(true).with_repeatability_headers(headers))
        .await
        .unwrap();
    connection.hang_up(false).await.unwrap();

    let sent = transport.sent();
    assert_eq!(sent[0].repeatability.map(|token| token.request_id), Some(request_id));
    assert!(sent[1].repeatability.is_none());
    assert_eq!(sent[0].call_connection_id.as_str(), "call-1");
}

#[tokio::test]
async fn test_transport_failure_propagates() {
    let transport = RecordingTransport::new();
    let connection = client(transport.clone(), CallAutomationConfig::default())
        .get_call_connection("call-1")
        .unwrap();
    transport.fail_next(CallAutomationError::transport(Some(404), "call not found"));

    let err = connection
        .mute_all_participants(MuteAllParticipantsOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CallAutomationError::Transport { status: Some(404), .. }));
    assert!(!err.is_retryable());
}
