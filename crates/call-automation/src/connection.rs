//! Call connection handle
//!
//! A [`CallConnection`] scopes every command to one active call. It holds no
//! call state of its own: participants, mute status and the rest live on the
//! service and are only ever queried.
//!
//! # Command protocol
//!
//! Every command method follows the same steps:
//!
//! 1. Validate the options and stamp them with an operation context and, where
//!    the command supports retries, a repeatability token. Validation failures
//!    return before anything is sent.
//! 2. Hand the command to the [`CallConnectionTransport`].
//! 3. Wrap the acknowledgment in a [`CommandResult`] that can later wait for
//!    the command's asynchronous outcome.
//! 4. Transport failures are returned to the caller unchanged.
//!
//! # Retries
//!
//! The command methods take their options by value and stamp a fresh copy on
//! every call, so calling one again after a `Transport` error sends a new
//! operation context and a new repeatability token. The service then treats
//! it as a second request. To retry as one logical attempt, build the
//! [`CommandOptions`] yourself and use [`CallConnection::prepare`] once and
//! [`CallConnection::dispatch`] for every send. Supplying an explicit operation
//! context and [`RepeatabilityHeaders`](crate::repeatability::RepeatabilityHeaders)
//! in the options has the same effect.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use rvoip_call_automation::prelude::*;
//!
//! async fn invite(connection: &CallConnection) -> Result<()> {
//!     let options = AddParticipantsOptions::new(vec![CommunicationIdentifier::phone_number("+15550100")])
//!         .with_source_caller_id(PhoneNumberIdentifier::new("+15550199"))
//!         .with_invitation_timeout_secs(30);
//!
//!     let result = connection.add_participants(options).await?;
//!     match result.wait_for_outcome(Duration::from_secs(60)).await? {
//!         CommandOutcome::Succeeded(event) => println!("joined: {:?}", event.participant),
//!         other => println!("not added: {:?}", other),
//!     }
//!     Ok(())
//! }
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::config::CallAutomationConfig;
use crate::errors::{CallAutomationError, Result};
use crate::events::EventProcessor;
use crate::identifier::CommunicationIdentifier;
use crate::options::{
    AddParticipantsOptions, CommandOptions, HangUpOptions, MuteAllParticipantsOptions,
    ParticipantMuteOptions, RemoveParticipantsOptions, TransferToParticipantOptions,
    UnmuteAllParticipantsOptions,
};
use crate::request::{CallCommand, PreparedCommand, RequestBuilder};
use crate::result::{AddParticipantsResponse, CommandResult};
use crate::transport::{CallConnectionTransport, CommandAck};
use crate::types::{CallConnectionId, CallConnectionProperties, CallParticipant};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParticipantsPage {
    #[serde(default)]
    value: Vec<CallParticipant>,
    #[serde(default)]
    next_link: Option<String>,
}

/// Handle for issuing commands against one call
///
/// Cheap to clone. Obtain one from
/// [`CallAutomationClient::get_call_connection`](crate::client::CallAutomationClient::get_call_connection)
/// so it shares the client's event processor.
#[derive(Debug, Clone)]
pub struct CallConnection {
    call_connection_id: CallConnectionId,
    transport: Arc<dyn CallConnectionTransport>,
    builder: RequestBuilder,
    processor: EventProcessor,
    default_wait_timeout: Duration,
}

impl CallConnection {
    pub fn new(
        call_connection_id: CallConnectionId,
        transport: Arc<dyn CallConnectionTransport>,
        config: &CallAutomationConfig,
        processor: EventProcessor,
    ) -> Self {
        Self {
            call_connection_id,
            transport,
            builder: RequestBuilder::new(config),
            processor,
            default_wait_timeout: config.default_wait_timeout,
        }
    }

    pub fn call_connection_id(&self) -> &CallConnectionId {
        &self.call_connection_id
    }

    pub fn event_processor(&self) -> &EventProcessor {
        &self.processor
    }

    /// Validate and stamp a command without sending it.
    ///
    /// The resolved operation context and repeatability token are written
    /// back into `options`. Pair with [`dispatch`](Self::dispatch) to retry a
    /// command as one logical attempt.
    pub fn prepare(&self, options: &mut CommandOptions) -> Result<PreparedCommand> {
        self.builder.prepare(options)
    }

    /// Send an already prepared command.
    ///
    /// Sending the same [`PreparedCommand`] again reuses its operation context
    /// and repeatability token, so the service treats both sends as one
    /// request.
    pub async fn dispatch(&self, prepared: &PreparedCommand) -> Result<CommandResult<CommandAck>> {
        tracing::debug!(
            "Dispatching {} on call {} (operation context {}, request id {:?})",
            prepared.command.name(),
            self.call_connection_id,
            prepared.operation_context,
            prepared.repeatability.as_ref().map(|token| token.request_id)
        );

        let ack = self
            .transport
            .send(&self.call_connection_id, &prepared.command, prepared.repeatability.as_ref())
            .await
            .map_err(|e| {
                tracing::warn!(
                    "{} on call {} failed: {}",
                    prepared.command.name(),
                    self.call_connection_id,
                    e
                );
                e
            })?;

        Ok(CommandResult::new(
            prepared.kind,
            self.call_connection_id.clone(),
            prepared.operation_context.clone(),
            prepared.repeatability,
            ack,
            self.processor.clone(),
            self.default_wait_timeout,
        ))
    }

    async fn execute(&self, mut options: CommandOptions) -> Result<CommandResult<CommandAck>> {
        let prepared = self.builder.prepare(&mut options)?;
        self.dispatch(&prepared).await
    }

    async fn query(&self, command: CallCommand) -> Result<CommandAck> {
        tracing::debug!("Querying {} on call {}", command.name(), self.call_connection_id);
        self.transport
            .send(&self.call_connection_id, &command, None)
            .await
            .map_err(|e| {
                tracing::warn!("{} on call {} failed: {}", command.name(), self.call_connection_id, e);
                e
            })
    }

    /// Leave the call, or end it for everyone.
    ///
    /// Only ending the call for everyone is sent with a repeatability token.
    /// Each call is a new attempt; see [retries](crate::connection#retries).
    pub async fn hang_up(&self, for_everyone: bool) -> Result<CommandResult<CommandAck>> {
        self.hang_up_with(HangUpOptions::new(for_everyone)).await
    }

    /// Hang up with explicit options.
    ///
    /// Each call is a new attempt; see [retries](crate::connection#retries).
    pub async fn hang_up_with(&self, options: HangUpOptions) -> Result<CommandResult<CommandAck>> {
        self.execute(options.into()).await
    }

    /// Transfer the call to another participant.
    ///
    /// # Errors
    ///
    /// * `CallAutomationError::Argument` - the target is a phone number and no
    ///   source caller id was given
    /// * `CallAutomationError::Validation` - user-to-user information or the
    ///   operation context is too long
    /// * `CallAutomationError::Transport` - the service rejected the command
    ///
    /// The outcome arrives as `CallTransferAccepted` or `CallTransferFailed`.
    /// Options are consumed and each call is a new attempt; see [retries](crate::connection#retries).
    pub async fn transfer_call_to_participant(
        &self,
        options: TransferToParticipantOptions,
    ) -> Result<CommandResult<CommandAck>> {
        self.execute(options.into()).await
    }

    /// Invite participants into the call.
    ///
    /// # Errors
    ///
    /// * `CallAutomationError::Argument` - no participants, or a phone number
    ///   among them without a source caller id
    /// * `CallAutomationError::Validation` - invitation timeout out of range or
    ///   operation context too long
    /// * `CallAutomationError::Transport` - the service rejected the command
    ///
    /// Each invited participant produces its own `AddParticipantSucceeded` or
    /// `AddParticipantFailed` event. Calling again after a failure invites
    /// under a new repeatability token; see [retries](crate::connection#retries).
    pub async fn add_participants(
        &self,
        options: AddParticipantsOptions,
    ) -> Result<CommandResult<AddParticipantsResponse>> {
        let result = self.execute(options.into()).await?;
        let response = match &result.value.body {
            Some(body) => serde_json::from_value(body.clone())?,
            None => AddParticipantsResponse::default(),
        };
        Ok(result.map(|_| response))
    }

    /// Remove participants from the call.
    ///
    /// Each call is a new attempt; see [retries](crate::connection#retries).
    pub async fn remove_participants(
        &self,
        options: RemoveParticipantsOptions,
    ) -> Result<CommandResult<CommandAck>> {
        self.execute(options.into()).await
    }

    /// Remove a single participant
    ///
    /// Each call is a new attempt; see [retries](crate::connection#retries).
    pub async fn remove_participant(
        &self,
        participant: CommunicationIdentifier,
        operation_context: Option<String>,
    ) -> Result<CommandResult<CommandAck>> {
        let mut options = RemoveParticipantsOptions::new(vec![participant]);
        options.operation_context = operation_context;
        self.remove_participants(options).await
    }

    /// Each call is a new attempt; see [retries](crate::connection#retries).
    pub async fn mute_participant(&self, options: ParticipantMuteOptions) -> Result<CommandResult<CommandAck>> {
        self.execute(CommandOptions::MuteParticipant(options)).await
    }

    /// Each call is a new attempt; see [retries](crate::connection#retries).
    pub async fn unmute_participant(&self, options: ParticipantMuteOptions) -> Result<CommandResult<CommandAck>> {
        self.execute(CommandOptions::UnmuteParticipant(options)).await
    }

    /// Each call is a new attempt; see [retries](crate::connection#retries).
    pub async fn mute_all_participants(
        &self,
        options: MuteAllParticipantsOptions,
    ) -> Result<CommandResult<CommandAck>> {
        self.execute(options.into()).await
    }

    /// Each call is a new attempt; see [retries](crate::connection#retries).
    pub async fn unmute_all_participants(
        &self,
        options: UnmuteAllParticipantsOptions,
    ) -> Result<CommandResult<CommandAck>> {
        self.execute(options.into()).await
    }

    /// Fetch one participant by raw id
    pub async fn get_participant(&self, participant_raw_id: &str) -> Result<CallParticipant> {
        if participant_raw_id.is_empty() {
            return Err(CallAutomationError::argument("participant_raw_id"));
        }
        let ack = self
            .query(CallCommand::GetParticipant {
                participant_raw_id: participant_raw_id.to_string(),
            })
            .await?;
        ack.decode()
    }

    /// Fetch every participant, following server pagination to the end.
    ///
    /// Stops early if the service hands back a link it already returned.
    pub async fn get_participants(&self) -> Result<Vec<CallParticipant>> {
        let mut participants = Vec::new();
        let mut seen_links = HashSet::new();
        let mut next_link = None;
        loop {
            let page: ParticipantsPage = self.query(CallCommand::ListParticipants { next_link }).await?.decode()?;
            participants.extend(page.value);
            match page.next_link.filter(|link| !link.is_empty()) {
                Some(link) if !seen_links.insert(link.clone()) => {
                    tracing::warn!(
                        "Participant listing on call {} repeated next link {}, stopping",
                        self.call_connection_id,
                        link
                    );
                    break;
                }
                Some(link) => next_link = Some(link),
                None => break,
            }
        }
        Ok(participants)
    }

    pub async fn get_call_connection_properties(&self) -> Result<CallConnectionProperties> {
        self.query(CallCommand::GetProperties).await?.decode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventRetentionConfig;
    use crate::repeatability::RepeatabilityToken;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Replays canned acknowledgments and records what was sent
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<CommandAck>>>,
        sent: Mutex<Vec<(CallCommand, Option<RepeatabilityToken>)>>,
    }

    impl ScriptedTransport {
        fn reply(self, ack: Result<CommandAck>) -> Self {
            self.replies.lock().push_back(ack);
            self
        }
    }

    #[async_trait]
    impl CallConnectionTransport for ScriptedTransport {
        async fn send(
            &self,
            _call_connection_id: &CallConnectionId,
            command: &CallCommand,
            repeatability: Option<&RepeatabilityToken>,
        ) -> Result<CommandAck> {
            self.sent.lock().push((command.clone(), repeatability.copied()));
            self.replies.lock().pop_front().unwrap_or_else(|| Ok(CommandAck::new(202)))
        }
    }

    fn connection(transport: Arc<ScriptedTransport>) -> CallConnection {
        CallConnection::new(
            CallConnectionId::new("call-1"),
            transport,
            &CallAutomationConfig::default(),
            EventProcessor::new(EventRetentionConfig::default(), 8),
        )
    }

    #[tokio::test]
    async fn test_get_participants_follows_next_link() {
        let transport = Arc::new(
            ScriptedTransport::default()
                .reply(Ok(CommandAck::with_body(
                    200,
                    json!({
                        "value": [{ "identifier": { "rawId": "8:acs:one" } }],
                        "nextLink": "/calling/callConnections/call-1/participants?page=2"
                    }),
                )))
                .reply(Ok(CommandAck::with_body(
                    200,
                    json!({ "value": [{ "identifier": { "rawId": "4:+15550100" }, "isMuted": true }] }),
                ))),
        );
        let participants = connection(transport.clone()).get_participants().await.unwrap();

        assert_eq!(participants.len(), 2);
        assert!(participants[1].is_muted);

        let sent = transport.sent.lock();
        assert_eq!(
            sent[1].0,
            CallCommand::ListParticipants {
                next_link: Some("/calling/callConnections/call-1/participants?page=2".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_get_participants_stops_on_repeated_next_link() {
        let page = |raw_id: &str| {
            Ok(CommandAck::with_body(
                200,
                json!({
                    "value": [{ "identifier": { "rawId": raw_id } }],
                    "nextLink": "/calling/callConnections/call-1/participants?page=2"
                }),
            ))
        };
        let transport = Arc::new(
            ScriptedTransport::default()
                .reply(page("8:acs:one"))
                .reply(page("8:acs:two"))
                .reply(page("8:acs:never-fetched")),
        );
        let participants = connection(transport.clone()).get_participants().await.unwrap();

        assert_eq!(participants.len(), 2);
        assert_eq!(transport.sent.lock().len(), 2);
        assert_eq!(transport.replies.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_command_call_is_a_new_attempt() {
        let transport = Arc::new(
            ScriptedTransport::default().reply(Err(CallAutomationError::transport(Some(503), "busy"))),
        );
        let connection = connection(transport.clone());

        assert!(connection.hang_up(true).await.unwrap_err().is_retryable());
        connection.hang_up(true).await.unwrap();

        let mut options: CommandOptions = HangUpOptions::new(true).into();
        let prepared = connection.prepare(&mut options).unwrap();
        connection.dispatch(&prepared).await.unwrap();
        connection.dispatch(&prepared).await.unwrap();

        let sent = transport.sent.lock();
        assert_ne!(sent[0].1, sent[1].1);
        assert_eq!(sent[2].1, sent[3].1);
        assert_eq!(sent[2].1, prepared.repeatability);
    }

    #[tokio::test]
    async fn test_get_participant_requires_raw_id() {
        let transport = Arc::new(ScriptedTransport::default());
        let err = connection(transport.clone()).get_participant("").await.unwrap_err();

        assert!(matches!(err, CallAutomationError::Argument { field: "participant_raw_id" }));
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_is_returned_unchanged() {
        let transport = Arc::new(
            ScriptedTransport::default().reply(Err(CallAutomationError::transport(Some(409), "call is gone"))),
        );
        let err = connection(transport).hang_up(true).await.unwrap_err();

        match err {
            CallAutomationError::Transport { status, message } => {
                assert_eq!(status, Some(409));
                assert_eq!(message, "call is gone");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_add_participants_decodes_ack_body() {
        let transport = Arc::new(ScriptedTransport::default().reply(Ok(CommandAck::with_body(
            202,
            json!({
                "participants": [{ "identifier": { "rawId": "8:acs:two" } }],
                "invitationId": "inv-1",
                "operationContext": "ctx"
            }),
        ))));
        let options = AddParticipantsOptions::new(vec![CommunicationIdentifier::communication_user("8:acs:two")])
            .with_operation_context("ctx");
        let result = connection(transport).add_participants(options).await.unwrap();

        assert_eq!(result.operation_context.as_str(), "ctx");
        assert_eq!(result.value.invitation_id.as_deref(), Some("inv-1"));
        assert_eq!(result.value.participants.len(), 1);
    }
}
