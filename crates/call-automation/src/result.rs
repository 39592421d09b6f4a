//! Command results and their asynchronous outcomes

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::Result;
use crate::events::{CallAutomationEventKind, EventFilter, EventProcessor, InboundEvent};
use crate::options::CommandKind;
use crate::repeatability::RepeatabilityToken;
use crate::types::{CallConnectionId, CallParticipant, OperationContext};

/// Acknowledgment body of an add-participants command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddParticipantsResponse {
    #[serde(default)]
    pub participants: Vec<CallParticipant>,
    #[serde(default)]
    pub invitation_id: Option<String>,
    #[serde(default)]
    pub operation_context: Option<String>,
}

/// How an asynchronously completing command ended
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Succeeded(InboundEvent),
    Failed(InboundEvent),
    /// The command has no completion event; the acknowledgment was the outcome
    Completed,
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, CommandOutcome::Failed(_))
    }

    pub fn event(&self) -> Option<&InboundEvent> {
        match self {
            CommandOutcome::Succeeded(event) | CommandOutcome::Failed(event) => Some(event),
            CommandOutcome::Completed => None,
        }
    }
}

/// Terminal (success, failure) event kinds for commands that complete asynchronously
fn completion_kinds(kind: CommandKind) -> Option<(CallAutomationEventKind, CallAutomationEventKind)> {
    match kind {
        CommandKind::TransferToParticipant => Some((
            CallAutomationEventKind::CallTransferAccepted,
            CallAutomationEventKind::CallTransferFailed,
        )),
        CommandKind::AddParticipants => Some((
            CallAutomationEventKind::AddParticipantSucceeded,
            CallAutomationEventKind::AddParticipantFailed,
        )),
        CommandKind::RemoveParticipants => Some((
            CallAutomationEventKind::RemoveParticipantSucceeded,
            CallAutomationEventKind::RemoveParticipantFailed,
        )),
        CommandKind::HangUp
        | CommandKind::MuteParticipant
        | CommandKind::UnmuteParticipant
        | CommandKind::MuteAllParticipants
        | CommandKind::UnmuteAllParticipants => None,
    }
}

/// Synchronous result of a dispatched command
///
/// Carries everything needed to correlate the command's asynchronous outcome
/// later: the call, the operation context, and a handle to the event
/// processor the events are fed into.
#[derive(Debug, Clone)]
pub struct CommandResult<T> {
    pub kind: CommandKind,
    pub call_connection_id: CallConnectionId,
    pub operation_context: OperationContext,
    /// Token the command was sent with, for commands that carry one
    pub repeatability: Option<RepeatabilityToken>,
    pub value: T,
    processor: EventProcessor,
    default_timeout: Duration,
}

impl<T> CommandResult<T> {
    pub(crate) fn new(
        kind: CommandKind,
        call_connection_id: CallConnectionId,
        operation_context: OperationContext,
        repeatability: Option<RepeatabilityToken>,
        value: T,
        processor: EventProcessor,
        default_timeout: Duration,
    ) -> Self {
        Self {
            kind,
            call_connection_id,
            operation_context,
            repeatability,
            value,
            processor,
            default_timeout,
        }
    }

    pub fn event_processor(&self) -> &EventProcessor {
        &self.processor
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// Swap the payload, keeping the correlation data
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CommandResult<U> {
        CommandResult {
            kind: self.kind,
            call_connection_id: self.call_connection_id,
            operation_context: self.operation_context,
            repeatability: self.repeatability,
            value: f(self.value),
            processor: self.processor,
            default_timeout: self.default_timeout,
        }
    }

    /// Wait for the terminal event of this command.
    ///
    /// Commands without a completion event resolve immediately with
    /// [`CommandOutcome::Completed`].
    pub async fn wait_for_outcome(&self, timeout: Duration) -> Result<CommandOutcome> {
        self.wait(timeout, None).await
    }

    /// [`wait_for_outcome`](Self::wait_for_outcome) with the client's default timeout
    pub async fn wait_for_outcome_default(&self) -> Result<CommandOutcome> {
        self.wait(self.default_timeout, None).await
    }

    pub async fn wait_for_outcome_with_cancellation(
        &self,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<CommandOutcome> {
        self.wait(timeout, Some(cancel)).await
    }

    async fn wait(&self, timeout: Duration, cancel: Option<CancellationToken>) -> Result<CommandOutcome> {
        let Some((success, failure)) = completion_kinds(self.kind) else {
            return Ok(CommandOutcome::Completed);
        };

        let filter: EventFilter = {
            let (success, failure) = (success.clone(), failure.clone());
            Arc::new(move |event: &InboundEvent| event.kind == success || event.kind == failure)
        };

        let event = match cancel {
            Some(token) => {
                self.processor
                    .wait_for_event_with_cancellation(
                        &self.call_connection_id,
                        &self.operation_context,
                        Some(filter),
                        timeout,
                        token,
                    )
                    .await?
            }
            None => {
                self.processor
                    .wait_for_event(&self.call_connection_id, &self.operation_context, filter, timeout)
                    .await?
            }
        };

        if event.kind == success {
            Ok(CommandOutcome::Succeeded(event))
        } else {
            tracing::debug!(
                "{} on call {} failed: {:?}",
                self.kind,
                self.call_connection_id,
                event.result_information
            );
            Ok(CommandOutcome::Failed(event))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventRetentionConfig;
    use crate::errors::CallAutomationError;

    fn result(kind: CommandKind, processor: &EventProcessor) -> CommandResult<()> {
        CommandResult::new(
            kind,
            CallConnectionId::new("call-9"),
            OperationContext::from("op"),
            None,
            (),
            processor.clone(),
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn test_transfer_outcome_ignores_unrelated_events() {
        let processor = EventProcessor::new(EventRetentionConfig::default(), 8);
        let pending = result(CommandKind::TransferToParticipant, &processor);

        processor.ingest(InboundEvent::new(
            CallAutomationEventKind::ParticipantsUpdated,
            "call-9".into(),
            Some("op".into()),
        ));
        processor.ingest(InboundEvent::new(
            CallAutomationEventKind::CallTransferFailed,
            "call-9".into(),
            Some("op".into()),
        ));

        let outcome = pending.wait_for_outcome_default().await.unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.event().unwrap().kind, CallAutomationEventKind::CallTransferFailed);
    }

    #[tokio::test]
    async fn test_mute_completes_without_event() {
        let processor = EventProcessor::new(EventRetentionConfig::default(), 8);
        let outcome = result(CommandKind::MuteParticipant, &processor)
            .wait_for_outcome(Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(outcome, CommandOutcome::Completed);
    }

    #[tokio::test]
    async fn test_outcome_wait_can_be_cancelled() {
        let processor = EventProcessor::new(EventRetentionConfig::default(), 8);
        let pending = result(CommandKind::AddParticipants, &processor);
        let token = CancellationToken::new();
        token.cancel();

        let err = pending
            .wait_for_outcome_with_cancellation(Duration::from_secs(60), token)
            .await
            .unwrap_err();
        assert!(matches!(err, CallAutomationError::Cancelled { .. }));
        assert_eq!(processor.stats().pending_waiters, 0);
    }
}
