//! Blocking forms of the client and call connection
//!
//! Each wrapper owns a current-thread runtime and drives the async operation
//! to completion on the calling thread. Do not use these from inside an async
//! context; tokio panics if `block_on` is nested in a runtime.
//!
//! Events can be ingested from any thread while a blocking wait is in
//! progress.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Runtime;

use crate::client::CallAutomationClient;
use crate::connection::CallConnection;
use crate::errors::{CallAutomationError, Result};
use crate::events::{EventProcessor, InboundEvent};
use crate::options::{
    AddParticipantsOptions, CommandOptions, HangUpOptions, MuteAllParticipantsOptions,
    ParticipantMuteOptions, RemoveParticipantsOptions, TransferToParticipantOptions,
    UnmuteAllParticipantsOptions,
};
use crate::request::PreparedCommand;
use crate::result::{AddParticipantsResponse, CommandOutcome, CommandResult};
use crate::transport::CommandAck;
use crate::types::{CallConnectionId, CallConnectionProperties, CallParticipant, OperationContext};

fn build_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CallAutomationError::config(format!("failed to start blocking runtime: {e}")))
}

/// Blocking wrapper around [`CallAutomationClient`]
#[derive(Debug, Clone)]
pub struct BlockingCallAutomationClient {
    inner: CallAutomationClient,
    runtime: Arc<Runtime>,
}

impl BlockingCallAutomationClient {
    pub fn new(inner: CallAutomationClient) -> Result<Self> {
        Ok(Self {
            inner,
            runtime: Arc::new(build_runtime()?),
        })
    }

    pub fn inner(&self) -> &CallAutomationClient {
        &self.inner
    }

    pub fn event_processor(&self) -> &EventProcessor {
        self.inner.event_processor()
    }

    pub fn get_call_connection(&self, call_connection_id: impl Into<CallConnectionId>) -> Result<BlockingCallConnection> {
        Ok(BlockingCallConnection {
            inner: self.inner.get_call_connection(call_connection_id)?,
            runtime: Arc::clone(&self.runtime),
        })
    }

    pub fn process_events(&self, body: &str) -> Result<usize> {
        self.inner.process_events(body)
    }

    /// Block until an event under (call, context) arrives
    pub fn wait_for(
        &self,
        call_connection_id: &CallConnectionId,
        operation_context: &OperationContext,
        timeout: Duration,
    ) -> Result<InboundEvent> {
        self.runtime.block_on(
            self.inner
                .event_processor()
                .wait_for(call_connection_id, operation_context, timeout),
        )
    }
}

/// Blocking wrapper around [`CallConnection`]
#[derive(Debug, Clone)]
pub struct BlockingCallConnection {
    inner: CallConnection,
    runtime: Arc<Runtime>,
}

impl BlockingCallConnection {
    pub fn inner(&self) -> &CallConnection {
        &self.inner
    }

    pub fn call_connection_id(&self) -> &CallConnectionId {
        self.inner.call_connection_id()
    }

    pub fn prepare(&self, options: &mut CommandOptions) -> Result<PreparedCommand> {
        self.inner.prepare(options)
    }

    pub fn dispatch(&self, prepared: &PreparedCommand) -> Result<CommandResult<CommandAck>> {
        self.runtime.block_on(self.inner.dispatch(prepared))
    }

    pub fn hang_up(&self, for_everyone: bool) -> Result<CommandResult<CommandAck>> {
        self.runtime.block_on(self.inner.hang_up(for_everyone))
    }

    pub fn hang_up_with(&self, options: HangUpOptions) -> Result<CommandResult<CommandAck>> {
        self.runtime.block_on(self.inner.hang_up_with(options))
    }

    pub fn transfer_call_to_participant(
        &self,
        options: TransferToParticipantOptions,
    ) -> Result<CommandResult<CommandAck>> {
        self.runtime.block_on(self.inner.transfer_call_to_participant(options))
    }

    pub fn add_participants(&self, options: AddParticipantsOptions) -> Result<CommandResult<AddParticipantsResponse>> {
        self.runtime.block_on(self.inner.add_participants(options))
    }

    pub fn remove_participants(&self, options: RemoveParticipantsOptions) -> Result<CommandResult<CommandAck>> {
        self.runtime.block_on(self.inner.remove_participants(options))
    }

    pub fn mute_participant(&self, options: ParticipantMuteOptions) -> Result<CommandResult<CommandAck>> {
        self.runtime.block_on(self.inner.mute_participant(options))
    }

    pub fn unmute_participant(&self, options: ParticipantMuteOptions) -> Result<CommandResult<CommandAck>> {
        self.runtime.block_on(self.inner.unmute_participant(options))
    }

    pub fn mute_all_participants(&self, options: MuteAllParticipantsOptions) -> Result<CommandResult<CommandAck>> {
        self.runtime.block_on(self.inner.mute_all_participants(options))
    }

    pub fn unmute_all_participants(
        &self,
        options: UnmuteAllParticipantsOptions,
    ) -> Result<CommandResult<CommandAck>> {
        self.runtime.block_on(self.inner.unmute_all_participants(options))
    }

    pub fn get_participant(&self, participant_raw_id: &str) -> Result<CallParticipant> {
        self.runtime.block_on(self.inner.get_participant(participant_raw_id))
    }

    pub fn get_participants(&self) -> Result<Vec<CallParticipant>> {
        self.runtime.block_on(self.inner.get_participants())
    }

    pub fn get_call_connection_properties(&self) -> Result<CallConnectionProperties> {
        self.runtime.block_on(self.inner.get_call_connection_properties())
    }

    /// Block until the command behind `result` completes
    pub fn wait_for_outcome<T>(&self, result: &CommandResult<T>, timeout: Duration) -> Result<CommandOutcome> {
        self.runtime.block_on(result.wait_for_outcome(timeout))
    }
}
