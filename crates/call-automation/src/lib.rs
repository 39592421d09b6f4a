//! # RVoIP Call Automation
//!
//! Call control for live voice sessions, with correlation of asynchronously
//! delivered events back to the commands that caused them.
//!
//! ## Features
//!
//! - **Call connection handle**: hang up, transfer, add/remove participants,
//!   mute/unmute one or all, participant and property queries
//! - **Validation before dispatch**: caller id for PSTN targets, length and
//!   range limits, repeatability header pairs
//! - **Idempotent retries**: generated or supplied repeatability tokens that
//!   stay fixed across re-sends of the same command
//! - **Event correlation**: a shared processor matching webhook events to
//!   waiting callers, buffering events that arrive first
//! - **Blocking API**: every operation is also available without async
//!
//! ## Architecture
//!
//! - `request`: validates options and stamps them with an operation context
//!   and repeatability token
//! - `connection`: dispatches prepared commands over a pluggable transport
//! - `events`: parses webhook deliveries and correlates them with commands
//! - `client`: owns the event processor and hands out connection handles
//!
//! The crate performs no network I/O itself. Commands go out through a
//! [`transport::CallConnectionTransport`] and events come in through
//! [`client::CallAutomationClient::process_events`].

pub mod blocking;
pub mod client;
pub mod config;
pub mod connection;
pub mod context;
pub mod errors;
pub mod events;
pub mod identifier;
pub mod options;
pub mod repeatability;
pub mod request;
pub mod result;
pub mod transport;
pub mod types;

pub use client::{CallAutomationClient, CallAutomationClientBuilder};
pub use config::{CallAutomationConfig, EventRetentionConfig};
pub use connection::CallConnection;
pub use errors::{CallAutomationError, Result};
pub use events::{CallAutomationEventKind, EventProcessor, InboundEvent};
pub use identifier::{CommunicationIdentifier, PhoneNumberIdentifier};
pub use result::{CommandOutcome, CommandResult};
pub use types::{CallConnectionId, OperationContext};

/// Commonly used types
pub mod prelude {
    pub use crate::blocking::{BlockingCallAutomationClient, BlockingCallConnection};
    pub use crate::client::{CallAutomationClient, CallAutomationClientBuilder};
    pub use crate::config::{CallAutomationConfig, EventRetentionConfig};
    pub use crate::connection::CallConnection;
    pub use crate::errors::{CallAutomationError, Result};
    pub use crate::events::{CallAutomationEventKind, EventProcessor, InboundEvent};
    pub use crate::identifier::{CommunicationIdentifier, PhoneNumberIdentifier};
    pub use crate::options::{
        AddParticipantsOptions, CommandOptions, HangUpOptions, MuteAllParticipantsOptions,
        ParticipantMuteOptions, RemoveParticipantsOptions, TransferToParticipantOptions,
        UnmuteAllParticipantsOptions,
    };
    pub use crate::repeatability::{RepeatabilityHeaders, RepeatabilityToken};
    pub use crate::result::{CommandOutcome, CommandResult};
    pub use crate::transport::{CallConnectionTransport, CommandAck};
    pub use crate::types::{CallConnectionId, OperationContext};
}
