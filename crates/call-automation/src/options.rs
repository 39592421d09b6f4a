//! Per-command options
//!
//! Each command kind has its own options struct holding exactly the fields
//! that command understands. [`CommandOptions`] closes the set so the request
//! builder can match on it exhaustively.

use std::collections::BTreeMap;

use crate::identifier::{CommunicationIdentifier, PhoneNumberIdentifier};
use crate::repeatability::RepeatabilityHeaders;

/// The kinds of command a call connection accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    HangUp,
    TransferToParticipant,
    AddParticipants,
    RemoveParticipants,
    MuteParticipant,
    UnmuteParticipant,
    MuteAllParticipants,
    UnmuteAllParticipants,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::HangUp => "hang_up",
            CommandKind::TransferToParticipant => "transfer_to_participant",
            CommandKind::AddParticipants => "add_participants",
            CommandKind::RemoveParticipants => "remove_participants",
            CommandKind::MuteParticipant => "mute_participant",
            CommandKind::UnmuteParticipant => "unmute_participant",
            CommandKind::MuteAllParticipants => "mute_all_participants",
            CommandKind::UnmuteAllParticipants => "unmute_all_participants",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// End the call, either for this leg only or for everyone
#[derive(Debug, Clone, Default)]
pub struct HangUpOptions {
    /// Terminate the call for all participants
    pub for_everyone: bool,
    /// Sent with the terminate request; leaving the call has no body, so
    /// there it is only echoed back in the command result
    pub operation_context: Option<String>,
    /// Only sent when `for_everyone` is set
    pub repeatability_headers: RepeatabilityHeaders,
}

impl HangUpOptions {
    pub fn new(for_everyone: bool) -> Self {
        Self {
            for_everyone,
            ..Default::default()
        }
    }

    pub fn with_operation_context(mut self, context: impl Into<String>) -> Self {
        self.operation_context = Some(context.into());
        self
    }

    pub fn with_repeatability_headers(mut self, headers: RepeatabilityHeaders) -> Self {
        self.repeatability_headers = headers;
        self
    }
}

/// Transfer the call to another participant
#[derive(Debug, Clone)]
pub struct TransferToParticipantOptions {
    pub target_participant: CommunicationIdentifier,
    /// Participant being transferred away, for calls with more than two parties
    pub transferee: Option<CommunicationIdentifier>,
    /// Required when the target is a phone number
    pub source_caller_id: Option<PhoneNumberIdentifier>,
    pub user_to_user_information: Option<String>,
    pub operation_context: Option<String>,
    pub custom_sip_headers: BTreeMap<String, String>,
    pub custom_voip_headers: BTreeMap<String, String>,
    pub repeatability_headers: RepeatabilityHeaders,
}

impl TransferToParticipantOptions {
    pub fn new(target_participant: CommunicationIdentifier) -> Self {
        Self {
            target_participant,
            transferee: None,
            source_caller_id: None,
            user_to_user_information: None,
            operation_context: None,
            custom_sip_headers: BTreeMap::new(),
            custom_voip_headers: BTreeMap::new(),
            repeatability_headers: RepeatabilityHeaders::default(),
        }
    }

    pub fn with_transferee(mut self, transferee: CommunicationIdentifier) -> Self {
        self.transferee = Some(transferee);
        self
    }

    pub fn with_source_caller_id(mut self, caller_id: PhoneNumberIdentifier) -> Self {
        self.source_caller_id = Some(caller_id);
        self
    }

    pub fn with_user_to_user_information(mut self, uui: impl Into<String>) -> Self {
        self.user_to_user_information = Some(uui.into());
        self
    }

    pub fn with_operation_context(mut self, context: impl Into<String>) -> Self {
        self.operation_context = Some(context.into());
        self
    }

    pub fn with_sip_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_sip_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_voip_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_voip_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_repeatability_headers(mut self, headers: RepeatabilityHeaders) -> Self {
        self.repeatability_headers = headers;
        self
    }
}

/// Invite one or more participants into the call
#[derive(Debug, Clone)]
pub struct AddParticipantsOptions {
    pub participants_to_add: Vec<CommunicationIdentifier>,
    /// Required when any participant is a phone number
    pub source_caller_id: Option<PhoneNumberIdentifier>,
    pub source_display_name: Option<String>,
    pub source_identifier: Option<CommunicationIdentifier>,
    /// How long the invitation rings before it is abandoned
    pub invitation_timeout_secs: Option<u32>,
    pub operation_context: Option<String>,
    pub repeatability_headers: RepeatabilityHeaders,
}

impl AddParticipantsOptions {
    pub fn new(participants_to_add: Vec<CommunicationIdentifier>) -> Self {
        Self {
            participants_to_add,
            source_caller_id: None,
            source_display_name: None,
            source_identifier: None,
            invitation_timeout_secs: None,
            operation_context: None,
            repeatability_headers: RepeatabilityHeaders::default(),
        }
    }

    pub fn with_source_caller_id(mut self, caller_id: PhoneNumberIdentifier) -> Self {
        self.source_caller_id = Some(caller_id);
        self
    }

    pub fn with_source_display_name(mut self, name: impl Into<String>) -> Self {
        self.source_display_name = Some(name.into());
        self
    }

    pub fn with_source_identifier(mut self, source: CommunicationIdentifier) -> Self {
        self.source_identifier = Some(source);
        self
    }

    pub fn with_invitation_timeout_secs(mut self, secs: u32) -> Self {
        self.invitation_timeout_secs = Some(secs);
        self
    }

    pub fn with_operation_context(mut self, context: impl Into<String>) -> Self {
        self.operation_context = Some(context.into());
        self
    }

    pub fn with_repeatability_headers(mut self, headers: RepeatabilityHeaders) -> Self {
        self.repeatability_headers = headers;
        self
    }
}

/// Remove participants from the call
#[derive(Debug, Clone)]
pub struct RemoveParticipantsOptions {
    pub participants_to_remove: Vec<CommunicationIdentifier>,
    pub operation_context: Option<String>,
    pub repeatability_headers: RepeatabilityHeaders,
}

impl RemoveParticipantsOptions {
    pub fn new(participants_to_remove: Vec<CommunicationIdentifier>) -> Self {
        Self {
            participants_to_remove,
            operation_context: None,
            repeatability_headers: RepeatabilityHeaders::default(),
        }
    }

    pub fn with_operation_context(mut self, context: impl Into<String>) -> Self {
        self.operation_context = Some(context.into());
        self
    }

    pub fn with_repeatability_headers(mut self, headers: RepeatabilityHeaders) -> Self {
        self.repeatability_headers = headers;
        self
    }
}

/// Mute or unmute a single participant
#[derive(Debug, Clone)]
pub struct ParticipantMuteOptions {
    pub target_participant: CommunicationIdentifier,
    pub operation_context: Option<String>,
    pub repeatability_headers: RepeatabilityHeaders,
}

impl ParticipantMuteOptions {
    pub fn new(target_participant: CommunicationIdentifier) -> Self {
        Self {
            target_participant,
            operation_context: None,
            repeatability_headers: RepeatabilityHeaders::default(),
        }
    }

    pub fn with_operation_context(mut self, context: impl Into<String>) -> Self {
        self.operation_context = Some(context.into());
        self
    }

    pub fn with_repeatability_headers(mut self, headers: RepeatabilityHeaders) -> Self {
        self.repeatability_headers = headers;
        self
    }
}

/// Mute every participant, optionally on behalf of an initiator
#[derive(Debug, Clone, Default)]
pub struct MuteAllParticipantsOptions {
    /// Participant the request is made on behalf of; they stay unmuted
    pub request_initiator: Option<CommunicationIdentifier>,
    pub operation_context: Option<String>,
    pub repeatability_headers: RepeatabilityHeaders,
}

impl MuteAllParticipantsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_initiator(mut self, initiator: CommunicationIdentifier) -> Self {
        self.request_initiator = Some(initiator);
        self
    }

    pub fn with_operation_context(mut self, context: impl Into<String>) -> Self {
        self.operation_context = Some(context.into());
        self
    }

    pub fn with_repeatability_headers(mut self, headers: RepeatabilityHeaders) -> Self {
        self.repeatability_headers = headers;
        self
    }
}

/// Unmute every participant
#[derive(Debug, Clone, Default)]
pub struct UnmuteAllParticipantsOptions {
    pub operation_context: Option<String>,
    pub repeatability_headers: RepeatabilityHeaders,
}

impl UnmuteAllParticipantsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation_context(mut self, context: impl Into<String>) -> Self {
        self.operation_context = Some(context.into());
        self
    }

    pub fn with_repeatability_headers(mut self, headers: RepeatabilityHeaders) -> Self {
        self.repeatability_headers = headers;
        self
    }
}

/// The closed set of command options accepted by the request builder
#[derive(Debug, Clone)]
pub enum CommandOptions {
    HangUp(HangUpOptions),
    TransferToParticipant(TransferToParticipantOptions),
    AddParticipants(AddParticipantsOptions),
    RemoveParticipants(RemoveParticipantsOptions),
    MuteParticipant(ParticipantMuteOptions),
    UnmuteParticipant(ParticipantMuteOptions),
    MuteAllParticipants(MuteAllParticipantsOptions),
    UnmuteAllParticipants(UnmuteAllParticipantsOptions),
}

impl CommandOptions {
    pub fn kind(&self) -> CommandKind {
        match self {
            CommandOptions::HangUp(_) => CommandKind::HangUp,
            CommandOptions::TransferToParticipant(_) => CommandKind::TransferToParticipant,
            CommandOptions::AddParticipants(_) => CommandKind::AddParticipants,
            CommandOptions::RemoveParticipants(_) => CommandKind::RemoveParticipants,
            CommandOptions::MuteParticipant(_) => CommandKind::MuteParticipant,
            CommandOptions::UnmuteParticipant(_) => CommandKind::UnmuteParticipant,
            CommandOptions::MuteAllParticipants(_) => CommandKind::MuteAllParticipants,
            CommandOptions::UnmuteAllParticipants(_) => CommandKind::UnmuteAllParticipants,
        }
    }

    /// Caller-supplied operation context, if any
    pub fn operation_context(&self) -> Option<&str> {
        match self {
            CommandOptions::HangUp(o) => o.operation_context.as_deref(),
            CommandOptions::TransferToParticipant(o) => o.operation_context.as_deref(),
            CommandOptions::AddParticipants(o) => o.operation_context.as_deref(),
            CommandOptions::RemoveParticipants(o) => o.operation_context.as_deref(),
            CommandOptions::MuteParticipant(o) | CommandOptions::UnmuteParticipant(o) => {
                o.operation_context.as_deref()
            }
            CommandOptions::MuteAllParticipants(o) => o.operation_context.as_deref(),
            CommandOptions::UnmuteAllParticipants(o) => o.operation_context.as_deref(),
        }
    }

    /// Repeatability headers, or `None` for a command sent without them
    pub fn repeatability_headers_mut(&mut self) -> Option<&mut RepeatabilityHeaders> {
        match self {
            CommandOptions::HangUp(o) if !o.for_everyone => None,
            CommandOptions::HangUp(o) => Some(&mut o.repeatability_headers),
            CommandOptions::TransferToParticipant(o) => Some(&mut o.repeatability_headers),
            CommandOptions::AddParticipants(o) => Some(&mut o.repeatability_headers),
            CommandOptions::RemoveParticipants(o) => Some(&mut o.repeatability_headers),
            CommandOptions::MuteParticipant(o) | CommandOptions::UnmuteParticipant(o) => {
                Some(&mut o.repeatability_headers)
            }
            CommandOptions::MuteAllParticipants(o) => Some(&mut o.repeatability_headers),
            CommandOptions::UnmuteAllParticipants(o) => Some(&mut o.repeatability_headers),
        }
    }
}

impl From<HangUpOptions> for CommandOptions {
    fn from(options: HangUpOptions) -> Self {
        CommandOptions::HangUp(options)
    }
}

impl From<TransferToParticipantOptions> for CommandOptions {
    fn from(options: TransferToParticipantOptions) -> Self {
        CommandOptions::TransferToParticipant(options)
    }
}

impl From<AddParticipantsOptions> for CommandOptions {
    fn from(options: AddParticipantsOptions) -> Self {
        CommandOptions::AddParticipants(options)
    }
}

impl From<RemoveParticipantsOptions> for CommandOptions {
    fn from(options: RemoveParticipantsOptions) -> Self {
        CommandOptions::RemoveParticipants(options)
    }
}

impl From<MuteAllParticipantsOptions> for CommandOptions {
    fn from(options: MuteAllParticipantsOptions) -> Self {
        CommandOptions::MuteAllParticipants(options)
    }
}

impl From<UnmuteAllParticipantsOptions> for CommandOptions {
    fn from(options: UnmuteAllParticipantsOptions) -> Self {
        CommandOptions::UnmuteAllParticipants(options)
    }
}
