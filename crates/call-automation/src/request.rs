//! Command request builder
//!
//! Turns caller options into a [`PreparedCommand`]: the validated wire payload
//! plus the operation context and repeatability token it will be dispatched
//! with. All validation happens here, before any network interaction.
//!
//! Preparing writes the resolved context and token back into the options, so
//! preparing the same options again yields the same logical attempt.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::CallAutomationConfig;
use crate::context::{self, OPERATION_CONTEXT_FIELD};
use crate::errors::{CallAutomationError, Result};
use crate::identifier::{CommunicationIdentifier, PhoneNumberIdentifier, PhoneNumberModel};
use crate::options::{
    AddParticipantsOptions, CommandKind, CommandOptions, HangUpOptions, MuteAllParticipantsOptions,
    ParticipantMuteOptions, RemoveParticipantsOptions, TransferToParticipantOptions,
    UnmuteAllParticipantsOptions,
};
use crate::repeatability::RepeatabilityToken;
use crate::types::{CallConnectionId, OperationContext};

const USER_TO_USER_INFORMATION_FIELD: &str = "user_to_user_information";

/// Caller id sent with PSTN-bound commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallerIdModel(PhoneNumberModel);

impl From<&PhoneNumberIdentifier> for CallerIdModel {
    fn from(phone: &PhoneNumberIdentifier) -> Self {
        Self(PhoneNumberModel {
            value: phone.phone_number.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomCallingContext {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sip_headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub voip_headers: BTreeMap<String, String>,
}

/// Hang-up command; only the terminate form has a body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HangUpRequest {
    #[serde(skip)]
    pub for_everyone: bool,
    pub operation_context: OperationContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferToParticipantRequest {
    pub target_participant: CommunicationIdentifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transferee: Option<CommunicationIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transferee_caller_id: Option<CallerIdModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_to_user_information: Option<String>,
    pub operation_context: OperationContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_calling_context: Option<CustomCallingContext>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddParticipantsRequest {
    pub participants_to_add: Vec<CommunicationIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_caller_id_number: Option<CallerIdModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_identifier: Option<CommunicationIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invitation_timeout_in_seconds: Option<u32>,
    pub operation_context: OperationContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveParticipantsRequest {
    pub participants_to_remove: Vec<CommunicationIdentifier>,
    pub operation_context: OperationContext,
}

/// Body shared by mute and unmute of specific participants
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantMuteRequest {
    pub target_participants: Vec<CommunicationIdentifier>,
    pub operation_context: OperationContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MuteAllParticipantsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_initiator: Option<CommunicationIdentifier>,
    pub operation_context: OperationContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmuteAllParticipantsRequest {
    pub operation_context: OperationContext,
}

/// Everything the transport can be asked to send for one call connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallCommand {
    HangUp(HangUpRequest),
    TransferToParticipant(TransferToParticipantRequest),
    AddParticipants(AddParticipantsRequest),
    RemoveParticipants(RemoveParticipantsRequest),
    MuteParticipant(ParticipantMuteRequest),
    UnmuteParticipant(ParticipantMuteRequest),
    MuteAllParticipants(MuteAllParticipantsRequest),
    UnmuteAllParticipants(UnmuteAllParticipantsRequest),
    /// Fetch one participant by raw id
    GetParticipant { participant_raw_id: String },
    /// Fetch a page of participants; `next_link` continues a previous page
    ListParticipants { next_link: Option<String> },
    GetProperties,
}

impl CallCommand {
    pub fn name(&self) -> &'static str {
        match self {
            CallCommand::HangUp(r) if r.for_everyone => "terminate",
            CallCommand::HangUp(_) => "hang_up",
            CallCommand::TransferToParticipant(_) => "transfer_to_participant",
            CallCommand::AddParticipants(_) => "add_participants",
            CallCommand::RemoveParticipants(_) => "remove_participants",
            CallCommand::MuteParticipant(_) => "mute_participant",
            CallCommand::UnmuteParticipant(_) => "unmute_participant",
            CallCommand::MuteAllParticipants(_) => "mute_all_participants",
            CallCommand::UnmuteAllParticipants(_) => "unmute_all_participants",
            CallCommand::GetParticipant { .. } => "get_participant",
            CallCommand::ListParticipants { .. } => "list_participants",
            CallCommand::GetProperties => "get_properties",
        }
    }

    /// HTTP method and path for REST transports
    pub fn http_route(&self, call_connection_id: &CallConnectionId) -> (&'static str, String) {
        let base = format!("/calling/callConnections/{call_connection_id}");
        match self {
            CallCommand::HangUp(r) if r.for_everyone => ("POST", format!("{base}:terminate")),
            CallCommand::HangUp(_) => ("DELETE", base),
            CallCommand::TransferToParticipant(_) => ("POST", format!("{base}:transferToParticipant")),
            CallCommand::AddParticipants(_) => ("POST", format!("{base}/participants:add")),
            CallCommand::RemoveParticipants(_) => ("POST", format!("{base}/participants:remove")),
            CallCommand::MuteParticipant(_) => ("POST", format!("{base}/participants:mute")),
            CallCommand::UnmuteParticipant(_) => ("POST", format!("{base}/participants:unmute")),
            CallCommand::MuteAllParticipants(_) => ("POST", format!("{base}/participants:muteAll")),
            CallCommand::UnmuteAllParticipants(_) => ("POST", format!("{base}/participants:unmuteAll")),
            CallCommand::GetParticipant { participant_raw_id } => {
                ("GET", format!("{base}/participants/{participant_raw_id}"))
            }
            CallCommand::ListParticipants { next_link: Some(link) } => ("GET", link.clone()),
            CallCommand::ListParticipants { next_link: None } => ("GET", format!("{base}/participants")),
            CallCommand::GetProperties => ("GET", base),
        }
    }

    /// JSON body, if the command has one
    pub fn body(&self) -> Result<Option<serde_json::Value>> {
        let body = match self {
            CallCommand::HangUp(r) if r.for_everyone => serde_json::to_value(r)?,
            CallCommand::HangUp(_)
            | CallCommand::GetParticipant { .. }
            | CallCommand::ListParticipants { .. }
            | CallCommand::GetProperties => return Ok(None),
            CallCommand::TransferToParticipant(r) => serde_json::to_value(r)?,
            CallCommand::AddParticipants(r) => serde_json::to_value(r)?,
            CallCommand::RemoveParticipants(r) => serde_json::to_value(r)?,
            CallCommand::MuteParticipant(r) | CallCommand::UnmuteParticipant(r) => serde_json::to_value(r)?,
            CallCommand::MuteAllParticipants(r) => serde_json::to_value(r)?,
            CallCommand::UnmuteAllParticipants(r) => serde_json::to_value(r)?,
        };
        Ok(Some(body))
    }
}

/// A validated command stamped with its correlation data
///
/// Dispatching the same prepared command twice is one logical attempt: the
/// operation context and repeatability token are identical on both sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCommand {
    pub kind: CommandKind,
    pub command: CallCommand,
    pub operation_context: OperationContext,
    pub repeatability: Option<RepeatabilityToken>,
}

/// Validates options and assembles transport-ready commands
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    string_max_length: usize,
    min_invitation_timeout_secs: u32,
    max_invitation_timeout_secs: u32,
}

impl RequestBuilder {
    pub fn new(config: &CallAutomationConfig) -> Self {
        Self {
            string_max_length: config.string_max_length,
            min_invitation_timeout_secs: config.min_invitation_timeout_secs,
            max_invitation_timeout_secs: config.max_invitation_timeout_secs,
        }
    }

    /// Validate and stamp a command.
    ///
    /// Nothing in `options` is modified unless every check passes.
    pub fn prepare(&self, options: &mut CommandOptions) -> Result<PreparedCommand> {
        self.validate(options)?;

        let operation_context = context::allocate(options.operation_context(), self.string_max_length)?;
        let repeatability = match options.repeatability_headers_mut() {
            Some(headers) => Some(headers.resolve()?),
            None => None,
        };
        store_operation_context(options, &operation_context);

        let command = build_command(options, &operation_context);
        Ok(PreparedCommand {
            kind: options.kind(),
            command,
            operation_context,
            repeatability,
        })
    }

    fn validate(&self, options: &mut CommandOptions) -> Result<()> {
        match options {
            CommandOptions::HangUp(_) => {}
            CommandOptions::TransferToParticipant(o) => {
                // PSTN targets have to present a caller id.
                if o.target_participant.is_phone_number() && o.source_caller_id.is_none() {
                    return Err(CallAutomationError::argument("source_caller_id"));
                }
                if let Some(uui) = &o.user_to_user_information {
                    context::check_max_length(USER_TO_USER_INFORMATION_FIELD, uui, self.string_max_length)?;
                }
            }
            CommandOptions::AddParticipants(o) => {
                if o.participants_to_add.is_empty() {
                    return Err(CallAutomationError::argument("participants_to_add"));
                }
                if o.participants_to_add.iter().any(|p| p.is_phone_number()) && o.source_caller_id.is_none() {
                    return Err(CallAutomationError::argument("source_caller_id"));
                }
                if let Some(timeout) = o.invitation_timeout_secs {
                    if timeout < self.min_invitation_timeout_secs || timeout > self.max_invitation_timeout_secs {
                        return Err(CallAutomationError::validation(
                            "invitation_timeout_secs",
                            format!(
                                "{timeout} is outside the allowed range {}..={}",
                                self.min_invitation_timeout_secs, self.max_invitation_timeout_secs
                            ),
                        ));
                    }
                }
            }
            CommandOptions::RemoveParticipants(o) => {
                if o.participants_to_remove.is_empty() {
                    return Err(CallAutomationError::argument("participants_to_remove"));
                }
            }
            CommandOptions::MuteParticipant(_)
            | CommandOptions::UnmuteParticipant(_)
            | CommandOptions::MuteAllParticipants(_)
            | CommandOptions::UnmuteAllParticipants(_) => {}
        }

        if let Some(context) = options.operation_context() {
            context::check_max_length(OPERATION_CONTEXT_FIELD, context, self.string_max_length)?;
        }
        if let Some(headers) = options.repeatability_headers_mut() {
            if !headers.is_valid() {
                return Err(CallAutomationError::validation(
                    "repeatability_headers",
                    "request id and first-sent timestamp must be supplied together",
                ));
            }
        }
        Ok(())
    }
}

fn store_operation_context(options: &mut CommandOptions, context: &OperationContext) {
    let slot = match options {
        CommandOptions::HangUp(o) => &mut o.operation_context,
        CommandOptions::TransferToParticipant(o) => &mut o.operation_context,
        CommandOptions::AddParticipants(o) => &mut o.operation_context,
        CommandOptions::RemoveParticipants(o) => &mut o.operation_context,
        CommandOptions::MuteParticipant(o) | CommandOptions::UnmuteParticipant(o) => &mut o.operation_context,
        CommandOptions::MuteAllParticipants(o) => &mut o.operation_context,
        CommandOptions::UnmuteAllParticipants(o) => &mut o.operation_context,
    };
    *slot = Some(context.0.clone());
}

fn build_command(options: &CommandOptions, operation_context: &OperationContext) -> CallCommand {
    let operation_context = operation_context.clone();
    match options {
        CommandOptions::HangUp(HangUpOptions { for_everyone, .. }) => CallCommand::HangUp(HangUpRequest {
            for_everyone: *for_everyone,
            operation_context,
        }),
        CommandOptions::TransferToParticipant(o) => transfer_request(o, operation_context),
        CommandOptions::AddParticipants(o) => add_request(o, operation_context),
        CommandOptions::RemoveParticipants(RemoveParticipantsOptions {
            participants_to_remove, ..
        }) => CallCommand::RemoveParticipants(RemoveParticipantsRequest {
            participants_to_remove: participants_to_remove.clone(),
            operation_context,
        }),
        CommandOptions::MuteParticipant(o) => CallCommand::MuteParticipant(mute_request(o, operation_context)),
        CommandOptions::UnmuteParticipant(o) => CallCommand::UnmuteParticipant(mute_request(o, operation_context)),
        CommandOptions::MuteAllParticipants(MuteAllParticipantsOptions { request_initiator, .. }) => {
            CallCommand::MuteAllParticipants(MuteAllParticipantsRequest {
                request_initiator: request_initiator.clone(),
                operation_context,
            })
        }
        CommandOptions::UnmuteAllParticipants(UnmuteAllParticipantsOptions { .. }) => {
            CallCommand::UnmuteAllParticipants(UnmuteAllParticipantsRequest { operation_context })
        }
    }
}

fn transfer_request(o: &TransferToParticipantOptions, operation_context: OperationContext) -> CallCommand {
    let custom_calling_context = if o.custom_sip_headers.is_empty() && o.custom_voip_headers.is_empty() {
        None
    } else {
        Some(CustomCallingContext {
            sip_headers: o.custom_sip_headers.clone(),
            voip_headers: o.custom_voip_headers.clone(),
        })
    };
    CallCommand::TransferToParticipant(TransferToParticipantRequest {
        target_participant: o.target_participant.clone(),
        transferee: o.transferee.clone(),
        transferee_caller_id: o.source_caller_id.as_ref().map(CallerIdModel::from),
        user_to_user_information: o.user_to_user_information.clone(),
        operation_context,
        custom_calling_context,
    })
}

fn add_request(o: &AddParticipantsOptions, operation_context: OperationContext) -> CallCommand {
    CallCommand::AddParticipants(AddParticipantsRequest {
        participants_to_add: o.participants_to_add.clone(),
        source_caller_id_number: o.source_caller_id.as_ref().map(CallerIdModel::from),
        source_display_name: o.source_display_name.clone(),
        source_identifier: o.source_identifier.clone(),
        invitation_timeout_in_seconds: o.invitation_timeout_secs,
        operation_context,
    })
}

fn mute_request(o: &ParticipantMuteOptions, operation_context: OperationContext) -> ParticipantMuteRequest {
    ParticipantMuteRequest {
        target_participants: vec![o.target_participant.clone()],
        operation_context,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repeatability::RepeatabilityHeaders;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn builder() -> RequestBuilder {
        RequestBuilder::new(&CallAutomationConfig::default().with_string_max_length(40))
    }

    #[test]
    fn test_transfer_to_pstn_requires_caller_id() {
        let mut options: CommandOptions =
            TransferToParticipantOptions::new(CommunicationIdentifier::phone_number("+15550100")).into();
        let err = builder().prepare(&mut options).unwrap_err();
        assert!(matches!(err, CallAutomationError::Argument { field: "source_caller_id" }));

        // Nothing was stamped on failure.
        if let CommandOptions::TransferToParticipant(o) = &options {
            assert!(o.operation_context.is_none());
            assert!(o.repeatability_headers.is_empty());
        }
    }

    #[test]
    fn test_add_participants_validation_order() {
        let mut empty: CommandOptions = AddParticipantsOptions::new(vec![]).into();
        assert!(matches!(
            builder().prepare(&mut empty),
            Err(CallAutomationError::Argument { field: "participants_to_add" })
        ));

        let mut mixed: CommandOptions = AddParticipantsOptions::new(vec![
            CommunicationIdentifier::communication_user("8:acs:a"),
            CommunicationIdentifier::phone_number("+15550101"),
        ])
        .into();
        assert!(matches!(
            builder().prepare(&mut mixed),
            Err(CallAutomationError::Argument { field: "source_caller_id" })
        ));
    }

    #[test]
    fn test_invitation_timeout_range_is_inclusive() {
        let prepare = |secs| {
            let mut options: CommandOptions =
                AddParticipantsOptions::new(vec![CommunicationIdentifier::communication_user("8:acs:a")])
                    .with_invitation_timeout_secs(secs)
                    .into();
            builder().prepare(&mut options)
        };
        assert!(prepare(0).is_ok());
        assert!(prepare(180).is_ok());
        assert!(matches!(
            prepare(181),
            Err(CallAutomationError::Validation { field: "invitation_timeout_secs", .. })
        ));
    }

    #[test]
    fn test_user_to_user_information_limit() {
        let prepare = |uui: &str| {
            let mut options: CommandOptions =
                TransferToParticipantOptions::new(CommunicationIdentifier::communication_user("8:acs:b"))
                    .with_user_to_user_information(uui)
                    .into();
            builder().prepare(&mut options)
        };
        assert!(prepare(&"u".repeat(40)).is_ok());
        assert!(matches!(
            prepare(&"u".repeat(41)),
            Err(CallAutomationError::Validation { field: "user_to_user_information", .. })
        ));
    }

    #[test]
    fn test_prepare_twice_is_one_attempt() {
        let mut options: CommandOptions =
            RemoveParticipantsOptions::new(vec![CommunicationIdentifier::communication_user("8:acs:c")]).into();
        let first = builder().prepare(&mut options).unwrap();
        let second = builder().prepare(&mut options).unwrap();

        assert_eq!(first.operation_context, second.operation_context);
        assert_eq!(first.repeatability, second.repeatability);
        assert_eq!(first, second);
    }

    #[test]
    fn test_reprepare_at_smallest_valid_limit() {
        let config = CallAutomationConfig::default().with_string_max_length(context::GENERATED_CONTEXT_LENGTH);
        assert!(config.validate().is_ok());
        let builder = RequestBuilder::new(&config);

        let mut options: CommandOptions = UnmuteAllParticipantsOptions::new().into();
        let first = builder.prepare(&mut options).unwrap();
        let second = builder.prepare(&mut options).unwrap();

        assert_eq!(first.operation_context.as_str().chars().count(), context::GENERATED_CONTEXT_LENGTH);
        assert_eq!(first, second);
    }

    #[test]
    fn test_supplied_context_and_token_are_kept() {
        let id = Uuid::new_v4();
        let sent = Utc::now();
        let mut options: CommandOptions = MuteAllParticipantsOptions::new()
            .with_operation_context("chain-1")
            .with_repeatability_headers(RepeatabilityHeaders::with_values(id, sent))
            .into();

        let prepared = builder().prepare(&mut options).unwrap();
        assert_eq!(prepared.operation_context.as_str(), "chain-1");
        let token = prepared.repeatability.unwrap();
        assert_eq!(token.request_id, id);
        assert_eq!(token.first_sent, sent);
    }

    #[test]
    fn test_hang_up_for_self_has_no_repeatability() {
        let mut leave: CommandOptions = HangUpOptions::new(false).into();
        let mut terminate: CommandOptions = HangUpOptions::new(true).into();

        assert!(builder().prepare(&mut leave).unwrap().repeatability.is_none());
        assert!(builder().prepare(&mut terminate).unwrap().repeatability.is_some());
    }

    #[test]
    fn test_terminate_carries_operation_context() {
        let mut terminate: CommandOptions = HangUpOptions::new(true).with_operation_context("end-all").into();
        let prepared = builder().prepare(&mut terminate).unwrap();
        assert_eq!(prepared.command.body().unwrap(), Some(json!({ "operationContext": "end-all" })));

        let mut leave: CommandOptions = HangUpOptions::new(false).with_operation_context("leave").into();
        let prepared = builder().prepare(&mut leave).unwrap();
        assert_eq!(prepared.command.body().unwrap(), None);
        assert_eq!(prepared.command.http_route(&CallConnectionId::new("c1")).0, "DELETE");
    }

    #[test]
    fn test_transfer_body_shape() {
        let mut options: CommandOptions =
            TransferToParticipantOptions::new(CommunicationIdentifier::phone_number("+15550102"))
                .with_source_caller_id(PhoneNumberIdentifier::new("+15550199"))
                .with_operation_context("ctx")
                .with_sip_header("X-MS-Custom-Tag", "blue")
                .into();
        let prepared = builder().prepare(&mut options).unwrap();
        let body = prepared.command.body().unwrap().unwrap();

        assert_eq!(
            body,
            json!({
                "targetParticipant": {
                    "rawId": "4:+15550102",
                    "kind": "phoneNumber",
                    "phoneNumber": { "value": "+15550102" }
                },
                "transfereeCallerId": { "value": "+15550199" },
                "operationContext": "ctx",
                "customCallingContext": { "sipHeaders": { "X-MS-Custom-Tag": "blue" } }
            })
        );

        let (method, path) = prepared.command.http_route(&CallConnectionId::new("c1"));
        assert_eq!(method, "POST");
        assert_eq!(path, "/calling/callConnections/c1:transferToParticipant");
    }
}
