//! Participant identities
//!
//! A participant is addressed by a [`CommunicationIdentifier`]. Phone-number
//! targets matter to the request builder: any command that dials out to the
//! public telephone network has to carry a caller id.
//!
//! On the wire an identifier travels as a model object with a `rawId`, a
//! `kind` discriminator and one kind-specific sub-object. The raw id alone is
//! enough to recover the identifier, which is how events usually name
//! participants.

use std::fmt;

use serde::{Deserialize, Serialize};

const PHONE_NUMBER_PREFIX: &str = "4:";
const TEAMS_ANONYMOUS_PREFIX: &str = "8:teamsvisitor:";
const TEAMS_PUBLIC_PREFIX: &str = "8:orgid:";
const TEAMS_DOD_PREFIX: &str = "8:dod:";
const TEAMS_GCCH_PREFIX: &str = "8:gcch:";
const ACS_USER_PREFIXES: &[&str] = &["8:acs:", "8:spool:", "8:dod-acs:", "8:gcch-acs:"];

/// Sovereign cloud a Teams user belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamsCloud {
    #[default]
    Public,
    Dod,
    Gcch,
}

/// A PSTN phone number in E.164 form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneNumberIdentifier {
    pub phone_number: String,
}

impl PhoneNumberIdentifier {
    pub fn new(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
        }
    }

    pub fn raw_id(&self) -> String {
        format!("{PHONE_NUMBER_PREFIX}{}", self.phone_number)
    }
}

/// Identity of a call participant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "CommunicationIdentifierModel", try_from = "CommunicationIdentifierModel")]
pub enum CommunicationIdentifier {
    /// A user of the communication service itself
    CommunicationUser { id: String },
    /// A phone on the public switched telephone network
    PhoneNumber(PhoneNumberIdentifier),
    /// A Microsoft Teams user
    MicrosoftTeamsUser {
        user_id: String,
        is_anonymous: bool,
        cloud: TeamsCloud,
    },
    /// Anything else, kept by raw id
    Unknown { id: String },
}

impl CommunicationIdentifier {
    pub fn communication_user(id: impl Into<String>) -> Self {
        Self::CommunicationUser { id: id.into() }
    }

    pub fn phone_number(phone_number: impl Into<String>) -> Self {
        Self::PhoneNumber(PhoneNumberIdentifier::new(phone_number))
    }

    pub fn teams_user(user_id: impl Into<String>) -> Self {
        Self::MicrosoftTeamsUser {
            user_id: user_id.into(),
            is_anonymous: false,
            cloud: TeamsCloud::Public,
        }
    }

    /// True when the target sits on the public telephone network
    pub fn is_phone_number(&self) -> bool {
        matches!(self, Self::PhoneNumber(_))
    }

    pub fn raw_id(&self) -> String {
        match self {
            Self::CommunicationUser { id } => id.clone(),
            Self::PhoneNumber(phone) => phone.raw_id(),
            Self::MicrosoftTeamsUser {
                user_id,
                is_anonymous,
                cloud,
            } => {
                let prefix = if *is_anonymous {
                    TEAMS_ANONYMOUS_PREFIX
                } else {
                    match cloud {
                        TeamsCloud::Public => TEAMS_PUBLIC_PREFIX,
                        TeamsCloud::Dod => TEAMS_DOD_PREFIX,
                        TeamsCloud::Gcch => TEAMS_GCCH_PREFIX,
                    }
                };
                format!("{prefix}{user_id}")
            }
            Self::Unknown { id } => id.clone(),
        }
    }

    /// Recover an identifier from its raw id
    pub fn from_raw_id(raw_id: &str) -> Self {
        if let Some(number) = raw_id.strip_prefix(PHONE_NUMBER_PREFIX) {
            return Self::phone_number(number);
        }
        if let Some(user_id) = raw_id.strip_prefix(TEAMS_ANONYMOUS_PREFIX) {
            return Self::MicrosoftTeamsUser {
                user_id: user_id.to_string(),
                is_anonymous: true,
                cloud: TeamsCloud::Public,
            };
        }
        for (prefix, cloud) in [
            (TEAMS_PUBLIC_PREFIX, TeamsCloud::Public),
            (TEAMS_DOD_PREFIX, TeamsCloud::Dod),
            (TEAMS_GCCH_PREFIX, TeamsCloud::Gcch),
        ] {
            if let Some(user_id) = raw_id.strip_prefix(prefix) {
                return Self::MicrosoftTeamsUser {
                    user_id: user_id.to_string(),
                    is_anonymous: false,
                    cloud,
                };
            }
        }
        if ACS_USER_PREFIXES.iter().any(|p| raw_id.starts_with(p)) {
            return Self::communication_user(raw_id);
        }
        Self::Unknown {
            id: raw_id.to_string(),
        }
    }
}

impl fmt::Display for CommunicationIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_id())
    }
}

/// Wire representation of a [`CommunicationIdentifier`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationIdentifierModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub communication_user: Option<CommunicationUserModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<PhoneNumberModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub microsoft_teams_user: Option<MicrosoftTeamsUserModel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunicationUserModel {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumberModel {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrosoftTeamsUserModel {
    pub user_id: String,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub cloud: TeamsCloud,
}

impl From<CommunicationIdentifier> for CommunicationIdentifierModel {
    fn from(identifier: CommunicationIdentifier) -> Self {
        let mut model = CommunicationIdentifierModel {
            raw_id: Some(identifier.raw_id()),
            ..Default::default()
        };
        match identifier {
            CommunicationIdentifier::CommunicationUser { id } => {
                model.kind = Some("communicationUser".to_string());
                model.communication_user = Some(CommunicationUserModel { id });
            }
            CommunicationIdentifier::PhoneNumber(phone) => {
                model.kind = Some("phoneNumber".to_string());
                model.phone_number = Some(PhoneNumberModel {
                    value: phone.phone_number,
                });
            }
            CommunicationIdentifier::MicrosoftTeamsUser {
                user_id,
                is_anonymous,
                cloud,
            } => {
                model.kind = Some("microsoftTeamsUser".to_string());
                model.microsoft_teams_user = Some(MicrosoftTeamsUserModel {
                    user_id,
                    is_anonymous,
                    cloud,
                });
            }
            CommunicationIdentifier::Unknown { .. } => {
                model.kind = Some("unknown".to_string());
            }
        }
        model
    }
}

/// Raised when a wire model names no identity at all
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyIdentifierModel;

impl fmt::Display for EmptyIdentifierModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("identifier model has no rawId and no kind-specific payload")
    }
}

impl TryFrom<CommunicationIdentifierModel> for CommunicationIdentifier {
    type Error = EmptyIdentifierModel;

    fn try_from(model: CommunicationIdentifierModel) -> Result<Self, Self::Error> {
        if let Some(user) = model.communication_user {
            return Ok(Self::CommunicationUser { id: user.id });
        }
        if let Some(phone) = model.phone_number {
            return Ok(Self::phone_number(phone.value));
        }
        if let Some(teams) = model.microsoft_teams_user {
            return Ok(Self::MicrosoftTeamsUser {
                user_id: teams.user_id,
                is_anonymous: teams.is_anonymous,
                cloud: teams.cloud,
            });
        }
        match model.raw_id {
            Some(raw_id) if !raw_id.is_empty() => Ok(Self::from_raw_id(&raw_id)),
            _ => Err(EmptyIdentifierModel),
        }
    }
}
