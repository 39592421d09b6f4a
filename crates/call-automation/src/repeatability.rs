//! Repeatable-request identity
//!
//! A command that may be retried carries a request id and the time it was
//! first sent. The service uses the pair to recognise a retry and apply the
//! command only once, so the pair must never change between attempts of the
//! same logical command.
//!
//! Callers either leave [`RepeatabilityHeaders`] empty, in which case a fresh
//! pair is generated and written back into the same headers object, or fill
//! in both halves themselves. Filling in only one half is a validation error.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::errors::{CallAutomationError, Result};

pub const REPEATABILITY_REQUEST_ID_HEADER: &str = "Repeatability-Request-ID";
pub const REPEATABILITY_FIRST_SENT_HEADER: &str = "Repeatability-First-Sent";

/// Caller-facing repeatability headers; either half may be absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepeatabilityHeaders {
    pub request_id: Option<Uuid>,
    pub first_sent: Option<DateTime<Utc>>,
}

impl RepeatabilityHeaders {
    /// Empty headers; a pair is generated on first use
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers pinned to a caller-chosen pair
    pub fn with_values(request_id: Uuid, first_sent: DateTime<Utc>) -> Self {
        Self {
            request_id: Some(request_id),
            first_sent: Some(first_sent),
        }
    }

    /// True when neither half has been set
    pub fn is_empty(&self) -> bool {
        self.request_id.is_none() && self.first_sent.is_none()
    }

    /// Both halves present with a non-nil id, or both absent
    pub fn is_valid(&self) -> bool {
        match (self.request_id, self.first_sent) {
            (None, None) => true,
            (Some(id), Some(_)) => !id.is_nil(),
            _ => false,
        }
    }

    /// Return the token for this attempt, generating one only if none was supplied.
    ///
    /// A generated pair is stored back so later calls on the same headers
    /// return the identical token.
    pub fn resolve(&mut self) -> Result<RepeatabilityToken> {
        if !self.is_valid() {
            return Err(CallAutomationError::validation(
                "repeatability_headers",
                "request id and first-sent timestamp must be supplied together",
            ));
        }
        match (self.request_id, self.first_sent) {
            (Some(request_id), Some(first_sent)) => Ok(RepeatabilityToken {
                request_id,
                first_sent,
            }),
            _ => {
                let token = RepeatabilityToken::generate();
                self.request_id = Some(token.request_id);
                self.first_sent = Some(token.first_sent);
                tracing::trace!("Generated repeatability request id {}", token.request_id);
                Ok(token)
            }
        }
    }
}

/// A fully populated repeatability pair, ready for dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RepeatabilityToken {
    pub request_id: Uuid,
    pub first_sent: DateTime<Utc>,
}

impl RepeatabilityToken {
    pub fn generate() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            // Second precision, since the header format cannot carry more.
            first_sent: truncate_to_seconds(Utc::now()),
        }
    }

    /// First-sent time in IMF-fixdate form, e.g. `Tue, 15 Nov 1994 08:12:31 GMT`
    pub fn first_sent_header(&self) -> String {
        self.first_sent.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    /// First-sent time as RFC 3339, for logs
    pub fn first_sent_rfc3339(&self) -> String {
        self.first_sent.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Header name/value pairs for the transport
    pub fn headers(&self) -> [(&'static str, String); 2] {
        [
            (REPEATABILITY_REQUEST_ID_HEADER, self.request_id.to_string()),
            (REPEATABILITY_FIRST_SENT_HEADER, self.first_sent_header()),
        ]
    }
}

fn truncate_to_seconds(time: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_generates_when_absent_and_is_stable() {
        let mut headers = RepeatabilityHeaders::new();
        let first = headers.resolve().unwrap();
        let second = headers.resolve().unwrap();

        assert_eq!(first, second);
        assert_eq!(headers.request_id, Some(first.request_id));
        assert!(!first.request_id.is_nil());
    }

    #[test]
    fn test_supplied_pair_returned_unchanged() {
        let id = Uuid::new_v4();
        let sent = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let mut headers = RepeatabilityHeaders::with_values(id, sent);

        let token = headers.resolve().unwrap();
        assert_eq!(token.request_id, id);
        assert_eq!(token.first_sent, sent);
    }

    #[test]
    fn test_half_supplied_pair_rejected() {
        let mut only_id = RepeatabilityHeaders {
            request_id: Some(Uuid::new_v4()),
            first_sent: None,
        };
        let mut only_time = RepeatabilityHeaders {
            request_id: None,
            first_sent: Some(Utc::now()),
        };

        for headers in [&mut only_id, &mut only_time] {
            let err = headers.resolve().unwrap_err();
            assert!(matches!(
                err,
                CallAutomationError::Validation { field: "repeatability_headers", .. }
            ));
        }
        // Nothing was filled in behind the caller's back.
        assert!(only_id.first_sent.is_none());
        assert!(only_time.request_id.is_none());
    }

    #[test]
    fn test_nil_request_id_rejected() {
        let mut headers = RepeatabilityHeaders::with_values(Uuid::nil(), Utc::now());
        assert!(headers.resolve().is_err());
    }

    #[test]
    fn test_first_sent_header_format() {
        let sent = Utc.with_ymd_and_hms(1994, 11, 15, 8, 12, 31).unwrap();
        let token = RepeatabilityToken {
            request_id: Uuid::new_v4(),
            first_sent: sent,
        };
        assert_eq!(token.first_sent_header(), "Tue, 15 Nov 1994 08:12:31 GMT");
        assert_eq!(token.first_sent_rfc3339(), "1994-11-15T08:12:31Z");
    }
}
