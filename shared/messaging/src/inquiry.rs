//! Inquiry thread lifecycle.
//!
//! An inquiry is a conversation a tenant opens with the owner of a listing.
//! Besides the usual message log it carries a status the owner works through.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::MessagingError;

/// Status of an inquiry thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InquiryStatus {
    /// Waiting for the listing owner to answer
    Pending,
    /// The owner has replied at least once
    Responded,
    /// Closed by the owner
    Closed,
}

impl InquiryStatus {
    /// Status after a new message. Only an owner reply moves a pending inquiry.
    pub fn after_message(self, from_owner: bool) -> Self {
        match self {
            InquiryStatus::Pending if from_owner => InquiryStatus::Responded,
            other => other,
        }
    }

    /// Close the inquiry. Closing twice is rejected so callers notice stale views.
    pub fn close(self) -> Result<Self, MessagingError> {
        match self {
            InquiryStatus::Closed => Err(MessagingError::InvalidTransition {
                from: self,
                to: InquiryStatus::Closed,
            }),
            _ => Ok(InquiryStatus::Closed),
        }
    }

    /// Reopen a closed inquiry; it resumes as responded.
    pub fn reopen(self) -> Result<Self, MessagingError> {
        match self {
            InquiryStatus::Closed => Ok(InquiryStatus::Responded),
            _ => Err(MessagingError::InvalidTransition {
                from: self,
                to: InquiryStatus::Responded,
            }),
        }
    }

    /// Check if this inquiry still expects activity
    pub fn is_open(&self) -> bool {
        *self != InquiryStatus::Closed
    }
}

impl fmt::Display for InquiryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InquiryStatus::Pending => "PENDING",
            InquiryStatus::Responded => "RESPONDED",
            InquiryStatus::Closed => "CLOSED",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inquiry_lifecycle() {
        let status = InquiryStatus::Pending;

        let status = status.after_message(false);
        assert_eq!(status, InquiryStatus::Pending);

        let status = status.after_message(true);
        assert_eq!(status, InquiryStatus::Responded);

        let status = status.close().unwrap();
        assert!(!status.is_open());

        let status = status.reopen().unwrap();
        assert_eq!(status, InquiryStatus::Responded);
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(InquiryStatus::Closed.close().is_err());
        assert!(InquiryStatus::Pending.reopen().is_err());
        assert_eq!(
            InquiryStatus::Closed.after_message(true),
            InquiryStatus::Closed
        );
    }

    #[test]
    fn test_status_serializes_upper_case() {
        let json = serde_json::to_string(&InquiryStatus::Responded).unwrap();
        assert_eq!(json, "\"RESPONDED\"");
        assert_eq!(InquiryStatus::Pending.to_string(), "PENDING");
    }
}
