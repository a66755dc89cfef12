//! Reports users file against listings, other users or inquiry threads.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest free-text description accepted with a report.
pub const MAX_DESCRIPTION_LEN: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportReason {
    Spam,
    Fraud,
    Inappropriate,
    Duplicate,
    Other,
}

/// Review state of a report. `Resolved` and `Dismissed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Pending,
    Reviewed,
    Resolved,
    Dismissed,
}

impl ReportStatus {
    pub fn is_final(self) -> bool {
        matches!(self, ReportStatus::Resolved | ReportStatus::Dismissed)
    }

    /// Moves a report forward. Reports never go back to pending and a final
    /// decision is not revisited.
    pub fn review(self, next: ReportStatus) -> Result<ReportStatus, ReportError> {
        if self.is_final() || next == ReportStatus::Pending || next == self {
            return Err(ReportError::InvalidTransition {
                from: self,
                to: next,
            });
        }
        Ok(next)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReportStatus::Pending => "PENDING",
            ReportStatus::Reviewed => "REVIEWED",
            ReportStatus::Resolved => "RESOLVED",
            ReportStatus::Dismissed => "DISMISSED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    #[error("report cannot move from {from} to {to}")]
    InvalidTransition { from: ReportStatus, to: ReportStatus },

    #[error("report description exceeds {MAX_DESCRIPTION_LEN} characters")]
    DescriptionTooLong,
}

/// Trims a report description and enforces the length limit.
pub fn validate_description(description: &str) -> Result<String, ReportError> {
    let trimmed = description.trim();
    if trimmed.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ReportError::DescriptionTooLong);
    }
    Ok(trimmed.to_string())
}
