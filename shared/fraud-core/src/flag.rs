//! Moderation flag bookkeeping for a single listing.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Fraud flag fields carried by every listing.
///
/// Flags only accumulate here. Clearing a flag is a moderator action handled
/// outside this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagState {
    pub flagged: bool,
    pub flag_count: u32,
    /// One line per flag, oldest first.
    pub fraud_reason: Option<String>,
    pub last_flagged_ms: Option<i64>,
}

impl FlagState {
    /// Records a new flag with a human readable reason.
    pub fn flag(&mut self, reason: &str, now_ms: i64) {
        self.flagged = true;
        self.flag_count = self.flag_count.saturating_add(1);
        match self.fraud_reason.as_mut() {
            Some(log) if !log.is_empty() => {
                log.push('\n');
                log.push_str(reason);
            }
            _ => self.fraud_reason = Some(reason.to_string()),
        }
        self.last_flagged_ms = Some(now_ms);
    }
}

/// Same-owner duplicates are a landlord reusing a photo, not a fraud signal.
pub fn is_cross_owner<T: PartialEq>(current_owner: &T, matched_owner: &T) -> bool {
    current_owner != matched_owner
}

/// Reason line appended to a listing that shares a photo with `counterpart`.
pub fn duplicate_image_reason(
    image: impl Display,
    counterpart_title: &str,
    counterpart: impl Display,
    counterpart_owner: impl Display,
) -> String {
    format!(
        "Duplicate image detected: matches image {image} on property \"{counterpart_title}\" ({counterpart}) owned by user {counterpart_owner}"
    )
}
