//! Fraud signals for listings.
//!
//! Every stored photo is fingerprinted. When the same bytes show up on
//! listings owned by two different landlords, both listings are flagged for
//! moderator review. Users can also file reports against listings, other
//! users and inquiry threads, which moderators work through.

mod detector;
mod reports;

pub use detector::FraudDetector;
pub use reports::{ReportDesk, ReportId, ReportRecord, ReportTarget};
