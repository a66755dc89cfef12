//! Conversation bookkeeping behind chat rooms and inquiry threads.
//!
//! The tracker keeps the message log of each two-party conversation and the
//! per-user unread counts the UI polls for.

mod tracker;

pub use tracker::{ConversationSummary, MessageTracker};
