//! Report intake and the moderator queue.

use hamrokotha_fraud_core::report::validate_description;
use hamrokotha_fraud_core::{ReportError, ReportReason, ReportStatus};
use hamrokotha_messaging::{now_ms, ConversationId, MessagingError, PropertyId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::storage::NodeStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(pub Uuid);

impl ReportId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        Uuid::from_slice(bytes).ok().map(Self)
    }
}

impl Default for ReportId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a report is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportTarget {
    Property(PropertyId),
    User(UserId),
    Conversation(ConversationId),
}

impl ReportTarget {
    /// `kind tag | id`, the prefix of this target's entries in the report index.
    pub fn key(&self) -> Vec<u8> {
        let (tag, id) = match self {
            ReportTarget::Property(id) => (b'p', id.as_bytes()),
            ReportTarget::User(id) => (b'u', id.as_bytes()),
            ReportTarget::Conversation(id) => (b'c', id.as_bytes()),
        };
        let mut key = Vec::with_capacity(1 + id.len());
        key.push(tag);
        key.extend_from_slice(id);
        key
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: ReportId,
    pub reported_by: UserId,
    pub target: ReportTarget,
    pub reason: ReportReason,
    pub description: String,
    pub status: ReportStatus,
    pub reviewed_by: Option<UserId>,
    pub admin_notes: String,
    pub created_ms: i64,
    pub resolved_ms: Option<i64>,
}

impl ReportRecord {
    pub fn new(
        reported_by: UserId,
        target: ReportTarget,
        reason: ReportReason,
        description: &str,
    ) -> Result<Self, ReportError> {
        Ok(Self {
            id: ReportId::new(),
            reported_by,
            target,
            reason,
            description: validate_description(description)?,
            status: ReportStatus::Pending,
            reviewed_by: None,
            admin_notes: String::new(),
            created_ms: now_ms(),
            resolved_ms: None,
        })
    }

    /// Records a moderator decision. A final decision stamps `resolved_ms`.
    pub fn review(
        &mut self,
        reviewer: UserId,
        next: ReportStatus,
        notes: Option<&str>,
        now_ms: i64,
    ) -> Result<ReportStatus, ReportError> {
        self.status = self.status.review(next)?;
        self.reviewed_by = Some(reviewer);
        if let Some(notes) = notes {
            self.admin_notes = notes.trim().to_string();
        }
        if self.status.is_final() {
            self.resolved_ms = Some(now_ms);
        }
        Ok(self.status)
    }
}

/// Files user reports and lets moderators work through them.
#[derive(Clone)]
pub struct ReportDesk {
    storage: NodeStorage,
}

impl ReportDesk {
    pub fn new(storage: NodeStorage) -> Self {
        Self { storage }
    }

    /// Files a report after checking the target exists and may be reported
    /// by `reporter`. A reporter has at most one open report per target.
    pub fn file_report(
        &self,
        reporter: UserId,
        target: ReportTarget,
        reason: ReportReason,
        description: &str,
    ) -> ServiceResult<ReportRecord> {
        match target {
            ReportTarget::Property(id) => {
                let property = self
                    .storage
                    .property(id)?
                    .ok_or(ServiceError::NotFound("property"))?;
                if property.owner == reporter {
                    return Err(ServiceError::BadRequest(
                        "You cannot report your own listing.".into(),
                    ));
                }
            }
            ReportTarget::User(user) => {
                if user == reporter {
                    return Err(ServiceError::BadRequest("You cannot report yourself.".into()));
                }
            }
            ReportTarget::Conversation(id) => {
                let conversation = self
                    .storage
                    .conversation(id)?
                    .ok_or(ServiceError::NotFound("conversation"))?;
                if !conversation.is_participant(reporter) {
                    return Err(MessagingError::NotParticipant.into());
                }
            }
        }

        let already_open = self
            .storage
            .reports_for(&target)?
            .iter()
            .any(|report| report.reported_by == reporter && !report.status.is_final());
        if already_open {
            return Err(ServiceError::BadRequest(
                "You have already reported this.".into(),
            ));
        }

        let report = ReportRecord::new(reporter, target, reason, description)?;
        self.storage.insert_report(&report)?;
        info!(report = %report.id, ?target, ?reason, "report filed");
        Ok(report)
    }

    pub fn report(&self, id: ReportId) -> ServiceResult<ReportRecord> {
        self.storage
            .report(id)?
            .ok_or(ServiceError::NotFound("report"))
    }

    /// Reports against `target`, newest first.
    pub fn reports_for(&self, target: ReportTarget) -> ServiceResult<Vec<ReportRecord>> {
        Ok(self.storage.reports_for(&target)?)
    }

    /// The moderation queue, newest first, optionally narrowed to one status.
    pub fn queue(&self, status: Option<ReportStatus>) -> ServiceResult<Vec<ReportRecord>> {
        Ok(self.storage.reports(status)?)
    }

    pub fn review(
        &self,
        id: ReportId,
        reviewer: UserId,
        next: ReportStatus,
        notes: Option<&str>,
    ) -> ServiceResult<ReportRecord> {
        let now = now_ms();
        let (report, outcome) = self
            .storage
            .update_report(id, |report| report.review(reviewer, next, notes, now))?
            .ok_or(ServiceError::NotFound("report"))?;
        let status = outcome?;
        info!(report = %id, %reviewer, %status, "report reviewed");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listings::PropertyRecord;
    use hamrokotha_messaging::ConversationKind;

    fn desk() -> (ReportDesk, NodeStorage) {
        let storage = NodeStorage::temporary().unwrap();
        (ReportDesk::new(storage.clone()), storage)
    }

    fn listing(storage: &NodeStorage, owner: UserId) -> PropertyId {
        let property = PropertyRecord::new(owner, "Room in Kirtipur");
        storage.insert_property(&property).unwrap();
        property.id
    }

    #[test]
    fn listing_reports_are_filed_and_listed() {
        let (desk, storage) = desk();
        let owner = UserId::new();
        let property = listing(&storage, owner);
        let target = ReportTarget::Property(property);

        let first = desk
            .file_report(UserId::new(), target, ReportReason::Fraud, " asks for deposit upfront ")
            .unwrap();
        assert_eq!(first.status, ReportStatus::Pending);
        assert_eq!(first.description, "asks for deposit upfront");
        let second = desk
            .file_report(UserId::new(), target, ReportReason::Duplicate, "")
            .unwrap();

        let reports = desk.reports_for(target).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().any(|r| r.id == first.id));
        assert!(reports.iter().any(|r| r.id == second.id));
        assert!(desk
            .reports_for(ReportTarget::Property(listing(&storage, owner)))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn bad_targets_are_refused() {
        let (desk, storage) = desk();
        let owner = UserId::new();
        let property = listing(&storage, owner);

        let own = desk.file_report(owner, ReportTarget::Property(property), ReportReason::Spam, "");
        assert!(matches!(own, Err(ServiceError::BadRequest(_))));

        let missing = desk.file_report(
            owner,
            ReportTarget::Property(PropertyId::new()),
            ReportReason::Spam,
            "",
        );
        assert!(matches!(missing, Err(ServiceError::NotFound("property"))));

        let me = UserId::new();
        let myself = desk.file_report(me, ReportTarget::User(me), ReportReason::Other, "");
        assert!(matches!(myself, Err(ServiceError::BadRequest(_))));

        let (conversation, _) = storage
            .get_or_create_conversation(ConversationKind::Chat, owner, me, None)
            .unwrap();
        let outsider = desk.file_report(
            UserId::new(),
            ReportTarget::Conversation(conversation.id),
            ReportReason::Inappropriate,
            "",
        );
        assert!(matches!(
            outsider,
            Err(ServiceError::Messaging(MessagingError::NotParticipant))
        ));
        desk.file_report(
            me,
            ReportTarget::Conversation(conversation.id),
            ReportReason::Inappropriate,
            "rude messages",
        )
        .unwrap();
    }

    #[test]
    fn one_open_report_per_reporter_and_target() {
        let (desk, _) = desk();
        let reporter = UserId::new();
        let target = ReportTarget::User(UserId::new());
        let report = desk
            .file_report(reporter, target, ReportReason::Spam, "")
            .unwrap();
        assert!(matches!(
            desk.file_report(reporter, target, ReportReason::Spam, ""),
            Err(ServiceError::BadRequest(_))
        ));

        desk.review(report.id, UserId::new(), ReportStatus::Dismissed, None)
            .unwrap();
        desk.file_report(reporter, target, ReportReason::Fraud, "it happened again")
            .unwrap();
    }

    #[test]
    fn review_stamps_resolution() {
        let (desk, _) = desk();
        let moderator = UserId::new();
        let report = desk
            .file_report(UserId::new(), ReportTarget::User(UserId::new()), ReportReason::Fraud, "")
            .unwrap();

        let reviewed = desk
            .review(report.id, moderator, ReportStatus::Reviewed, Some("checking"))
            .unwrap();
        assert_eq!(reviewed.reviewed_by, Some(moderator));
        assert!(reviewed.resolved_ms.is_none());
        assert_eq!(desk.queue(Some(ReportStatus::Reviewed)).unwrap().len(), 1);

        let resolved = desk
            .review(report.id, moderator, ReportStatus::Resolved, None)
            .unwrap();
        assert!(resolved.resolved_ms.is_some());
        assert_eq!(resolved.admin_notes, "checking");
        assert!(desk.queue(Some(ReportStatus::Pending)).unwrap().is_empty());

        assert!(matches!(
            desk.review(report.id, moderator, ReportStatus::Dismissed, None),
            Err(ServiceError::Report(ReportError::InvalidTransition { .. }))
        ));
        assert_eq!(desk.report(report.id).unwrap().status, ReportStatus::Resolved);
    }

    #[test]
    fn long_description_is_rejected() {
        let (desk, _) = desk();
        let long = "x".repeat(hamrokotha_fraud_core::report::MAX_DESCRIPTION_LEN + 1);
        assert!(matches!(
            desk.file_report(UserId::new(), ReportTarget::User(UserId::new()), ReportReason::Other, &long),
            Err(ServiceError::Report(ReportError::DescriptionTooLong))
        ));
    }
}
