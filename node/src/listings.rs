//! Listing and listing-photo records.

use hamrokotha_fraud_core::{ContentDigest, FlagState};
use hamrokotha_messaging::{now_ms, PropertyId, UserId};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for an uploaded listing photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub Uuid);

impl ImageId {
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

impl Default for ImageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ImageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Where a listing stands in moderation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    Pending,
    Approved,
    Rejected,
}

/// Fraud-relevant view of a rental listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub id: PropertyId,
    pub owner: UserId,
    pub title: String,
    pub created_ms: i64,
    pub status: ListingStatus,
    pub rejection_reason: Option<String>,
    pub flags: FlagState,
}

impl PropertyRecord {
    /// A listing that is public straight away.
    pub fn new(owner: UserId, title: impl Into<String>) -> Self {
        Self {
            id: PropertyId::new(),
            owner,
            title: title.into(),
            created_ms: now_ms(),
            status: ListingStatus::Approved,
            rejection_reason: None,
            flags: FlagState::default(),
        }
    }

    /// Holds the listing back until a moderator approves it.
    pub fn awaiting_approval(mut self) -> Self {
        self.status = ListingStatus::Pending;
        self
    }

    /// Applies a moderator decision. Approving clears any earlier rejection reason.
    pub fn review(&mut self, approve: bool, reason: Option<String>) {
        if approve {
            self.status = ListingStatus::Approved;
            self.rejection_reason = None;
        } else {
            self.status = ListingStatus::Rejected;
            self.rejection_reason = reason.filter(|r| !r.trim().is_empty());
        }
    }

    /// Approved listings are public; others are only shown to their owner and moderators.
    pub fn is_visible_to(&self, user: Option<UserId>, moderator: bool) -> bool {
        self.status == ListingStatus::Approved || moderator || user == Some(self.owner)
    }
}

/// Image metadata as persisted. The primary marker lives in its own per-listing slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredImage {
    pub id: ImageId,
    pub property_id: PropertyId,
    pub file_name: String,
    pub path: String,
    pub caption: String,
    pub order: u16,
    pub size_bytes: u64,
    pub uploaded_ms: i64,
    pub digest: Option<ContentDigest>,
}

impl StoredImage {
    pub fn into_record(self, is_primary: bool) -> ImageRecord {
        ImageRecord {
            id: self.id,
            property_id: self.property_id,
            file_name: self.file_name,
            path: self.path,
            caption: self.caption,
            order: self.order,
            size_bytes: self.size_bytes,
            uploaded_ms: self.uploaded_ms,
            digest: self.digest,
            is_primary,
        }
    }
}

/// A listing photo as handed back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub property_id: PropertyId,
    pub file_name: String,
    pub path: String,
    pub caption: String,
    pub order: u16,
    pub size_bytes: u64,
    pub uploaded_ms: i64,
    #[serde(serialize_with = "digest_as_hex")]
    pub digest: Option<ContentDigest>,
    pub is_primary: bool,
}

fn digest_as_hex<S: Serializer>(
    digest: &Option<ContentDigest>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match digest {
        Some(digest) => serializer.collect_str(digest),
        None => serializer.serialize_none(),
    }
}

/// Raw upload handed over by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct ImageUpload {
    pub file_name: String,
    pub caption: String,
    pub is_primary: bool,
    pub order: u16,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
            ..Self::default()
        }
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }
}

/// Primary photo if one is marked, otherwise the first in display order.
pub fn primary_image(images: &[ImageRecord]) -> Option<&ImageRecord> {
    images
        .iter()
        .find(|image| image.is_primary)
        .or_else(|| images.iter().min_by_key(|image| (image.order, image.uploaded_ms)))
}
