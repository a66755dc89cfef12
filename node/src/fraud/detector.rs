//! Image persistence with a follow-up duplicate scan.

use std::io::Read;
use std::sync::Arc;

use anyhow::Context;
use hamrokotha_fraud_core::{duplicate_image_reason, is_cross_owner, ContentDigest};
use hamrokotha_messaging::{now_ms, PropertyId};
use tracing::{debug, info, warn};

use crate::config::FraudConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::listings::{ImageId, ImageRecord, ImageUpload, PropertyRecord, StoredImage};
use crate::media::{file_extension, MediaStore};
use crate::storage::NodeStorage;

/// Tally of one duplicate scan.
#[derive(Debug, Default)]
struct DuplicateScan {
    matches: usize,
    cross_owner: usize,
    flags_applied: usize,
}

/// Stores listing photos and flags listings that share a photo across owners.
#[derive(Clone)]
pub struct FraudDetector {
    storage: NodeStorage,
    media: Arc<dyn MediaStore>,
    config: FraudConfig,
}

impl FraudDetector {
    pub fn new(storage: NodeStorage, media: Arc<dyn MediaStore>, config: FraudConfig) -> Self {
        Self {
            storage,
            media,
            config,
        }
    }

    /// Stores an uploaded photo for `property_id`, then looks for the same
    /// bytes on other listings.
    ///
    /// Only the write itself can fail. A photo that cannot be hashed is kept
    /// without a digest, and any problem while scanning or flagging is logged
    /// and dropped.
    pub fn persist_image(
        &self,
        property_id: PropertyId,
        upload: ImageUpload,
    ) -> ServiceResult<ImageRecord> {
        let property = self
            .storage
            .property(property_id)?
            .ok_or(ServiceError::NotFound("property"))?;

        let id = ImageId::new();
        let path = match file_extension(&upload.file_name) {
            Some(ext) => format!("properties/{property_id}/{id}.{ext}"),
            None => format!("properties/{property_id}/{id}"),
        };
        self.media
            .save(&path, &upload.bytes)
            .context("failed to store image")?;
        let digest = self.digest(&path);

        let stored = StoredImage {
            id,
            property_id,
            file_name: upload.file_name,
            path,
            caption: upload.caption,
            order: upload.order,
            size_bytes: upload.bytes.len() as u64,
            uploaded_ms: now_ms(),
            digest,
        };
        match self.storage.insert_image(&stored, upload.is_primary) {
            Ok(true) => {}
            Ok(false) => {
                self.discard_blob(&stored.path);
                return Err(ServiceError::NotFound("property"));
            }
            Err(e) => {
                self.discard_blob(&stored.path);
                return Err(e.into());
            }
        }
        info!(
            %property_id,
            image = %id,
            primary = upload.is_primary,
            hashed = digest.is_some(),
            "stored listing image"
        );

        match digest {
            Some(_) if upload.bytes.is_empty() && !self.config.scan_empty_images => {
                debug!(image = %id, "empty upload, skipping duplicate scan");
            }
            Some(digest) => {
                let scan = self.scan_duplicates(&property, id, &digest);
                if scan.cross_owner > 0 {
                    warn!(
                        %property_id,
                        image = %id,
                        matches = scan.matches,
                        cross_owner = scan.cross_owner,
                        flags_applied = scan.flags_applied,
                        "duplicate listing photo across owners"
                    );
                }
            }
            None => {}
        }

        Ok(stored.into_record(upload.is_primary))
    }

    /// Photos of a listing in display order.
    pub fn images(&self, property_id: PropertyId) -> ServiceResult<Vec<ImageRecord>> {
        if self.storage.property(property_id)?.is_none() {
            return Err(ServiceError::NotFound("property"));
        }
        Ok(self.storage.images_for_property(property_id)?)
    }

    pub fn set_primary_image(&self, property_id: PropertyId, image: ImageId) -> ServiceResult<()> {
        if !self.storage.set_primary_image(property_id, image)? {
            return Err(ServiceError::NotFound("image"));
        }
        debug!(%property_id, %image, "primary image changed");
        Ok(())
    }

    /// Deletes a listing and its photos. Blob removal is best effort.
    pub fn remove_property(&self, property_id: PropertyId) -> ServiceResult<PropertyRecord> {
        let (property, images) = self
            .storage
            .remove_property(property_id)?
            .ok_or(ServiceError::NotFound("property"))?;
        for image in &images {
            self.discard_blob(&image.path);
        }
        info!(%property_id, images = images.len(), "listing removed");
        Ok(property)
    }

    /// Reads a stored photo back, returning its record and bytes.
    pub fn image_content(&self, image: ImageId) -> ServiceResult<(ImageRecord, Vec<u8>)> {
        let record = self
            .storage
            .image(image)?
            .ok_or(ServiceError::NotFound("image"))?;
        let mut bytes = Vec::with_capacity(record.size_bytes as usize);
        self.media
            .open(&record.path)
            .and_then(|mut reader| reader.read_to_end(&mut bytes))
            .with_context(|| format!("failed to read image {image}"))?;
        Ok((record, bytes))
    }

    fn discard_blob(&self, path: &str) {
        if let Err(e) = self.media.remove(path) {
            warn!(path, error = %e, "could not remove image blob");
        }
    }

    fn digest(&self, path: &str) -> Option<ContentDigest> {
        match self.media.open(path).and_then(ContentDigest::from_reader) {
            Ok(digest) => Some(digest),
            Err(e) => {
                warn!(path, error = %e, "could not hash image, storing it without a digest");
                None
            }
        }
    }

    fn scan_duplicates(
        &self,
        property: &PropertyRecord,
        image: ImageId,
        digest: &ContentDigest,
    ) -> DuplicateScan {
        let mut scan = DuplicateScan::default();
        let matches = match self.storage.images_with_digest(digest) {
            Ok(matches) => matches,
            Err(e) => {
                warn!(%digest, error = %e, "duplicate lookup failed");
                return scan;
            }
        };

        let now = now_ms();
        for (other_image, other_property_id) in matches {
            if other_image == image {
                continue;
            }
            scan.matches += 1;

            let other = match self.storage.property(other_property_id) {
                Ok(Some(other)) => other,
                Ok(None) => {
                    debug!(property = %other_property_id, "matched image has no listing");
                    continue;
                }
                Err(e) => {
                    warn!(property = %other_property_id, error = %e, "failed to load matched listing");
                    continue;
                }
            };
            if !is_cross_owner(&property.owner, &other.owner) {
                debug!(
                    property = %property.id,
                    matched_property = %other.id,
                    "same owner reused a photo"
                );
                continue;
            }
            scan.cross_owner += 1;

            let reason = duplicate_image_reason(other_image, &other.title, other.id, other.owner);
            if self.flag(property.id, &reason, now) {
                scan.flags_applied += 1;
            }
            let reason = duplicate_image_reason(image, &property.title, property.id, property.owner);
            if self.flag(other.id, &reason, now) {
                scan.flags_applied += 1;
            }
        }
        scan
    }

    /// Each side is flagged on its own; one failing does not stop the other.
    fn flag(&self, property: PropertyId, reason: &str, now: i64) -> bool {
        match self.storage.flag_property(property, reason, now) {
            Ok(Some(record)) => {
                info!(%property, flag_count = record.flags.flag_count, "listing flagged");
                true
            }
            Ok(None) => {
                warn!(%property, "listing disappeared before it could be flagged");
                false
            }
            Err(e) => {
                warn!(%property, error = %e, "failed to flag listing");
                false
            }
        }
    }
}
