use anyhow::Result;
use hamrokotha_fraud_core::ContentDigest;
use hamrokotha_messaging::PropertyId;
use sled::transaction::ConflictableTransactionResult;
use sled::Transactional;

use super::{decode, encode, keys, tx_error, NodeStorage};
use crate::listings::{ImageId, ImageRecord, PropertyRecord, StoredImage};

type TxResult<T> = ConflictableTransactionResult<T, anyhow::Error>;

impl NodeStorage {
    pub fn insert_property(&self, property: &PropertyRecord) -> Result<()> {
        let tree = self.tree(Self::PROPERTIES)?;
        tree.insert(property.id.as_bytes(), encode(property)?)?;
        tree.flush()?;
        Ok(())
    }

    pub fn property(&self, id: PropertyId) -> Result<Option<PropertyRecord>> {
        let tree = self.tree(Self::PROPERTIES)?;
        tree.get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Read-modify-write of a single listing. Returns the updated record, or
    /// `None` if the listing no longer exists.
    pub fn update_property(
        &self,
        id: PropertyId,
        mut apply: impl FnMut(&mut PropertyRecord),
    ) -> Result<Option<PropertyRecord>> {
        let tree = self.tree(Self::PROPERTIES)?;
        let key = id.as_bytes();
        loop {
            let Some(current) = tree.get(key)? else {
                return Ok(None);
            };
            let mut record: PropertyRecord = decode(&current)?;
            apply(&mut record);
            let encoded = encode(&record)?;
            // Retry if another writer got in between the read and the swap.
            if tree
                .compare_and_swap(key, Some(&current), Some(encoded))?
                .is_ok()
            {
                tree.flush()?;
                return Ok(Some(record));
            }
        }
    }

    /// Applies one flag to a listing as a single-row update.
    pub fn flag_property(
        &self,
        id: PropertyId,
        reason: &str,
        now_ms: i64,
    ) -> Result<Option<PropertyRecord>> {
        self.update_property(id, |record| record.flags.flag(reason, now_ms))
    }

    /// Deletes a listing together with its photos and their index entries.
    /// The removed photos are returned so their blobs can be cleaned up.
    pub(crate) fn remove_property(
        &self,
        id: PropertyId,
    ) -> Result<Option<(PropertyRecord, Vec<StoredImage>)>> {
        let properties = self.tree(Self::PROPERTIES)?;
        let images = self.tree(Self::IMAGES)?;
        let property_images = self.tree(Self::PROPERTY_IMAGES)?;
        let digests = self.tree(Self::IMAGE_DIGESTS)?;
        let primary = self.tree(Self::PRIMARY_IMAGES)?;

        let Some(property) = self.property(id)? else {
            return Ok(None);
        };
        let mut stored = Vec::new();
        for entry in property_images.scan_prefix(id.as_bytes()).keys() {
            let key = entry?;
            let Some(image_id) = keys::image_from_property_key(&key) else {
                continue;
            };
            if let Some(bytes) = images.get(image_id.as_bytes())? {
                stored.push(decode::<StoredImage>(&bytes)?);
            }
        }

        (&properties, &images, &property_images, &digests, &primary)
            .transaction(|(properties, images, property_images, digests, primary)| -> TxResult<()> {
                properties.remove(&id.as_bytes()[..])?;
                primary.remove(&id.as_bytes()[..])?;
                for image in &stored {
                    images.remove(&image.id.as_bytes()[..])?;
                    property_images.remove(keys::property_image(&id, &image.id))?;
                    if let Some(digest) = &image.digest {
                        digests.remove(keys::image_digest(digest, &image.id))?;
                    }
                }
                Ok(())
            })
            .map_err(tx_error)?;
        properties.flush()?;
        Ok(Some((property, stored)))
    }

    /// Writes an image and all of its index entries atomically. When
    /// `make_primary` is set the listing's primary slot is pointed at it in
    /// the same transaction, replacing whichever image held it before.
    /// Returns `false`, writing nothing, if the listing no longer exists.
    pub(crate) fn insert_image(&self, image: &StoredImage, make_primary: bool) -> Result<bool> {
        let properties = self.tree(Self::PROPERTIES)?;
        let images = self.tree(Self::IMAGES)?;
        let property_images = self.tree(Self::PROPERTY_IMAGES)?;
        let digests = self.tree(Self::IMAGE_DIGESTS)?;
        let primary = self.tree(Self::PRIMARY_IMAGES)?;

        let encoded = encode(image)?;
        let property_key = image.property_id.as_bytes();
        let link_key = keys::property_image(&image.property_id, &image.id);
        let digest_key = image
            .digest
            .as_ref()
            .map(|digest| keys::image_digest(digest, &image.id));

        let inserted = (&properties, &images, &property_images, &digests, &primary)
            .transaction(|(properties, images, property_images, digests, primary)| -> TxResult<bool> {
                if properties.get(&property_key[..])?.is_none() {
                    return Ok(false);
                }
                images.insert(&image.id.as_bytes()[..], encoded.clone())?;
                property_images.insert(&link_key[..], Vec::<u8>::new())?;
                if let Some(digest_key) = &digest_key {
                    digests.insert(&digest_key[..], &property_key[..])?;
                }
                if make_primary {
                    primary.insert(&property_key[..], &image.id.as_bytes()[..])?;
                }
                Ok(true)
            })
            .map_err(tx_error)?;
        if inserted {
            images.flush()?;
        }
        Ok(inserted)
    }

    /// Overwrites a listing row with bytes that no longer decode.
    #[cfg(test)]
    pub(crate) fn corrupt_property(&self, id: PropertyId) -> Result<()> {
        self.tree(Self::PROPERTIES)?
            .insert(id.as_bytes(), &b"not a listing"[..])?;
        Ok(())
    }

    pub fn image(&self, id: ImageId) -> Result<Option<ImageRecord>> {
        let images = self.tree(Self::IMAGES)?;
        let Some(bytes) = images.get(id.as_bytes())? else {
            return Ok(None);
        };
        let stored: StoredImage = decode(&bytes)?;
        let is_primary = self.primary_image_id(stored.property_id)? == Some(stored.id);
        Ok(Some(stored.into_record(is_primary)))
    }

    /// Photos of a listing in display order (`order`, then upload time).
    pub fn images_for_property(&self, property: PropertyId) -> Result<Vec<ImageRecord>> {
        let images = self.tree(Self::IMAGES)?;
        let property_images = self.tree(Self::PROPERTY_IMAGES)?;
        let primary = self.primary_image_id(property)?;

        let mut records = Vec::new();
        for entry in property_images.scan_prefix(property.as_bytes()).keys() {
            let key = entry?;
            let Some(image_id) = keys::image_from_property_key(&key) else {
                continue;
            };
            if let Some(bytes) = images.get(image_id.as_bytes())? {
                let stored: StoredImage = decode(&bytes)?;
                records.push(stored.into_record(primary == Some(image_id)));
            }
        }
        records.sort_by_key(|image| (image.order, image.uploaded_ms));
        Ok(records)
    }

    pub fn primary_image_id(&self, property: PropertyId) -> Result<Option<ImageId>> {
        let primary = self.tree(Self::PRIMARY_IMAGES)?;
        Ok(primary
            .get(property.as_bytes())?
            .and_then(|bytes| ImageId::from_slice(&bytes)))
    }

    /// Moves the primary slot to an existing image of the listing. Returns
    /// `false` when the image does not belong to it.
    pub fn set_primary_image(&self, property: PropertyId, image: ImageId) -> Result<bool> {
        let property_images = self.tree(Self::PROPERTY_IMAGES)?;
        if !property_images.contains_key(keys::property_image(&property, &image))? {
            return Ok(false);
        }
        let primary = self.tree(Self::PRIMARY_IMAGES)?;
        primary.insert(property.as_bytes(), &image.as_bytes()[..])?;
        primary.flush()?;
        Ok(true)
    }

    /// Every stored image carrying `digest`, with the listing it belongs to.
    pub fn images_with_digest(&self, digest: &ContentDigest) -> Result<Vec<(ImageId, PropertyId)>> {
        let digests = self.tree(Self::IMAGE_DIGESTS)?;
        let mut matches = Vec::new();
        for entry in digests.scan_prefix(digest.as_bytes()) {
            let (key, value) = entry?;
            let (Some(image), Some(property)) = (
                keys::image_from_digest_key(&key),
                PropertyId::from_slice(&value),
            ) else {
                continue;
            };
            matches.push((image, property));
        }
        Ok(matches)
    }
}
