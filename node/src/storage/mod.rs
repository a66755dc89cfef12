//! Sled-backed persistence for listings, photos, conversations and reports.
//!
//! Records are bincode-encoded values keyed by their raw UUID bytes. Secondary
//! lookups (photos by digest, conversations by participant pair, unread
//! messages by recipient, reports by target) are separate trees whose keys
//! are concatenations of fixed-width segments, so prefix scans answer them
//! without decoding values.

mod conversations;
mod keys;
mod listings;
mod reports;

use std::path::Path;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};

#[derive(Clone)]
pub struct NodeStorage {
    db: sled::Db,
}

impl NodeStorage {
    const PROPERTIES: &'static str = "properties";
    const IMAGES: &'static str = "images";
    const PROPERTY_IMAGES: &'static str = "property_images";
    const PRIMARY_IMAGES: &'static str = "primary_images";
    const IMAGE_DIGESTS: &'static str = "image_digests";
    const CONVERSATIONS: &'static str = "conversations";
    const CONVERSATION_PAIRS: &'static str = "conversation_pairs";
    const USER_CONVERSATIONS: &'static str = "user_conversations";
    const MESSAGES: &'static str = "messages";
    const MESSAGE_KEYS: &'static str = "message_keys";
    const UNREAD: &'static str = "unread";
    const REPORTS: &'static str = "reports";
    const REPORT_TARGETS: &'static str = "report_targets";

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)
            .with_context(|| format!("failed to create storage directory {:?}", path))?;
        let db = sled::open(path)
            .with_context(|| format!("failed to open sled database at {:?}", path))?;
        Ok(Self { db })
    }

    /// In-memory database removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .context("failed to open temporary sled database")?;
        Ok(Self { db })
    }

    fn tree(&self, name: &str) -> Result<sled::Tree> {
        self.db
            .open_tree(name)
            .with_context(|| format!("failed to open tree {name}"))
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

/// Decode inside a transaction, aborting it on corrupt data.
fn decode_tx<T: DeserializeOwned>(
    bytes: &[u8],
) -> std::result::Result<T, ConflictableTransactionError<anyhow::Error>> {
    bincode::deserialize(bytes).map_err(|e| ConflictableTransactionError::Abort(e.into()))
}

fn encode_tx<T: Serialize>(
    value: &T,
) -> std::result::Result<Vec<u8>, ConflictableTransactionError<anyhow::Error>> {
    bincode::serialize(value).map_err(|e| ConflictableTransactionError::Abort(e.into()))
}

fn tx_error(err: TransactionError<anyhow::Error>) -> anyhow::Error {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => anyhow::Error::new(e).context("transaction failed"),
    }
}
