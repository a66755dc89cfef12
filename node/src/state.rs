use crate::config::AppConfig;
use crate::fraud::{FraudDetector, ReportDesk};
use crate::media::{FsMediaStore, MediaStore};
use crate::messaging::MessageTracker;
use crate::storage::NodeStorage;
use hamrokotha_messaging::UserId;
use std::sync::Arc;

pub struct AppState {
    config: AppConfig,
    storage: NodeStorage,
    detector: FraudDetector,
    reports: ReportDesk,
    tracker: MessageTracker,
}

impl AppState {
    /// Opens the on-disk database and media root named in `config`.
    pub fn new(config: AppConfig) -> anyhow::Result<Arc<Self>> {
        let storage = NodeStorage::open(&config.storage_path)?;
        let media = Arc::new(FsMediaStore::new(&config.media_root));
        Ok(Self::with_parts(config, storage, media))
    }

    pub fn with_parts(
        config: AppConfig,
        storage: NodeStorage,
        media: Arc<dyn MediaStore>,
    ) -> Arc<Self> {
        let detector = FraudDetector::new(storage.clone(), media, config.fraud.clone());
        let reports = ReportDesk::new(storage.clone());
        let tracker = MessageTracker::new(storage.clone());
        Arc::new(Self {
            config,
            storage,
            detector,
            reports,
            tracker,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build_id(&self) -> &str {
        &self.config.build_id
    }

    pub fn storage(&self) -> &NodeStorage {
        &self.storage
    }

    pub fn detector(&self) -> &FraudDetector {
        &self.detector
    }

    pub fn reports(&self) -> &ReportDesk {
        &self.reports
    }

    pub fn is_moderator(&self, user: UserId) -> bool {
        self.config.is_moderator(user)
    }

    pub fn tracker(&self) -> &MessageTracker {
        &self.tracker
    }
}
