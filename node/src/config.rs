use hamrokotha_messaging::UserId;
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use tracing::warn;
use uuid::Uuid;

/// Runtime configuration for the node service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub build_id: String,
    /// Directory of the sled database.
    pub storage_path: PathBuf,
    /// Root directory for uploaded listing photos.
    pub media_root: PathBuf,
    pub max_upload_bytes: usize,
    pub fraud: FraudConfig,
    pub site: SiteSettings,
    /// Accounts allowed to approve listings and work the report queue.
    pub moderators: Vec<UserId>,
}

/// Knobs for the duplicate-image check.
#[derive(Debug, Clone, Default)]
pub struct FraudConfig {
    /// Zero-length uploads all share one digest, so they are skipped unless this is set.
    pub scan_empty_images: bool,
}

/// Site-wide settings, loaded once at startup and handed to whoever needs them.
#[derive(Debug, Clone, Serialize)]
pub struct SiteSettings {
    pub site_name: String,
    pub site_description: String,
    pub contact_email: String,
    pub contact_phone: String,
    /// New listings stay pending until a moderator approves them.
    pub property_approval_required: bool,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            site_name: "HamroKotha".to_string(),
            site_description: "Find your perfect rental property in Kathmandu Valley".to_string(),
            contact_email: "contact@hamrokotha.com".to_string(),
            contact_phone: "+977-1-XXXXXXX".to_string(),
            property_approval_required: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_or("PORT", 8080);
        let build_id =
            env::var("HAMROKOTHA_BUILD_ID").unwrap_or_else(|_| Uuid::new_v4().to_string());
        let storage_path = env::var("HAMROKOTHA_STORAGE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/node"));
        let media_root = env::var("HAMROKOTHA_MEDIA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/media"));
        let max_upload_bytes = parse_or("HAMROKOTHA_MAX_UPLOAD_BYTES", 10 * 1024 * 1024);
        let fraud = FraudConfig {
            scan_empty_images: parse_or("HAMROKOTHA_SCAN_EMPTY_IMAGES", false),
        };
        Ok(Self {
            host,
            port,
            build_id,
            storage_path,
            media_root,
            max_upload_bytes,
            fraud,
            site: SiteSettings::from_env(),
            moderators: parse_moderators(&env::var("HAMROKOTHA_MODERATORS").unwrap_or_default()),
        })
    }

    pub fn is_moderator(&self, user: UserId) -> bool {
        self.moderators.contains(&user)
    }
}

/// Comma-separated user ids. Entries that do not parse are skipped with a warning.
fn parse_moderators(raw: &str) -> Vec<UserId> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.parse() {
            Ok(user) => Some(user),
            Err(_) => {
                warn!(value = entry, "ignoring invalid moderator id");
                None
            }
        })
        .collect()
}

impl SiteSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            site_name: env::var("HAMROKOTHA_SITE_NAME").unwrap_or(defaults.site_name),
            site_description: env::var("HAMROKOTHA_SITE_DESCRIPTION")
                .unwrap_or(defaults.site_description),
            contact_email: env::var("HAMROKOTHA_CONTACT_EMAIL").unwrap_or(defaults.contact_email),
            contact_phone: env::var("HAMROKOTHA_CONTACT_PHONE").unwrap_or(defaults.contact_phone),
            property_approval_required: parse_or(
                "HAMROKOTHA_APPROVAL_REQUIRED",
                defaults.property_approval_required,
            ),
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}
