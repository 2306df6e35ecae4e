use tracing::warn;

/// Engine configuration, loaded from BEACON_* environment variables with
/// safe defaults for local development.
pub struct Config {
    /// Directory for durable storage (sled profile database).
    pub data_dir: String,
    /// Namespace prefix for every key this engine writes to local storage.
    /// Sign-out removes exactly the keys under this prefix.
    pub storage_prefix: String,
    /// How long before credential expiry the refresh fires, in seconds.
    pub refresh_lead_secs: u64,
    /// Default credential lifetime handed out by the in-memory store.
    pub session_ttl_secs: u64,
    /// Bootstrap admin identity, seeded when the profile store is empty.
    pub bootstrap_admin_email: String,
    pub bootstrap_admin_password: String,
}

impl Config {
    const DEFAULT_DATA_DIR: &str = "./data";
    const DEFAULT_STORAGE_PREFIX: &str = "beacon.auth.";
    const DEFAULT_REFRESH_LEAD_SECS: u64 = 60;
    const DEFAULT_SESSION_TTL_SECS: u64 = 3600;
    const DEFAULT_ADMIN_EMAIL: &str = "admin@beacon.local";
    const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

    pub fn from_env() -> Self {
        let refresh_lead_secs = std::env::var("BEACON_REFRESH_LEAD_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(Self::DEFAULT_REFRESH_LEAD_SECS);
        let session_ttl_secs = std::env::var("BEACON_SESSION_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(Self::DEFAULT_SESSION_TTL_SECS);

        Self {
            data_dir: std::env::var("BEACON_DATA_DIR")
                .unwrap_or_else(|_| Self::DEFAULT_DATA_DIR.to_string()),
            storage_prefix: std::env::var("BEACON_STORAGE_PREFIX")
                .unwrap_or_else(|_| Self::DEFAULT_STORAGE_PREFIX.to_string()),
            refresh_lead_secs,
            session_ttl_secs,
            bootstrap_admin_email: std::env::var("BEACON_ADMIN_EMAIL")
                .unwrap_or_else(|_| Self::DEFAULT_ADMIN_EMAIL.to_string()),
            bootstrap_admin_password: std::env::var("BEACON_ADMIN_PASSWORD").unwrap_or_else(
                |_| {
                    warn!("BEACON_ADMIN_PASSWORD not set, using default password 'admin123'");
                    warn!("⚠️  WARNING: Please change the default admin password immediately!");
                    Self::DEFAULT_ADMIN_PASSWORD.to_string()
                },
            ),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: Self::DEFAULT_DATA_DIR.to_string(),
            storage_prefix: Self::DEFAULT_STORAGE_PREFIX.to_string(),
            refresh_lead_secs: Self::DEFAULT_REFRESH_LEAD_SECS,
            session_ttl_secs: Self::DEFAULT_SESSION_TTL_SECS,
            bootstrap_admin_email: Self::DEFAULT_ADMIN_EMAIL.to_string(),
            bootstrap_admin_password: Self::DEFAULT_ADMIN_PASSWORD.to_string(),
        }
    }
}
