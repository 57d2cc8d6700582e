use std::env;
use std::fmt;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub storage_base_url: String,
    pub storage_bucket: String,
    pub media_base_url: String,
    pub max_image_size_bytes: usize,
    pub allowed_image_types: Vec<String>,
    pub jwt_secret: String,
    pub jwt_expires_in_secs: i64,
    pub worker_id: u64,
    pub datacenter_id: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so parsing can be tested without touching
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let storage_base_url = var("STORAGE_BASE_URL", "http://localhost:8082");
        let storage_bucket = var("STORAGE_BUCKET", "perch");
        let media_base_url = lookup("MEDIA_BASE_URL").unwrap_or_else(|| {
            format!("{}/buckets/{}/objects", storage_base_url, storage_bucket)
        });

        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .ok_or_else(|| "DATABASE_URL must be set".to_string())?,
            host: var("HOST", "0.0.0.0"),
            port: var("PORT", "8080")
                .parse()
                .map_err(|_| "PORT must be a valid u16".to_string())?,
            storage_base_url,
            storage_bucket,
            media_base_url,
            max_image_size_bytes: var("MAX_IMAGE_SIZE_BYTES", "10485760")
                .parse()
                .map_err(|_| "MAX_IMAGE_SIZE_BYTES must be a valid usize".to_string())?,
            allowed_image_types: var(
                "ALLOWED_IMAGE_TYPES",
                "image/jpeg,image/png,image/gif,image/webp",
            )
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
            jwt_secret: lookup("JWT_SECRET")
                .filter(|s| !s.is_empty())
                .ok_or_else(|| "JWT_SECRET must be set".to_string())?,
            jwt_expires_in_secs: var("JWT_EXPIRES_IN_SECS", "604800")
                .parse()
                .map_err(|_| "JWT_EXPIRES_IN_SECS must be a valid i64".to_string())?,
            worker_id: var("WORKER_ID", "1")
                .parse()
                .map_err(|_| "WORKER_ID must be a valid u64".to_string())?,
            datacenter_id: var("DATACENTER_ID", "1")
                .parse()
                .map_err(|_| "DATACENTER_ID must be a valid u64".to_string())?,
        })
    }

    pub fn is_allowed_image_type(&self, content_type: &str) -> bool {
        let content_type = content_type.trim().to_ascii_lowercase();
        self.allowed_image_types.iter().any(|t| *t == content_type)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("storage_base_url", &self.storage_base_url)
            .field("storage_bucket", &self.storage_bucket)
            .field("media_base_url", &self.media_base_url)
            .field("max_image_size_bytes", &self.max_image_size_bytes)
            .field("allowed_image_types", &self.allowed_image_types)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_expires_in_secs", &self.jwt_expires_in_secs)
            .field("worker_id", &self.worker_id)
            .field("datacenter_id", &self.datacenter_id)
            .finish()
    }
}
