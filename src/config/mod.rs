use crate::utils::filetype::FileCategory;
use std::env;
use std::time::Duration;

const MIB: i64 = 1024 * 1024;

/// Upload policy and progress-lifecycle configuration.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Per-category size caps in bytes.
    pub max_image_size: i64,
    pub max_video_size: i64,
    pub max_audio_size: i64,
    pub max_apk_size: i64,
    pub max_other_size: i64,

    /// Fixed part size for chunked uploads (default: 10 MiB).
    pub chunk_size: usize,

    /// Uploads of at least this many bytes take the chunked path
    /// (default: 10 MiB, inclusive on the chunked side).
    pub small_file_threshold: i64,

    /// Deadline for the whole single-shot upload (default: 10 minutes).
    pub single_upload_timeout: Duration,

    /// Validity window for signed download URLs (default: 1 hour).
    pub signed_url_ttl: Duration,

    /// Delay between an upload reaching a terminal state and its
    /// progress record being removed (default: 5 minutes).
    pub progress_grace: Duration,

    /// Maximum age of any progress record before the sweeper evicts it
    /// (default: 24 hours).
    pub progress_retention: Duration,

    /// How often the cleanup task runs (default: 1 minute).
    pub cleanup_interval: Duration,

    /// Tenant assumed when the request carries no tenant header.
    pub default_tenant_id: i64,

    /// Worker id baked into generated snowflake ids.
    pub id_worker: i64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_image_size: 32 * MIB,
            max_video_size: 1024 * MIB,
            max_audio_size: 128 * MIB,
            max_apk_size: 512 * MIB,
            max_other_size: 256 * MIB,
            chunk_size: (10 * MIB) as usize,
            small_file_threshold: 10 * MIB,
            single_upload_timeout: Duration::from_secs(10 * 60),
            signed_url_ttl: Duration::from_secs(3600),
            progress_grace: Duration::from_secs(5 * 60),
            progress_retention: Duration::from_secs(24 * 3600),
            cleanup_interval: Duration::from_secs(60),
            default_tenant_id: 1,
            id_worker: 0,
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_image_size: env_i64("MAX_IMAGE_SIZE", default.max_image_size),
            max_video_size: env_i64("MAX_VIDEO_SIZE", default.max_video_size),
            max_audio_size: env_i64("MAX_AUDIO_SIZE", default.max_audio_size),
            max_apk_size: env_i64("MAX_APK_SIZE", default.max_apk_size),
            max_other_size: env_i64("MAX_OTHER_SIZE", default.max_other_size),

            chunk_size: env_i64("CHUNK_SIZE", default.chunk_size as i64) as usize,
            small_file_threshold: env_i64("SMALL_FILE_THRESHOLD", default.small_file_threshold),

            single_upload_timeout: env_secs("SINGLE_UPLOAD_TIMEOUT_SECS", default.single_upload_timeout),
            signed_url_ttl: env_secs("SIGNED_URL_TTL_SECS", default.signed_url_ttl),
            progress_grace: env_secs("PROGRESS_GRACE_SECS", default.progress_grace),
            progress_retention: env_secs("PROGRESS_RETENTION_SECS", default.progress_retention),
            cleanup_interval: env_secs("PROGRESS_CLEANUP_INTERVAL_SECS", default.cleanup_interval),

            default_tenant_id: env_i64("DEFAULT_TENANT_ID", default.default_tenant_id),
            id_worker: env_i64("ID_WORKER", default.id_worker),
        }
    }

    /// Relaxed limits and short windows, handy for local runs.
    pub fn development() -> Self {
        Self {
            max_video_size: 4096 * MIB,
            progress_grace: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(10),
            ..Self::default()
        }
    }

    pub fn max_size_for(&self, category: FileCategory) -> i64 {
        match category {
            FileCategory::Image => self.max_image_size,
            FileCategory::Video => self.max_video_size,
            FileCategory::Audio => self.max_audio_size,
            FileCategory::Apk => self.max_apk_size,
            FileCategory::Other => self.max_other_size,
        }
    }

    /// Request body cap for the multipart endpoint: the largest
    /// category limit plus headroom for multipart framing.
    pub fn body_limit(&self) -> usize {
        let largest = self
            .max_video_size
            .max(self.max_apk_size)
            .max(self.max_other_size)
            .max(self.max_audio_size)
            .max(self.max_image_size);
        (largest + 10 * MIB) as usize
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
