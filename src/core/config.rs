use std::env;

/// Process-wide configuration, recognized options per the external
/// interface contract. Loaded once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct Config {
    // Transport
    pub host: String,
    pub port: u16,

    // Scoring policy
    pub similarity_threshold: f32,
    pub pending_face_floor: f32,
    pub pending_ocr_floor: f32,

    // Upload limits
    pub max_upload_size_mb: u64,

    // Challenge lifecycle
    pub challenge_ttl_seconds: i64,
    pub challenge_count: usize,
    pub hmac_secret: String,

    // Liveness
    pub liveness_min_frames: usize,
    pub liveness_face_ratio_floor: f32,

    // CORS
    pub cors_allowed_origins: Vec<String>,

    // End-to-end deadline for a verification request
    pub request_deadline_seconds: u64,

    // Edge Gateway only: where the canonical Inference Gateway lives
    pub inference_gateway_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let hmac_secret = env::var("HMAC_SECRET")
            .unwrap_or_else(|_| "development-only-secret-change-me-before-deploy!!".to_string());
        if hmac_secret.len() < 32 {
            return Err(ConfigError::WeakSecret(hmac_secret.len()));
        }

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_parse("PORT", 8081)?,

            similarity_threshold: env_parse("SIMILARITY_THRESHOLD", 0.30)?,
            pending_face_floor: env_parse("PENDING_FACE_FLOOR", 0.35)?,
            pending_ocr_floor: env_parse("PENDING_OCR_FLOOR", 0.5)?,

            max_upload_size_mb: env_parse("MAX_UPLOAD_SIZE_MB", 10)?,

            challenge_ttl_seconds: env_parse("CHALLENGE_TTL_SECONDS", 120)?,
            challenge_count: env_parse("CHALLENGE_COUNT", 2)?,
            hmac_secret,

            liveness_min_frames: env_parse("LIVENESS_MIN_FRAMES", 10)?,
            liveness_face_ratio_floor: env_parse("LIVENESS_FACE_RATIO_FLOOR", 0.5)?,

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),

            request_deadline_seconds: env_parse("REQUEST_DEADLINE_SECONDS", 60)?,

            inference_gateway_url: env::var("INFERENCE_GATEWAY_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8081".to_string()),
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_upload_size_bytes(&self) -> usize {
        (self.max_upload_size_mb * 1024 * 1024) as usize
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| ConfigError::Invalid(key.to_string(), format!("{e}"))),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("HMAC secret must be at least 32 bytes of entropy, got {0}")]
    WeakSecret(usize),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}
