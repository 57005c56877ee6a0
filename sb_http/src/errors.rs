use sb_ratelimit::BucketKey;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Rate limit exceeded on {bucket} after {attempts} attempts")]
    RateLimitExceeded { bucket: BucketKey, attempts: u32 },

    #[error("Upstream unavailable on {bucket} after {attempts} attempts: {reason}")]
    UpstreamUnavailable { bucket: BucketKey, attempts: u32, reason: String },

    #[error("Not found on {bucket}")]
    NotFound { bucket: BucketKey, attempts: u32 },

    #[error("Unauthorized (HTTP {status}) on {bucket}")]
    Unauthorized { bucket: BucketKey, attempts: u32, status: u16 },

    #[error("Rejected with HTTP {status} on {bucket}")]
    Rejected { bucket: BucketKey, attempts: u32, status: u16 },

    #[error("Invalid JSON body from {bucket}: {source}")]
    InvalidBody {
        bucket: BucketKey,
        attempts: u32,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cancelled on {bucket} after {attempts} attempts")]
    Cancelled { bucket: BucketKey, attempts: u32 },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Error kinds without their context, for matching and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    RateLimitExceeded,
    UpstreamUnavailable,
    NotFound,
    Unauthorized,
    Rejected,
    InvalidBody,
    Cancelled,
    Client,
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Configuration(_) => ErrorKind::Configuration,
            DispatchError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            DispatchError::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            DispatchError::NotFound { .. } => ErrorKind::NotFound,
            DispatchError::Unauthorized { .. } => ErrorKind::Unauthorized,
            DispatchError::Rejected { .. } => ErrorKind::Rejected,
            DispatchError::InvalidBody { .. } => ErrorKind::InvalidBody,
            DispatchError::Cancelled { .. } => ErrorKind::Cancelled,
            DispatchError::Client(_) => ErrorKind::Client,
        }
    }

    /// The method bucket the failed call was governed by
    pub fn bucket(&self) -> Option<&BucketKey> {
        match self {
            DispatchError::RateLimitExceeded { bucket, .. }
            | DispatchError::UpstreamUnavailable { bucket, .. }
            | DispatchError::NotFound { bucket, .. }
            | DispatchError::Unauthorized { bucket, .. }
            | DispatchError::Rejected { bucket, .. }
            | DispatchError::InvalidBody { bucket, .. }
            | DispatchError::Cancelled { bucket, .. } => Some(bucket),
            DispatchError::Configuration(_) | DispatchError::Client(_) => None,
        }
    }

    /// Network attempts made before the call failed
    pub fn attempts(&self) -> u32 {
        match self {
            DispatchError::RateLimitExceeded { attempts, .. }
            | DispatchError::UpstreamUnavailable { attempts, .. }
            | DispatchError::NotFound { attempts, .. }
            | DispatchError::Unauthorized { attempts, .. }
            | DispatchError::Rejected { attempts, .. }
            | DispatchError::InvalidBody { attempts, .. }
            | DispatchError::Cancelled { attempts, .. } => *attempts,
            DispatchError::Configuration(_) | DispatchError::Client(_) => 0,
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
