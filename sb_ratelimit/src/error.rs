use std::fmt;

/// Result type for quota bookkeeping operations
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Errors that can occur while reading quota information from a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// A rate-limit header was present but not of the form `count:seconds[,count:seconds...]`
    MalformedHeader { name: &'static str, value: String },
}

impl fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitError::MalformedHeader { name, value } => write!(f, "Malformed rate limit header {}: {:?}", name, value),
        }
    }
}

impl std::error::Error for RateLimitError {}
