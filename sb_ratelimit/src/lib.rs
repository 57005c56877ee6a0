pub mod error;
pub mod headers;
mod time;
pub mod tracker;
pub mod window;

pub use error::RateLimitError;
pub use error::Result;
pub use headers::LimitType;
pub use headers::ParsedLimits;
pub use headers::parse_headers;
pub use tracker::BucketKey;
pub use tracker::BucketSnapshot;
pub use tracker::CallBuckets;
pub use tracker::QuotaTracker;
pub use tracker::Reservation;
pub use tracker::Scope;
pub use window::QuotaWindow;
pub use window::UsageLog;
