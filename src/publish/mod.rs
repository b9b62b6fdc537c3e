//! Publish gating
//!
//! Readiness checks and the rate limiter are independent leaves; the executor
//! combines them around the external publish call.

mod executor;
mod rate_limit;
mod readiness;

pub use executor::{PublishExecutor, PublishOutcome, PublishState};
pub use rate_limit::{RateLimiter, parse_wait_from_message};
pub use readiness::{
    Advisory, BlockingIssue, MAX_CAPTION_LENGTH, MAX_HASHTAGS, PublishContent, PublishFormat,
    PublishReadiness, PublishReadinessGate, RECOMMENDED_FEED_CAPTION_LENGTH, count_hashtags,
};
