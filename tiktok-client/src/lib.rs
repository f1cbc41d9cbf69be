//! Network side of the harvester: the paginated hashtag search and the media
//! downloader, both behind the collaborator traits of `harvest-core`.

pub mod api;
pub mod media;
pub mod rate_limiter;
pub mod retry;

pub use api::{parse_challenge_id, parse_item_page, status_error, ItemPage, TikTokClient};
pub use media::{extension_for_content_type, gallery_stems, HttpMediaDownloader};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use retry::{RetryConfig, RetryExecutor, RetryMetrics};

mod tests;
