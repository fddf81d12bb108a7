pub mod api;
pub mod auth;
pub mod extractor;
pub mod rate_limiter;
pub mod retry;


pub use api::{
    flatten_comment_forest, CommentNode, RedditApiClient, RedditCommentData, RedditListing,
    RedditPostData,
};
pub use auth::{AppOnlyAuthenticator, RedditToken};
pub use extractor::{build_post, PostSource, RedditExtractor};
pub use rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};
pub use retry::{RetryConfig, RetryExecutor, RetryStrategy};
