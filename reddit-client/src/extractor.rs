use crate::api::{RedditApiClient, RedditCommentData, RedditPostData};
use crate::auth::AppOnlyAuthenticator;
use crate::rate_limiter::RateLimiter;
use crate::retry::{RetryConfig, RetryExecutor};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use etl_core::{
    Comment, CoreError, Post, RedditApiError, RedditConfig, RedditCredentials, Sector,
    AUTHOR_PLACEHOLDER,
};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Anything that can produce the posts of a sector, comments included.
#[async_trait]
pub trait PostSource: Send + Sync {
    async fn fetch_posts_with_comments(
        &self,
        sector: &Sector,
        limit: u32,
    ) -> Result<Vec<Post>, CoreError>;
}

/// Reddit-backed [`PostSource`]. Credentials are resolved on every call, so a
/// missing variable fails the extract stage instead of process startup.
#[derive(Debug)]
pub struct RedditExtractor {
    config: RedditConfig,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryExecutor,
}

impl RedditExtractor {
    pub fn new(config: RedditConfig, rate_limiter: Arc<RateLimiter>) -> Self {
        let retry = RetryExecutor::new(RetryConfig::extraction(config.extraction_attempts));
        Self {
            config,
            rate_limiter,
            retry,
        }
    }

    fn build_session(&self, credentials: &RedditCredentials) -> Result<RedditSession, CoreError> {
        let http_client = Client::builder()
            .user_agent(credentials.user_agent.clone())
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(CoreError::Network)?;

        let authenticator =
            AppOnlyAuthenticator::new(credentials, &self.config.token_url, http_client.clone())?;
        let api = RedditApiClient::new(
            http_client,
            &self.config.api_base_url,
            self.rate_limiter.clone(),
        )?;

        Ok(RedditSession { authenticator, api })
    }
}

struct RedditSession {
    authenticator: AppOnlyAuthenticator,
    api: RedditApiClient,
}

impl RedditSession {
    async fn fetch_once(&self, sector: &Sector, limit: u32) -> Result<Vec<Post>, CoreError> {
        let token = self.authenticator.access_token().await?;
        let result = self.fetch_with_token(&token, sector, limit).await;

        if let Err(CoreError::RedditApi(RedditApiError::InvalidToken)) = &result {
            warn!("Reddit rejected the access token, it will be refreshed");
            self.authenticator.invalidate().await;
        }
        result
    }

    async fn fetch_with_token(
        &self,
        token: &str,
        sector: &Sector,
        limit: u32,
    ) -> Result<Vec<Post>, CoreError> {
        let submissions = self.api.search_hot(token, sector.as_str(), limit).await?;

        let mut posts = Vec::with_capacity(submissions.len());
        for submission in submissions {
            let comments = self.api.get_comments(token, &submission.id).await?;
            posts.push(build_post(submission, comments)?);
        }
        Ok(posts)
    }
}

#[async_trait]
impl PostSource for RedditExtractor {
    #[instrument(skip_all, fields(sector = %sector))]
    async fn fetch_posts_with_comments(
        &self,
        sector: &Sector,
        limit: u32,
    ) -> Result<Vec<Post>, CoreError> {
        let credentials = self.config.credentials()?;
        let session = self.build_session(&credentials)?;

        let operation_name = format!("extract sector {}", sector);
        let posts = self
            .retry
            .execute(&operation_name, || session.fetch_once(sector, limit))
            .await?;

        let comment_count: usize = posts.iter().map(|p| p.comments.len()).sum();
        info!(
            "Extracted {} posts and {} comments for sector {}",
            posts.len(),
            comment_count,
            sector
        );
        Ok(posts)
    }
}

/// Converts a Reddit `created_utc` (fractional epoch seconds) to a UTC
/// timestamp truncated to the second.
pub fn utc_timestamp(created_utc: f64) -> Result<NaiveDateTime, CoreError> {
    if !created_utc.is_finite() {
        return Err(invalid_timestamp(created_utc));
    }
    DateTime::from_timestamp(created_utc.floor() as i64, 0)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| invalid_timestamp(created_utc))
}

fn invalid_timestamp(created_utc: f64) -> CoreError {
    CoreError::RedditApi(RedditApiError::InvalidResponse {
        details: format!("invalid created_utc {}", created_utc),
    })
}

/// Deleted accounts come back as `null` or `"[deleted]"`.
pub fn author_or_placeholder(author: Option<String>) -> String {
    match author {
        Some(name) if !name.is_empty() && name != "[deleted]" => name,
        _ => AUTHOR_PLACEHOLDER.to_string(),
    }
}

/// Builds a [`Post`] from a submission and its breadth-first comment list.
/// Comment order is 1-based and follows the list.
pub fn build_post(
    submission: RedditPostData,
    comments: Vec<RedditCommentData>,
) -> Result<Post, CoreError> {
    let comments = comments
        .into_iter()
        .enumerate()
        .map(|(index, comment)| {
            Ok(Comment {
                comment_order: index as u32 + 1,
                comment_date: utc_timestamp(comment.created_utc)?,
                comment_text: comment.body,
                comment_likes: comment.score,
            })
        })
        .collect::<Result<Vec<_>, CoreError>>()?;

    Ok(Post {
        nbr_characters: Post::character_count(&submission.selftext),
        post_date: utc_timestamp(submission.created_utc)?,
        post_id: submission.id,
        post_title: submission.title,
        post_text: submission.selftext,
        nbr_likes: submission.score,
        nbr_reposts: submission.num_crossposts,
        author_id: author_or_placeholder(submission.author),
        comments,
    })
}
