use crate::rate_limiter::RateLimiter;
use etl_core::{ConfigError, CoreError, RedditApiError};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// Comments requested per post in one call.
const COMMENT_FETCH_LIMIT: u32 = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<T>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub permalink: String,
    pub created_utc: f64,
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub num_crossposts: i32,
    #[serde(default)]
    pub num_comments: u32,
}

/// A node of the comment forest; `more` nodes are pagination stubs.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum CommentNode {
    #[serde(rename = "t1")]
    Comment(RedditCommentData),
    #[serde(rename = "more")]
    More(MoreCommentsData),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditCommentData {
    #[serde(default)]
    pub id: String,
    pub created_utc: f64,
    #[serde(default, deserialize_with = "string_or_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub score: i32,
    #[serde(default, deserialize_with = "replies_or_none")]
    pub replies: Option<RedditListing<CommentNode>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoreCommentsData {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub children: Vec<String>,
}

/// Bodies that are not strings (null, numbers) are treated as absent.
fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(body) => Ok(Some(body)),
        _ => Ok(None),
    }
}

/// Reddit sends `"replies": ""` for leaf comments instead of an empty listing.
fn replies_or_none<'de, D>(deserializer: D) -> Result<Option<RedditListing<CommentNode>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_object() {
        serde_json::from_value(value)
            .map(Some)
            .map_err(serde::de::Error::custom)
    } else {
        Ok(None)
    }
}

/// Flatten a comment forest breadth-first: every top-level comment in source
/// order, then their replies level by level. `more` stubs are dropped.
pub fn flatten_comment_forest(roots: Vec<CommentNode>) -> Vec<RedditCommentData> {
    let mut queue: VecDeque<CommentNode> = roots.into();
    let mut flattened = Vec::new();
    let mut skipped_more = 0u32;

    while let Some(node) = queue.pop_front() {
        match node {
            CommentNode::Comment(mut comment) => {
                if let Some(replies) = comment.replies.take() {
                    queue.extend(replies.data.children);
                }
                flattened.push(comment);
            }
            CommentNode::More(more) => skipped_more += more.count,
        }
    }

    if skipped_more > 0 {
        debug!("Skipped {} collapsed comments", skipped_more);
    }
    flattened
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    base_url: Url,
}

impl RedditApiClient {
    pub fn new(
        http_client: Client,
        base_url: &str,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, CoreError> {
        let base_url = Url::parse(base_url).map_err(|e| ConfigError::InvalidValue {
            field: "reddit.api_base_url".to_string(),
            value: format!("{}: {}", base_url, e),
        })?;

        Ok(Self {
            http_client,
            rate_limiter,
            base_url,
        })
    }

    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url, CoreError> {
        self.base_url.join(endpoint).map_err(|e| CoreError::InvalidInput {
            message: format!("invalid endpoint {}: {}", endpoint, e),
        })
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        query_params: &[(&str, &str)],
    ) -> Result<Response, CoreError> {
        let url = self.endpoint_url(endpoint)?;

        let permit = self.rate_limiter.acquire_permit().await;
        debug!(
            "Acquired rate limit permit for {} {} after {:?}",
            method, endpoint, permit.queue_wait_time
        );

        info!("Making Reddit API request: {} {}", method, endpoint);
        let response = self
            .http_client
            .request(method.clone(), url)
            .bearer_auth(access_token)
            .query(&[("raw_json", "1")])
            .query(query_params)
            .send()
            .await
            .map_err(|e| {
                error!("Network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    CoreError::RedditApi(RedditApiError::RequestTimeout)
                } else {
                    CoreError::Network(e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            debug!("Request successful: {} {}", status, endpoint);
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, endpoint);
        Err(CoreError::RedditApi(Self::status_error(
            status,
            endpoint,
            response.headers().get("retry-after").and_then(|v| v.to_str().ok()),
        )))
    }

    fn status_error(status: StatusCode, endpoint: &str, retry_after: Option<&str>) -> RedditApiError {
        match status.as_u16() {
            429 => {
                let retry_after = retry_after
                    .and_then(|value| value.trim().parse::<f64>().ok())
                    .map(|seconds| seconds.ceil() as u64)
                    .unwrap_or(60);
                warn!("Rate limited, retry after {} seconds", retry_after);
                RedditApiError::RateLimitExceeded { retry_after }
            }
            401 => RedditApiError::InvalidToken,
            403 => RedditApiError::Forbidden {
                resource: endpoint.to_string(),
            },
            404 if endpoint.starts_with("/comments/") => RedditApiError::PostNotFound {
                post_id: endpoint.trim_start_matches("/comments/").to_string(),
            },
            code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
            code => RedditApiError::InvalidResponse {
                details: format!("unexpected status {} from {}", code, endpoint),
            },
        }
    }

    async fn parse_json<T: DeserializeOwned>(
        response: Response,
        context: &str,
    ) -> Result<T, CoreError> {
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                CoreError::RedditApi(RedditApiError::RequestTimeout)
            } else {
                CoreError::Network(e)
            }
        })?;

        serde_json::from_str(&body).map_err(|e| {
            error!("Failed to parse {}: {}", context, e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse {}", context),
            })
        })
    }

    /// Query string of a site-wide "hot" search. `restrict_sr` stays off so
    /// `/r/all` searches every subreddit.
    pub fn search_params(query: &str, limit: u32) -> Vec<(&'static str, String)> {
        vec![
            ("q", query.to_string()),
            ("sort", "hot".to_string()),
            ("limit", limit.to_string()),
            ("restrict_sr", "false".to_string()),
            ("t", "all".to_string()),
            ("type", "link".to_string()),
        ]
    }

    /// Search every subreddit for `query`, "hot" ordering.
    pub async fn search_hot(
        &self,
        access_token: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<RedditPostData>, CoreError> {
        let owned = Self::search_params(query, limit);
        let params: Vec<(&str, &str)> = owned.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let response = self
            .make_request(Method::GET, "/r/all/search", access_token, &params)
            .await?;

        let listing: RedditListing<RedditListingChild<RedditPostData>> =
            Self::parse_json(response, &format!("search results for '{}'", query)).await?;

        let posts: Vec<RedditPostData> = listing
            .data
            .children
            .into_iter()
            .filter(|child| child.kind == "t3")
            .map(|child| child.data)
            .collect();

        info!("Search for '{}' returned {} posts", query, posts.len());
        Ok(posts)
    }

    /// Fetch every loaded comment of a post, flattened breadth-first.
    pub async fn get_comments(
        &self,
        access_token: &str,
        post_id: &str,
    ) -> Result<Vec<RedditCommentData>, CoreError> {
        let endpoint = format!("/comments/{}", post_id);
        let limit = COMMENT_FETCH_LIMIT.to_string();
        let params = [("limit", limit.as_str()), ("sort", "confidence")];

        let response = self
            .make_request(Method::GET, &endpoint, access_token, &params)
            .await?;

        // The endpoint answers [post listing, comment listing].
        let (_post, comments): (serde_json::Value, RedditListing<CommentNode>) =
            Self::parse_json(response, &format!("comments for post {}", post_id)).await?;

        let flattened = flatten_comment_forest(comments.data.children);
        debug!("Post {} has {} comments", post_id, flattened.len());
        Ok(flattened)
    }

    pub async fn get_rate_limit_status(&self) -> crate::rate_limiter::RateLimitStatus {
        self.rate_limiter.get_rate_limit_status().await
    }
}
