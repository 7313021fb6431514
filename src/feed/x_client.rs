//! X API v2 client.
//!
//! Reads the authenticated user's home timeline, picks the first few
//! distinct authors and fetches their profile and recent posts.

use super::{FeedError, FeedFetcher, HOME_TIMELINE, USER_INFO, USER_TWEETS};
use crate::config::FeedConfig;
use crate::models::{Author, Post};
use crate::ratelimit::RateLimiter;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

const TWEET_FIELDS: &str = "created_at,author_id,public_metrics";

/// Envelope shared by every API v2 response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    username: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ApiTweet {
    id: String,
    text: String,
    #[serde(default)]
    author_id: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    public_metrics: BTreeMap<String, i64>,
}

impl From<ApiTweet> for Post {
    fn from(tweet: ApiTweet) -> Self {
        Post {
            id: tweet.id,
            text: tweet.text,
            created_at: tweet.created_at,
            metrics: tweet.public_metrics,
        }
    }
}

/// Client for the X API v2.
pub struct XClient {
    config: FeedConfig,
    bearer_token: String,
    http_client: reqwest::Client,
    me: Option<String>,
}

impl XClient {
    /// Create a client. Fails if the bearer token is missing.
    pub fn new(config: FeedConfig, bearer_token: Option<String>) -> Result<Self, FeedError> {
        let bearer_token = bearer_token.ok_or(FeedError::MissingCredentials("X_BEARER_TOKEN"))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            config,
            bearer_token,
            http_client,
            me: None,
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, FeedError> {
        let url = format!("{}{}", self.config.api_base.trim_end_matches('/'), path);
        debug!("GET {}", url);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FeedError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: ApiResponse<T> = response.json().await?;
        Ok(envelope.data)
    }

    /// Id of the authenticated user, looked up once.
    async fn me(&mut self, limiter: &mut RateLimiter) -> Result<String, FeedError> {
        if let Some(ref id) = self.me {
            return Ok(id.clone());
        }

        limiter.acquire(USER_INFO).await;
        let user: ApiUser = self.get("/users/me", &[]).await?.ok_or(FeedError::Empty)?;
        info!("Authenticated as @{}", user.username);

        self.me = Some(user.id.clone());
        Ok(user.id)
    }

    /// Profile and recent posts for one author.
    async fn author_with_posts(
        &self,
        limiter: &mut RateLimiter,
        user_id: &str,
    ) -> Result<Option<Author>, FeedError> {
        limiter.acquire(USER_INFO).await;
        let user: Option<ApiUser> = self
            .get(
                &format!("/users/{}", user_id),
                &[("user.fields", "description".to_string())],
            )
            .await?;
        let Some(user) = user else {
            return Ok(None);
        };

        limiter.acquire(USER_TWEETS).await;
        let tweets: Option<Vec<ApiTweet>> = self
            .get(
                &format!("/users/{}/tweets", user_id),
                &[
                    ("max_results", self.config.posts_per_user.to_string()),
                    ("tweet.fields", TWEET_FIELDS.to_string()),
                ],
            )
            .await?;

        let posts: Vec<Post> = tweets.unwrap_or_default().into_iter().map(Post::from).collect();
        if posts.is_empty() {
            return Ok(None);
        }

        Ok(Some(Author {
            user_id: user.id,
            username: user.username,
            display_name: user.name,
            bio: user.description,
            posts,
        }))
    }

    /// Look up a user by handle and fetch their recent posts.
    pub async fn user_recent_posts(
        &self,
        limiter: &mut RateLimiter,
        username: &str,
    ) -> Result<Author, FeedError> {
        let username = username.trim_start_matches('@');
        info!("Looking up user ID for @{}...", username);

        limiter.acquire(USER_INFO).await;
        let user: ApiUser = self
            .get(
                &format!("/users/by/username/{}", username),
                &[("user.fields", "description".to_string())],
            )
            .await?
            .ok_or(FeedError::Empty)?;

        limiter.acquire(USER_TWEETS).await;
        let tweets: Vec<ApiTweet> = self
            .get(
                &format!("/users/{}/tweets", user.id),
                &[
                    ("max_results", self.config.posts_per_user.to_string()),
                    ("tweet.fields", TWEET_FIELDS.to_string()),
                ],
            )
            .await?
            .unwrap_or_default();

        if tweets.is_empty() {
            return Err(FeedError::Empty);
        }

        Ok(Author {
            user_id: user.id,
            username: user.username,
            display_name: user.name,
            bio: user.description,
            posts: tweets.into_iter().map(Post::from).collect(),
        })
    }
}

impl FeedFetcher for XClient {
    async fn fetch_batch(&mut self, limiter: &mut RateLimiter) -> Result<Vec<Author>, FeedError> {
        let me = self.me(limiter).await?;

        info!("Fetching home timeline...");
        limiter.acquire(HOME_TIMELINE).await;
        let timeline: Vec<ApiTweet> = self
            .get(
                &format!("/users/{}/timelines/reverse_chronological", me),
                &[
                    ("max_results", self.config.timeline_results.to_string()),
                    ("tweet.fields", TWEET_FIELDS.to_string()),
                ],
            )
            .await?
            .unwrap_or_default();

        let mut author_ids: Vec<String> = Vec::new();
        for tweet in &timeline {
            if author_ids.len() >= self.config.max_users {
                break;
            }
            if let Some(ref id) = tweet.author_id {
                if !author_ids.contains(id) {
                    author_ids.push(id.clone());
                }
            }
        }
        info!("Found {} unique users", author_ids.len());

        let mut authors = Vec::new();
        for (i, user_id) in author_ids.iter().enumerate() {
            info!("Fetching posts for user {} of {}...", i + 1, author_ids.len());
            match self.author_with_posts(limiter, user_id).await {
                Ok(Some(author)) => authors.push(author),
                Ok(None) => debug!("No posts for user {}", user_id),
                Err(e) => warn!("Error fetching posts for user {}: {}", user_id, e),
            }
        }

        if authors.is_empty() {
            return Err(FeedError::Empty);
        }

        info!("Successfully fetched posts from {} users", authors.len());
        Ok(authors)
    }
}
