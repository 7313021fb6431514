//! Feed fetching.
//!
//! This module defines the fetcher seam used by the collection loop and
//! the X API client that implements it.

pub mod x_client;

pub use x_client::XClient;

use crate::models::Author;
use crate::ratelimit::RateLimiter;
use thiserror::Error;

/// Rate-limited endpoint names.
pub const HOME_TIMELINE: &str = "home_timeline";
pub const USER_TWEETS: &str = "user_tweets";
pub const USER_INFO: &str = "user_info";

/// Why a batch could not be fetched.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by the API")]
    RateLimited,

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("no posts found")]
    Empty,

    #[error("missing credential: {0}")]
    MissingCredentials(&'static str),
}

impl FeedError {
    /// Whether retrying later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FeedError::Http(_) | FeedError::RateLimited | FeedError::Empty => true,
            FeedError::Api { status, .. } => *status >= 500,
            FeedError::MissingCredentials(_) => false,
        }
    }
}

/// Something that can produce a batch of authors with their recent posts.
pub trait FeedFetcher {
    /// Fetch one batch, acquiring `limiter` clearance before each request.
    async fn fetch_batch(&mut self, limiter: &mut RateLimiter) -> Result<Vec<Author>, FeedError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FeedError::RateLimited.is_transient());
        assert!(FeedError::Empty.is_transient());
        assert!(FeedError::Api {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!FeedError::Api {
            status: 401,
            body: String::new()
        }
        .is_transient());
        assert!(!FeedError::MissingCredentials("X_BEARER_TOKEN").is_transient());
    }
}
