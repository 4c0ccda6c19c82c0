//! Twitter API response object definition
use serde::{Deserialize, Serialize};

/// Wrapper of the response
/// `T` is depending on the endpoints, but always it will be wrapped with `data`
#[derive(Deserialize, Serialize, Debug)]
pub struct ResponseObject<T> {
    pub data: T,
}

/// `GET /2/users/{id}` with `user.fields=public_metrics,...`
#[derive(Deserialize, Serialize, Debug)]
pub struct User {
    pub id: String,
    pub name: String,
    pub username: String,
    pub public_metrics: UserPublicMetrics,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct UserPublicMetrics {
    pub followers_count: u64,
    pub following_count: u64,
    pub tweet_count: u64,
    pub listed_count: u64,
}

/// `GET /2/tweets/{id}` with `tweet.fields=public_metrics,author_id,text`
#[derive(Deserialize, Serialize, Debug)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    pub public_metrics: PublicMetrics,
}

/// Will be used for chekcing how many likes, retweets, replies and views on the tweet
#[derive(Deserialize, Debug, Serialize)]
pub struct PublicMetrics {
    pub retweet_count: u64,
    pub reply_count: u64,
    pub like_count: u64,
    pub quote_count: u64,
    pub impression_count: u64,
}

/// Error shape returned instead of `data`, e.g. for a deleted tweet or a suspended user
#[derive(Deserialize, Debug, Default)]
pub struct ErrorObject {
    #[serde(default)]
    pub errors: Vec<ApiError>,
    pub title: Option<String>,
    pub detail: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ApiError {
    pub title: Option<String>,
    pub detail: Option<String>,
}

impl ErrorObject {
    /// Human readable summary of what the API reported, if anything
    pub fn summary(&self) -> Option<String> {
        let mut messages: Vec<String> = self
            .errors
            .iter()
            .filter_map(|e| e.detail.clone().or_else(|| e.title.clone()))
            .collect();
        if let Some(detail) = self.detail.as_ref().or(self.title.as_ref()) {
            messages.push(detail.clone());
        }
        if messages.is_empty() {
            None
        } else {
            Some(messages.join("; "))
        }
    }
}
