//! Twitter API Client
//! It calls the lookup APIs with the app Bearer Token
//! Define it as trait and implement it for the testability(using mock)
use std::time::Duration;

use log::debug;
use serde_json::Value;
use url::Url;

use crate::error::PipelineError;

/// Fields requested on every user lookup
pub const USER_FIELDS: &str = "public_metrics,profile_image_url,username,description,id";
/// Fields requested on every tweet lookup
pub const TWEET_FIELDS: &str = "public_metrics,author_id,text";

/// Twitter Client
/// It needs to know the endpoint and the app Bearer Token
pub struct TwitterClient {
    agent: ureq::Agent,
    server: Url,
    bearer_token: String,
}

#[cfg(test)]
use mockall::automock;
#[cfg_attr(test, automock)]
pub trait TwitterClientTrait {
    /// Raw JSON of `GET /2/users/{user_id}`
    fn fetch_user(&self, user_id: &str) -> Result<Value, PipelineError>;
    /// Raw JSON of `GET /2/tweets/{tweet_id}`
    fn fetch_tweet(&self, tweet_id: &str) -> Result<Value, PipelineError>;
}

impl TwitterClient {
    /// Constructs new Twitter Client
    /// * api_base: e.g. `https://api.twitter.com`
    /// * bearer_token: App Bearer Token
    pub fn new(api_base: &str, bearer_token: String) -> Result<Self, PipelineError> {
        let server = Url::parse(api_base).map_err(|e| {
            PipelineError::Config(format!("twitter_api_base '{}': {}", api_base, e))
        })?;
        let agent: ureq::Agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(5))
            .timeout_write(Duration::from_secs(5))
            .build();

        Ok(TwitterClient {
            agent,
            server,
            bearer_token,
        })
    }

    fn user_url(&self, user_id: &str) -> Result<Url, PipelineError> {
        self.lookup_url(&["2", "users", user_id], ("user.fields", USER_FIELDS))
    }

    fn tweet_url(&self, tweet_id: &str) -> Result<Url, PipelineError> {
        self.lookup_url(&["2", "tweets", tweet_id], ("tweet.fields", TWEET_FIELDS))
    }

    /// Ids are opaque, so they are pushed as escaped path segments instead of joined as text
    fn lookup_url(&self, segments: &[&str], fields: (&str, &str)) -> Result<Url, PipelineError> {
        let mut url = self.server.clone();
        let reason = format!("twitter_api_base '{}' cannot be a base", self.server);
        url.path_segments_mut()
            .map_err(|_| PipelineError::Config(reason))?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut().append_pair(fields.0, fields.1);
        Ok(url)
    }

    /// Error statuses with a JSON body are returned as-is, the transformer decides what is missing
    fn get_json(&self, url: Url) -> Result<Value, PipelineError> {
        debug!("GET {}", url);
        let response = match self
            .agent
            .request_url("GET", &url)
            .set("Authorization", &format!("Bearer {}", self.bearer_token))
            .call()
        {
            Ok(res) => res,
            Err(ureq::Error::Status(code, res)) => {
                debug!("{} answered with status {}", url, code);
                res
            }
            Err(e) => {
                return Err(PipelineError::UpstreamApi {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        serde_json::from_reader(response.into_reader()).map_err(|e| PipelineError::UpstreamApi {
            url: url.to_string(),
            reason: format!("response is not JSON: {}", e),
        })
    }
}

impl TwitterClientTrait for TwitterClient {
    fn fetch_user(&self, user_id: &str) -> Result<Value, PipelineError> {
        let url = self.user_url(user_id)?;
        self.get_json(url)
    }

    fn fetch_tweet(&self, tweet_id: &str) -> Result<Value, PipelineError> {
        let url = self.tweet_url(tweet_id)?;
        self.get_json(url)
    }
}
