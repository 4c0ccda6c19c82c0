//! Validate the raw lookup responses and flatten them into rows
use log::info;
use serde::Deserialize;
use serde_json::Value;

use crate::dataset::{AccountRecord, PostRecord};
use crate::error::{PipelineError, RecordKind};
use crate::fetcher::RawResponses;
use crate::twitter_object::{ErrorObject, ResponseObject, Tweet, User};

/// Both datasets of a run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Datasets {
    pub accounts: Vec<AccountRecord>,
    pub posts: Vec<PostRecord>,
}

pub fn transform(raw: &RawResponses) -> Result<Datasets, PipelineError> {
    let accounts = transform_users(&raw.users)?;
    let posts = transform_tweets(&raw.tweets)?;
    info!(
        "Transformed {} accounts and {} posts",
        accounts.len(),
        posts.len()
    );
    Ok(Datasets { accounts, posts })
}

/// One row per response, same order, fails on the first response missing a field
pub fn transform_users(responses: &[Value]) -> Result<Vec<AccountRecord>, PipelineError> {
    responses
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let user: User = decode(RecordKind::Account, index, value)?;
            Ok(AccountRecord {
                account_id: user.id,
                username: user.username,
                display_name: user.name,
                followers_count: user.public_metrics.followers_count,
                following_count: user.public_metrics.following_count,
                post_count: user.public_metrics.tweet_count,
                listed_count: user.public_metrics.listed_count,
            })
        })
        .collect()
}

pub fn transform_tweets(responses: &[Value]) -> Result<Vec<PostRecord>, PipelineError> {
    responses
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let tweet: Tweet = decode(RecordKind::Post, index, value)?;
            Ok(PostRecord {
                post_id: tweet.id,
                text: tweet.text,
                retweet_count: tweet.public_metrics.retweet_count,
                reply_count: tweet.public_metrics.reply_count,
                like_count: tweet.public_metrics.like_count,
                quote_count: tweet.public_metrics.quote_count,
                impression_count: tweet.public_metrics.impression_count,
            })
        })
        .collect()
}

/// Single validating step: the whole `{"data": ...}` envelope must match the schema
fn decode<'a, T: Deserialize<'a>>(
    kind: RecordKind,
    index: usize,
    value: &'a Value,
) -> Result<T, PipelineError> {
    match ResponseObject::<T>::deserialize(value) {
        Ok(response) => Ok(response.data),
        Err(e) => {
            let reported = ErrorObject::deserialize(value)
                .ok()
                .and_then(|errors| errors.summary());
            let detail = match reported {
                Some(message) => format!("{} (API reported: {})", e, message),
                None => e.to_string(),
            };
            Err(PipelineError::MissingField {
                kind,
                index,
                detail,
            })
        }
    }
}
