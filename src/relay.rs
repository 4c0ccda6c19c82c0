//! Push the published statistics to Databox
use log::info;

use crate::blob_store::BlobStore;
use crate::databox_client::MetricsPusher;
use crate::dataset::{from_csv, AccountRecord, PostRecord, Tabular};
use crate::error::PipelineError;
use crate::publisher::{ACCOUNT_BLOB_KEY, POST_BLOB_KEY};

/// What a relay pushed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelaySummary {
    pub accounts: usize,
    pub posts: usize,
    pub pushed: usize,
}

/// Per account, keyed by its display name
pub fn account_metrics(account: &AccountRecord) -> [(String, u64); 4] {
    let name = &account.display_name;
    [
        (format!("{}_followers_count", name), account.followers_count),
        (format!("{}_following_count", name), account.following_count),
        (format!("{}_tweet_count", name), account.post_count),
        (format!("{}_listed_count", name), account.listed_count),
    ]
}

/// Per post, under the shared metric names
pub fn post_metrics(post: &PostRecord) -> [(&'static str, u64); 4] {
    [
        ("reply_count", post.reply_count),
        ("like_count", post.like_count),
        ("impression_count", post.impression_count),
        ("retweet_count", post.retweet_count),
    ]
}

fn download<T: Tabular>(store: &impl BlobStore, key: &str) -> Result<Vec<T>, PipelineError> {
    let bytes = store.get(key)?;
    from_csv(key, &bytes)
}

/// Relay from the blobs written by [`crate::publisher::publish`]
pub fn relay(
    store: &impl BlobStore,
    pusher: &impl MetricsPusher,
) -> Result<RelaySummary, PipelineError> {
    relay_from(store, pusher, ACCOUNT_BLOB_KEY, POST_BLOB_KEY)
}

/// Both blobs are downloaded and parsed before the first push, so a missing blob pushes nothing
pub fn relay_from(
    store: &impl BlobStore,
    pusher: &impl MetricsPusher,
    account_key: &str,
    post_key: &str,
) -> Result<RelaySummary, PipelineError> {
    let accounts: Vec<AccountRecord> = download(store, account_key)?;
    let posts: Vec<PostRecord> = download(store, post_key)?;

    let mut pushed = 0;
    for account in &accounts {
        for (metric, value) in account_metrics(account) {
            pusher.push(&metric, value)?;
            pushed += 1;
        }
    }
    for post in &posts {
        for (metric, value) in post_metrics(post) {
            pusher.push(metric, value)?;
            pushed += 1;
        }
    }

    info!(
        "Pushed {} metrics for {} accounts and {} posts",
        pushed,
        accounts.len(),
        posts.len()
    );
    Ok(RelaySummary {
        accounts: accounts.len(),
        posts: posts.len(),
        pushed,
    })
}
