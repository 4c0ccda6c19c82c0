//! Publish the datasets as CSV blobs
use log::info;

use crate::blob_store::BlobStore;
use crate::dataset::{to_csv, Tabular};
use crate::error::PipelineError;
use crate::transform::Datasets;

/// Where the account dataset lives, for both the publisher and the relay
pub const ACCOUNT_BLOB_KEY: &str = "data/user_data.csv";
/// Where the post dataset lives, for both the publisher and the relay
pub const POST_BLOB_KEY: &str = "data/tweet_data.csv";

pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Overwrites `key` with the CSV form of `rows`
pub fn publish_dataset<T: Tabular>(
    store: &impl BlobStore,
    key: &str,
    rows: &[T],
) -> Result<(), PipelineError> {
    let bytes = to_csv(key, rows)?;
    store.put(key, &bytes, CSV_CONTENT_TYPE)?;
    info!(
        "Published {} rows ({} bytes) to {}",
        rows.len(),
        bytes.len(),
        key
    );
    Ok(())
}

/// Accounts first, then posts
pub fn publish(store: &impl BlobStore, datasets: &Datasets) -> Result<(), PipelineError> {
    publish_dataset(store, ACCOUNT_BLOB_KEY, &datasets.accounts)?;
    publish_dataset(store, POST_BLOB_KEY, &datasets.posts)
}
