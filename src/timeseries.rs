//! Append-only history of tweet engagement, one row per tweet per day
//!
//! The table is a CSV blob with the columns `id, tweet_id, retweet_count, favorite_count, date`.
//! `id` is a surrogate key handed out by [`TimeseriesTable::append`].
use std::collections::HashSet;

use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::blob_store::BlobStore;
use crate::dataset::{from_csv, to_csv, PostRecord, Tabular};
use crate::error::PipelineError;
use crate::publisher::CSV_CONTENT_TYPE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostTimeseriesRow {
    #[serde(rename = "id")]
    pub row_id: u64,
    #[serde(rename = "tweet_id")]
    pub post_id: String,
    pub retweet_count: u64,
    pub favorite_count: u64,
    pub date: NaiveDate,
}

impl Tabular for PostTimeseriesRow {
    const COLUMNS: &'static [&'static str] =
        &["id", "tweet_id", "retweet_count", "favorite_count", "date"];
}

/// In-memory copy of the table stored under `key`
#[derive(Debug)]
pub struct TimeseriesTable {
    key: String,
    rows: Vec<PostTimeseriesRow>,
}

impl TimeseriesTable {
    /// A missing blob is an empty table, the first run creates it
    pub fn load(store: &impl BlobStore, key: &str) -> Result<Self, PipelineError> {
        let rows = match store.get(key) {
            Ok(bytes) => from_csv(key, &bytes)?,
            Err(PipelineError::BlobNotFound { .. }) => {
                debug!("{} does not exist yet, starting an empty table", key);
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        Ok(TimeseriesTable {
            key: key.to_string(),
            rows,
        })
    }

    pub fn rows(&self) -> &[PostTimeseriesRow] {
        &self.rows
    }

    /// Adds one row per post observed on `date` and returns how many were added.
    /// A (tweet, date) pair that is already recorded is left as it is.
    pub fn append(&mut self, posts: &[PostRecord], date: NaiveDate) -> usize {
        let mut recorded: HashSet<(String, NaiveDate)> = self
            .rows
            .iter()
            .map(|row| (row.post_id.clone(), row.date))
            .collect();
        let mut next_id = self.rows.iter().map(|row| row.row_id).max().unwrap_or(0) + 1;

        let mut appended = 0;
        for post in posts {
            if !recorded.insert((post.post_id.clone(), date)) {
                warn!(
                    "tweet {} already has a row for {}, skipped",
                    post.post_id, date
                );
                continue;
            }
            self.rows.push(PostTimeseriesRow {
                row_id: next_id,
                post_id: post.post_id.clone(),
                retweet_count: post.retweet_count,
                favorite_count: post.like_count,
                date,
            });
            next_id += 1;
            appended += 1;
        }
        appended
    }

    /// Overwrites the blob with the whole table
    pub fn save(&self, store: &impl BlobStore) -> Result<(), PipelineError> {
        let bytes = to_csv(&self.key, &self.rows)?;
        store.put(&self.key, &bytes, CSV_CONTENT_TYPE)?;
        info!("Saved {} timeseries rows to {}", self.rows.len(), self.key);
        Ok(())
    }
}

/// Load, append the run's posts, save
pub fn record(
    store: &impl BlobStore,
    key: &str,
    posts: &[PostRecord],
    date: NaiveDate,
) -> Result<usize, PipelineError> {
    let mut table = TimeseriesTable::load(store, key)?;
    let appended = table.append(posts, date);
    if appended > 0 {
        table.save(store)?;
    }
    debug!("{} holds {} rows", key, table.rows().len());
    Ok(appended)
}
