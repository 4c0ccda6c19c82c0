//! Flat rows produced by the transformer and their CSV form
//!
//! The column order of each dataset is fixed by [`Tabular::COLUMNS`]. The header row is written
//! explicitly so that an empty dataset still round-trips with its column names.
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::PipelineError;

/// A row type with a fixed, ordered column set
pub trait Tabular: Serialize + DeserializeOwned {
    const COLUMNS: &'static [&'static str];
}

/// One row of `user_data.csv`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    #[serde(rename = "user_id")]
    pub account_id: String,
    pub username: String,
    #[serde(rename = "name")]
    pub display_name: String,
    pub followers_count: u64,
    pub following_count: u64,
    #[serde(rename = "tweet_count")]
    pub post_count: u64,
    pub listed_count: u64,
}

impl Tabular for AccountRecord {
    const COLUMNS: &'static [&'static str] = &[
        "user_id",
        "username",
        "name",
        "followers_count",
        "following_count",
        "tweet_count",
        "listed_count",
    ];
}

/// One row of `tweet_data.csv`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    #[serde(rename = "tweet_id")]
    pub post_id: String,
    pub text: String,
    pub retweet_count: u64,
    pub reply_count: u64,
    pub like_count: u64,
    pub quote_count: u64,
    pub impression_count: u64,
}

impl Tabular for PostRecord {
    const COLUMNS: &'static [&'static str] = &[
        "tweet_id",
        "text",
        "retweet_count",
        "reply_count",
        "like_count",
        "quote_count",
        "impression_count",
    ];
}

/// Header row plus one line per row, in slice order
pub fn to_csv<T: Tabular>(key: &str, rows: &[T]) -> Result<Vec<u8>, PipelineError> {
    let csv_error = |source: csv::Error| PipelineError::Csv {
        key: key.to_string(),
        source,
    };

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(T::COLUMNS).map_err(csv_error)?;
    for row in rows {
        writer.serialize(row).map_err(csv_error)?;
    }
    writer
        .into_inner()
        .map_err(|e| csv_error(e.into_error().into()))
}

/// Rows are read by column name, so a reordered file still lands in the right fields
pub fn from_csv<T: Tabular>(key: &str, bytes: &[u8]) -> Result<Vec<T>, PipelineError> {
    let csv_error = |source: csv::Error| PipelineError::Csv {
        key: key.to_string(),
        source,
    };

    let mut reader = csv::Reader::from_reader(bytes);
    let headers = reader.headers().map_err(csv_error)?;
    let mut found: Vec<&str> = headers.iter().collect();
    let mut expected: Vec<&str> = T::COLUMNS.to_vec();
    found.sort_unstable();
    expected.sort_unstable();
    if found != expected {
        return Err(PipelineError::UnexpectedColumns {
            key: key.to_string(),
            found: headers.iter().map(String::from).collect(),
            expected: T::COLUMNS.iter().map(|c| c.to_string()).collect(),
        });
    }

    reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .map_err(csv_error)
}
