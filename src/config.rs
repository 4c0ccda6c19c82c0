//! Pipeline configuration
//! Ids and endpoints come from a JSON file, tokens from the environment
use std::env;
use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::publisher::{ACCOUNT_BLOB_KEY, POST_BLOB_KEY};

/// Twitter API Bearer Token
pub const BEARER_TOKEN_VAR: &str = "TWEETSTATS_BEARER_TOKEN";
/// OAuth access token for Cloud Storage
pub const STORAGE_TOKEN_VAR: &str = "TWEETSTATS_STORAGE_TOKEN";
/// Databox push token
pub const DATABOX_TOKEN_VAR: &str = "TWEETSTATS_DATABOX_TOKEN";

/// Contents of `~/.tweetstats.json`, e.g.
/// ```json
/// {
///   "account_ids": ["2244994945"],
///   "post_ids": ["1460323737035677698"],
///   "bucket": "tweetstats-data",
///   "timeseries_key": "data/tweet_timeseries.csv"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub account_ids: Vec<String>,
    pub post_ids: Vec<String>,
    pub bucket: String,
    /// Table of daily tweet counts, not recorded when absent
    #[serde(default)]
    pub timeseries_key: Option<String>,
    /// Local time of the daily run, `HH:MM`
    #[serde(default = "default_schedule_time")]
    pub schedule_time: String,
    /// IANA name, e.g. `America/Los_Angeles`
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_twitter_api_base")]
    pub twitter_api_base: String,
    #[serde(default = "default_storage_api_base")]
    pub storage_api_base: String,
    #[serde(default = "default_databox_api_base")]
    pub databox_api_base: String,
}

fn default_schedule_time() -> String {
    "09:00".to_string()
}

fn default_timezone() -> String {
    "America/Los_Angeles".to_string()
}

fn default_twitter_api_base() -> String {
    "https://api.twitter.com".to_string()
}

fn default_storage_api_base() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_databox_api_base() -> String {
    "https://push.databox.com".to_string()
}

impl PipelineConfig {
    /// Load and validate the config file
    /// * config_path: path of the JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .open(config_path)
            .with_context(|| format!("Failed to open config file {}", config_path.display()))?;
        let config: PipelineConfig = serde_json::from_reader(file)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.bucket.trim().is_empty() {
            return Err(PipelineError::Config("bucket is empty".to_string()));
        }
        if let Some(key) = &self.timeseries_key {
            if key.trim().is_empty() {
                return Err(PipelineError::Config("timeseries_key is empty".to_string()));
            }
            if key == ACCOUNT_BLOB_KEY || key == POST_BLOB_KEY {
                return Err(PipelineError::Config(format!(
                    "timeseries_key '{}' would overwrite a published dataset",
                    key
                )));
            }
        }
        self.schedule_time()?;
        self.timezone()?;
        Ok(())
    }

    pub fn schedule_time(&self) -> Result<NaiveTime, PipelineError> {
        NaiveTime::parse_from_str(&self.schedule_time, "%H:%M").map_err(|e| {
            PipelineError::Config(format!("schedule_time '{}': {}", self.schedule_time, e))
        })
    }

    pub fn timezone(&self) -> Result<Tz, PipelineError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| PipelineError::Config(format!("timezone '{}': {}", self.timezone, e)))
    }
}

/// Read the named variables, failing with every missing name at once
pub fn require_env<const N: usize>(names: [&str; N]) -> Result<[String; N], PipelineError> {
    require_from(names, |name| env::var(name).ok())
}

fn require_from<const N: usize>(
    names: [&str; N],
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<[String; N], PipelineError> {
    let mut values = Vec::with_capacity(N);
    let mut missing = Vec::new();
    for name in names {
        match lookup(name).filter(|value| !value.trim().is_empty()) {
            Some(value) => values.push(value),
            None => missing.push(name),
        }
    }
    if !missing.is_empty() {
        return Err(PipelineError::Config(format!(
            "Please confirm the following environment values are defined: {}",
            missing.join(", ")
        )));
    }
    values.try_into().map_err(|values: Vec<String>| {
        PipelineError::Config(format!("expected {} values, got {}", N, values.len()))
    })
}
