//! CLI tool that collects Twitter statistics into Cloud Storage and relays them to Databox
use anyhow::anyhow;
use env_logger::Env;
use log::info;
use std::path::PathBuf;
use structopt::StructOpt;

mod blob_store;
mod cli;
mod config;
mod databox_client;
mod dataset;
mod error;
mod etl_app;
mod fetcher;
mod publisher;
mod relay;
mod timeseries;
mod transform;
mod twitter_client;
mod twitter_object;

use blob_store::FsBlobStore;
use cli::{Action::*, CommandLineArgs};
use config::{require_env, PipelineConfig, BEARER_TOKEN_VAR, DATABOX_TOKEN_VAR, STORAGE_TOKEN_VAR};
use databox_client::DataboxClient;
use twitter_client::TwitterClient;

/// Entrypoint Function
///
/// It will use the following environment variables
/// * `TWEETSTATS_LOG_LEVEL` Log level setting e.g. `TWEETSTATS_LOG_LEVEL=tweetstats=debug`
/// * `TWEETSTATS_BEARER_TOKEN` Bearer Token for the Twitter API
/// * `TWEETSTATS_STORAGE_TOKEN` OAuth access token for Cloud Storage
/// * `TWEETSTATS_DATABOX_TOKEN` Databox push token
fn main() -> anyhow::Result<()> {
    let env = Env::default().filter_or("TWEETSTATS_LOG_LEVEL", "info");
    env_logger::init_from_env(env);

    let CommandLineArgs {
        action,
        config_file,
    } = CommandLineArgs::from_args();

    let config_file = config_file
        .or_else(find_default_config_file)
        .ok_or(anyhow!("Failed to find config file."))?;
    let config = PipelineConfig::load(&config_file)?;

    match action {
        Run { date } => {
            let (tw_client, store, pusher) = etl_app::init_clients(&config)?;
            let observed_on = match date {
                Some(date) => date,
                None => etl_app::today_in(config.timezone()?),
            };
            let summary = etl_app::run_pipeline(&tw_client, &store, &pusher, &config, observed_on)?;
            info!(
                "Run {} for {} completed, {} timeseries rows added",
                summary.run_id,
                summary.observed_on,
                summary.timeseries_rows.unwrap_or(0)
            );
        }
        Collect { out_dir } => {
            let [bearer_token] = require_env([BEARER_TOKEN_VAR])?;
            let tw_client = TwitterClient::new(&config.twitter_api_base, bearer_token)?;
            let store = FsBlobStore::new(&out_dir);
            etl_app::collect(&tw_client, &store, &config)?;
            info!("CSV files are written in {}", out_dir.display());
        }
        Relay => {
            let [storage_token, databox_token] =
                require_env([STORAGE_TOKEN_VAR, DATABOX_TOKEN_VAR])?;
            let store = blob_store::GcsBlobStore::new(
                &config.storage_api_base,
                config.bucket.clone(),
                storage_token,
            )?;
            let pusher = DataboxClient::new(&config.databox_api_base, databox_token)?;
            etl_app::relay_only(&store, &pusher)?;
        }
        Schedule => {
            let (tw_client, store, pusher) = etl_app::init_clients(&config)?;
            etl_app::run_on_schedule(&config, |observed_on| {
                etl_app::run_pipeline(&tw_client, &store, &pusher, &config, observed_on)
            })?;
        }
    }
    Ok(())
}

/// Get the default path of the config file
/// It assumes the file is in your home dir
fn find_default_config_file() -> Option<PathBuf> {
    let default_path = ".tweetstats.json";
    home::home_dir().map(|mut path| {
        path.push(default_path);
        path
    })
}
