//! Definition of CLI commands/sub commands + its option parameters
use std::path::PathBuf;

use chrono::NaiveDate;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "tweetstats",
    about = "Collect Twitter account and tweet statistics and relay them to Databox"
)]
pub struct CommandLineArgs {
    #[structopt(subcommand)]
    pub action: Action,

    /// Use a different config file.
    #[structopt(parse(from_os_str), short, long)]
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, StructOpt)]
pub enum Action {
    #[structopt(about = "Run the whole pipeline once")]
    Run {
        #[structopt(
            short,
            long,
            help = "Date stamped on the timeseries rows e.g. 2023-01-01, today by default"
        )]
        date: Option<NaiveDate>,
    },
    #[structopt(
        about = "Fetch and transform only, the CSV files are written in a local directory instead of the bucket"
    )]
    Collect {
        #[structopt(parse(from_os_str), short, long, help = "Directory for the CSV files")]
        out_dir: PathBuf,
    },
    #[structopt(about = "Upload the metrics of the already published CSV files to Databox")]
    Relay,
    #[structopt(about = "Run the whole pipeline every day at the configured time")]
    Schedule,
}
