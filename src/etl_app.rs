//! App module and interface between CLI and the API/storage clients
//! pub methods are expected to call from [`#main`]
use std::fmt;
use std::thread::sleep;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use log::{error, info};
use uuid::Uuid;

use crate::blob_store::{BlobStore, GcsBlobStore};
use crate::config::{
    require_env, PipelineConfig, BEARER_TOKEN_VAR, DATABOX_TOKEN_VAR, STORAGE_TOKEN_VAR,
};
use crate::databox_client::{DataboxClient, MetricsPusher};
use crate::error::PipelineError;
use crate::fetcher::fetch_raw;
use crate::publisher::publish;
use crate::relay::{relay, RelaySummary};
use crate::timeseries;
use crate::transform::{transform, Datasets};
use crate::twitter_client::{TwitterClient, TwitterClientTrait};

/// Steps of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Start,
    Fetch,
    Transform,
    RecordTimeseries,
    Upload,
    End,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Start => "start",
            Step::Fetch => "fetch",
            Step::Transform => "transform",
            Step::RecordTimeseries => "record_timeseries",
            Step::Upload => "upload",
            Step::End => "end",
        };
        write!(f, "{}", name)
    }
}

/// What one run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub observed_on: NaiveDate,
    pub accounts: usize,
    pub posts: usize,
    /// `None` when no timeseries table is configured
    pub timeseries_rows: Option<usize>,
    pub pushed: usize,
}

/// Runs `work` as `step` of run `run_id`, naming the step in the error
fn run_step<T>(
    run_id: &Uuid,
    step: Step,
    work: impl FnOnce() -> Result<T, PipelineError>,
) -> Result<T> {
    info!("[{}] {}", run_id, step);
    work().with_context(|| format!("run {} failed at step '{}'", run_id, step))
}

/// One full run: fetch, transform and publish, record the timeseries, upload to Databox
///
/// * tw_client: Twitter Client
/// * store: where the CSV blobs are published and read back from
/// * pusher: Databox Client
/// * observed_on: date stamped on the timeseries rows
pub fn run_pipeline(
    tw_client: &impl TwitterClientTrait,
    store: &impl BlobStore,
    pusher: &impl MetricsPusher,
    config: &PipelineConfig,
    observed_on: NaiveDate,
) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    info!("[{}] {} for {}", run_id, Step::Start, observed_on);

    let raw = run_step(&run_id, Step::Fetch, || {
        fetch_raw(tw_client, &config.account_ids, &config.post_ids)
    })?;
    let datasets = run_step(&run_id, Step::Transform, || {
        let datasets = transform(&raw)?;
        publish(store, &datasets)?;
        Ok(datasets)
    })?;
    let timeseries_rows = match &config.timeseries_key {
        Some(key) => Some(run_step(&run_id, Step::RecordTimeseries, || {
            timeseries::record(store, key, &datasets.posts, observed_on)
        })?),
        None => None,
    };
    let relayed = run_step(&run_id, Step::Upload, || relay(store, pusher))?;
    info!(
        "[{}] relayed {} accounts and {} posts",
        run_id, relayed.accounts, relayed.posts
    );

    info!("[{}] {}", run_id, Step::End);
    Ok(RunSummary {
        run_id,
        observed_on,
        accounts: datasets.accounts.len(),
        posts: datasets.posts.len(),
        timeseries_rows,
        pushed: relayed.pushed,
    })
}

/// Fetch, transform and publish without pushing anything
pub fn collect(
    tw_client: &impl TwitterClientTrait,
    store: &impl BlobStore,
    config: &PipelineConfig,
) -> Result<Datasets> {
    let raw = fetch_raw(tw_client, &config.account_ids, &config.post_ids)
        .context("Failed to fetch from the Twitter API")?;
    let datasets = transform(&raw).context("Failed to transform the responses")?;
    publish(store, &datasets).context("Failed to publish the datasets")?;
    Ok(datasets)
}

/// Push the metrics of the already published blobs
pub fn relay_only(store: &impl BlobStore, pusher: &impl MetricsPusher) -> Result<RelaySummary> {
    match relay(store, pusher) {
        Ok(summary) => Ok(summary),
        Err(e) if e.is_download_error() => {
            Err(e).context("Nothing to upload, the CSV files have not been published yet")
        }
        Err(e) => Err(e).context("Failed to upload the metrics to Databox"),
    }
}

/// Initalize the clients of a full run from the config and the environment
pub fn init_clients(
    config: &PipelineConfig,
) -> Result<(TwitterClient, GcsBlobStore, DataboxClient)> {
    let [bearer_token, storage_token, databox_token] =
        require_env([BEARER_TOKEN_VAR, STORAGE_TOKEN_VAR, DATABOX_TOKEN_VAR])?;

    let tw_client = TwitterClient::new(&config.twitter_api_base, bearer_token)?;
    let store = GcsBlobStore::new(
        &config.storage_api_base,
        config.bucket.clone(),
        storage_token,
    )?;
    let pusher = DataboxClient::new(&config.databox_api_base, databox_token)?;
    Ok((tw_client, store, pusher))
}

/// Today's date where the schedule lives
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

/// The first instant strictly after `now` whose local time is `at`
///
/// A local time skipped by a DST change moves one hour later, a repeated one takes the
/// earlier instant.
pub fn next_run_after(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    for day in now.date_naive().iter_days().take(3) {
        if let Some(candidate) = local_instant(&tz, day.and_time(at)) {
            if candidate > *now {
                return candidate;
            }
        }
    }
    *now + Duration::days(1)
}

fn local_instant(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(instant) => Some(instant),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => tz
            .from_local_datetime(&(local + Duration::hours(1)))
            .earliest(),
    }
}

/// Run once a day at the configured time, forever
///
/// A failed run is logged and the loop waits for the next trigger. Triggers missed while a run
/// was in progress are not caught up.
pub fn run_on_schedule(
    config: &PipelineConfig,
    mut run: impl FnMut(NaiveDate) -> Result<RunSummary>,
) -> Result<()> {
    let at = config.schedule_time()?;
    let tz = config.timezone()?;
    info!("Scheduled daily at {} ({})", at.format("%H:%M"), tz);

    loop {
        let now = Utc::now().with_timezone(&tz);
        let next = next_run_after(&now, at);
        info!("Next run at {}", next);
        sleep((next - now).to_std().unwrap_or(std::time::Duration::ZERO));

        run_triggered(next.date_naive(), &mut run);
    }
}

/// One scheduled run. A failure is logged and swallowed so the schedule keeps going.
fn run_triggered(
    observed_on: NaiveDate,
    run: &mut impl FnMut(NaiveDate) -> Result<RunSummary>,
) -> Option<RunSummary> {
    match run(observed_on) {
        Ok(summary) => {
            info!(
                "Run {} finished: {} accounts, {} posts, {} metrics pushed",
                summary.run_id, summary.accounts, summary.posts, summary.pushed
            );
            Some(summary)
        }
        Err(e) => {
            error!("Run for {} failed: {:?}", observed_on, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono_tz::America::Los_Angeles;
    use serde_json::{json, Value};

    use super::*;
    use crate::blob_store::{FsBlobStore, MockBlobStore};
    use crate::databox_client::MockMetricsPusher;
    use crate::publisher::{ACCOUNT_BLOB_KEY, POST_BLOB_KEY};
    use crate::twitter_client::MockTwitterClientTrait;

    fn config(timeseries_key: Option<&str>) -> PipelineConfig {
        PipelineConfig {
            account_ids: vec!["1".to_string(), "2".to_string()],
            post_ids: vec!["10".to_string()],
            bucket: "tweetstats-data".to_string(),
            timeseries_key: timeseries_key.map(String::from),
            schedule_time: "09:00".to_string(),
            timezone: "America/Los_Angeles".to_string(),
            twitter_api_base: "https://api.twitter.com".to_string(),
            storage_api_base: "https://storage.googleapis.com".to_string(),
            databox_api_base: "https://push.databox.com".to_string(),
        }
    }

    fn user(id: &str) -> Value {
        let name = if id == "1" { "A" } else { "B" };
        json!({
            "data": {
                "id": id,
                "username": name.to_lowercase(),
                "name": name,
                "public_metrics": {
                    "followers_count": 10,
                    "following_count": 5,
                    "tweet_count": 100,
                    "listed_count": 2
                }
            }
        })
    }

    fn tweet(id: &str) -> Value {
        json!({
            "data": {
                "id": id,
                "text": "launch day",
                "author_id": "1",
                "public_metrics": {
                    "retweet_count": 3,
                    "reply_count": 1,
                    "like_count": 7,
                    "quote_count": 0,
                    "impression_count": 250
                }
            }
        })
    }

    fn twitter() -> MockTwitterClientTrait {
        let mut tw_client = MockTwitterClientTrait::default();
        tw_client.expect_fetch_user().returning(|id| Ok(user(id)));
        tw_client.expect_fetch_tweet().returning(|id| Ok(tweet(id)));
        tw_client
    }

    fn counting_pusher() -> (MockMetricsPusher, Arc<Mutex<usize>>) {
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        let mut pusher = MockMetricsPusher::default();
        pusher.expect_push().returning(move |_, _| {
            *sink.lock().unwrap() += 1;
            Ok(())
        });
        (pusher, count)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
    }

    #[test]
    fn full_run_publishes_and_pushes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        let (pusher, count) = counting_pusher();

        let summary = run_pipeline(&twitter(), &store, &pusher, &config(None), day()).unwrap();
        assert_eq!(summary.accounts, 2);
        assert_eq!(summary.posts, 1);
        assert_eq!(summary.timeseries_rows, None);
        assert_eq!(summary.pushed, 12);
        assert_eq!(*count.lock().unwrap(), 12);

        let accounts = String::from_utf8(store.get(ACCOUNT_BLOB_KEY).unwrap()).unwrap();
        let lines: Vec<&str> = accounts.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "1,a,A,10,5,100,2");
    }

    #[test]
    fn identical_upstream_data_gives_identical_blobs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        let (pusher, _) = counting_pusher();
        let config = config(Some("data/tweet_timeseries.csv"));

        run_pipeline(&twitter(), &store, &pusher, &config, day()).unwrap();
        let first: Vec<Vec<u8>> = [ACCOUNT_BLOB_KEY, POST_BLOB_KEY, "data/tweet_timeseries.csv"]
            .iter()
            .map(|key| store.get(key).unwrap())
            .collect();
        let second_summary = run_pipeline(&twitter(), &store, &pusher, &config, day()).unwrap();
        let second: Vec<Vec<u8>> = [ACCOUNT_BLOB_KEY, POST_BLOB_KEY, "data/tweet_timeseries.csv"]
            .iter()
            .map(|key| store.get(key).unwrap())
            .collect();

        assert_eq!(first, second);
        assert_eq!(second_summary.timeseries_rows, Some(0));
    }

    #[test]
    fn timeseries_is_recorded_for_the_run_date() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        let (pusher, _) = counting_pusher();

        let summary = run_pipeline(
            &twitter(),
            &store,
            &pusher,
            &config(Some("data/tweet_timeseries.csv")),
            day(),
        )
        .unwrap();
        assert_eq!(summary.timeseries_rows, Some(1));

        let key = "data/tweet_timeseries.csv";
        let table = timeseries::TimeseriesTable::load(&store, key).unwrap();
        assert_eq!(table.rows()[0].post_id, "10");
        assert_eq!(table.rows()[0].favorite_count, 7);
        assert_eq!(table.rows()[0].date, day());
    }

    #[test]
    fn broken_response_aborts_before_storage_and_push() {
        let mut tw_client = MockTwitterClientTrait::default();
        tw_client.expect_fetch_user().returning(|id| Ok(user(id)));
        let no_metrics = json!({ "data": { "id": "10", "text": "no metrics" } });
        tw_client
            .expect_fetch_tweet()
            .returning(move |_| Ok(no_metrics.clone()));
        let mut store = MockBlobStore::default();
        store.expect_put().times(0);
        store.expect_get().times(0);
        let mut pusher = MockMetricsPusher::default();
        pusher.expect_push().times(0);

        let result = run_pipeline(&tw_client, &store, &pusher, &config(None), day());
        let err = result.unwrap_err();
        assert!(format!("{}", err).contains("'transform'"), "{}", err);
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingField { .. })
        ));
    }

    #[test]
    fn collect_writes_without_pushing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        let datasets = collect(&twitter(), &store, &config(None)).unwrap();
        assert_eq!(datasets.accounts.len(), 2);
        assert!(dir.path().join("data").join("tweet_data.csv").exists());
    }

    #[test]
    fn relay_only_needs_published_blobs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        let mut pusher = MockMetricsPusher::default();
        pusher.expect_push().times(0);

        let err = relay_only(&store, &pusher).unwrap_err();
        let cause = err.downcast_ref::<PipelineError>().unwrap();
        assert!(cause.is_download_error());
    }

    #[test]
    fn next_run_is_later_today() {
        let now = Los_Angeles.with_ymd_and_hms(2023, 3, 1, 7, 30, 0).unwrap();
        let at = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert_eq!(
            next_run_after(&now, at),
            Los_Angeles.with_ymd_and_hms(2023, 3, 1, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn next_run_is_tomorrow_once_the_time_has_passed() {
        let at = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let exactly = Los_Angeles.with_ymd_and_hms(2023, 3, 1, 9, 0, 0).unwrap();
        let late = Los_Angeles.with_ymd_and_hms(2023, 3, 1, 23, 0, 0).unwrap();
        let tomorrow = Los_Angeles.with_ymd_and_hms(2023, 3, 2, 9, 0, 0).unwrap();
        assert_eq!(next_run_after(&exactly, at), tomorrow);
        assert_eq!(next_run_after(&late, at), tomorrow);
    }

    #[test]
    fn skipped_local_time_moves_an_hour_later() {
        // 2023-03-12 02:30 does not exist in Los Angeles
        let now = Los_Angeles.with_ymd_and_hms(2023, 3, 12, 0, 0, 0).unwrap();
        let at = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        assert_eq!(
            next_run_after(&now, at),
            Los_Angeles.with_ymd_and_hms(2023, 3, 12, 3, 30, 0).unwrap()
        );
    }

    #[test]
    fn failed_scheduled_run_does_not_stop_the_next() {
        let mut calls = Vec::new();
        let mut run = |observed_on: NaiveDate| {
            calls.push(observed_on);
            if calls.len() == 1 {
                return Err(anyhow::anyhow!("upstream down"));
            }
            Ok(RunSummary {
                run_id: Uuid::new_v4(),
                observed_on,
                accounts: 2,
                posts: 2,
                timeseries_rows: None,
                pushed: 16,
            })
        };

        assert!(run_triggered(day(), &mut run).is_none());
        let next_day = day().succ_opt().unwrap();
        let summary = run_triggered(next_day, &mut run).unwrap();
        assert_eq!(summary.observed_on, next_day);
        assert_eq!(calls, vec![day(), next_day]);
    }

    #[test]
    fn step_names_match_the_run_order() {
        let names: Vec<String> = [
            Step::Start,
            Step::Fetch,
            Step::Transform,
            Step::RecordTimeseries,
            Step::Upload,
            Step::End,
        ]
        .iter()
        .map(|step| step.to_string())
        .collect();
        assert_eq!(
            names,
            vec![
                "start",
                "fetch",
                "transform",
                "record_timeseries",
                "upload",
                "end"
            ]
        );
    }
}
