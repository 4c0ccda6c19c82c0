//! Databox push API client
use std::time::Duration;

use log::debug;
use serde_json::{json, Map, Value};
use url::Url;

use crate::error::PipelineError;

#[cfg(test)]
use mockall::automock;
#[cfg_attr(test, automock)]
pub trait MetricsPusher {
    /// Push one data point of `metric`
    fn push(&self, metric: &str, value: u64) -> Result<(), PipelineError>;
}

/// Databox Client
/// The push token is sent as the basic auth user with an empty password
pub struct DataboxClient {
    agent: ureq::Agent,
    server: Url,
    token: String,
}

impl DataboxClient {
    /// * api_base: e.g. `https://push.databox.com`
    /// * token: push token of the data source
    pub fn new(api_base: &str, token: String) -> Result<Self, PipelineError> {
        let server = Url::parse(api_base).map_err(|e| {
            PipelineError::Config(format!("databox_api_base '{}': {}", api_base, e))
        })?;
        let agent: ureq::Agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(5))
            .timeout_write(Duration::from_secs(5))
            .build();

        Ok(DataboxClient {
            agent,
            server,
            token,
        })
    }

    fn authorization(&self) -> String {
        format!("Basic {}", base64::encode(format!("{}:", self.token)))
    }
}

/// `{"data": [{"$<metric>": value}]}`
fn data_point(metric: &str, value: u64) -> Value {
    let mut point = Map::new();
    point.insert(format!("${}", metric), Value::from(value));
    json!({ "data": [Value::Object(point)] })
}

impl MetricsPusher for DataboxClient {
    fn push(&self, metric: &str, value: u64) -> Result<(), PipelineError> {
        debug!("push {}={}", metric, value);
        let result = self
            .agent
            .request_url("POST", &self.server)
            .set("Authorization", &self.authorization())
            .set("Accept", "application/vnd.databox.v2+json")
            .send_json(data_point(metric, value));

        match result {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, res)) => Err(PipelineError::MetricsPush {
                metric: metric.to_string(),
                reason: format!("status {}: {}", code, res.into_string().unwrap_or_default()),
            }),
            Err(e) => Err(PipelineError::MetricsPush {
                metric: metric.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
