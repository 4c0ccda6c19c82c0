//! Object storage clients
//! Google Cloud Storage for the scheduled runs, a local directory for `collect` and tests
use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use log::debug;
use url::Url;

use crate::error::PipelineError;

#[cfg(test)]
use mockall::automock;
#[cfg_attr(test, automock)]
pub trait BlobStore {
    /// Write `bytes` under `key`, replacing whatever was there
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), PipelineError>;
    /// Fails with [`PipelineError::BlobNotFound`] when nothing is stored under `key`
    fn get(&self, key: &str) -> Result<Vec<u8>, PipelineError>;
}

/// Google Cloud Storage JSON API client
/// It needs an OAuth access token with write access to the bucket
pub struct GcsBlobStore {
    agent: ureq::Agent,
    server: Url,
    bucket: String,
    access_token: String,
}

impl GcsBlobStore {
    /// * api_base: e.g. `https://storage.googleapis.com`
    /// * bucket: bucket name, without `gs://`
    /// * access_token: OAuth access token
    pub fn new(
        api_base: &str,
        bucket: String,
        access_token: String,
    ) -> Result<Self, PipelineError> {
        let server = Url::parse(api_base).map_err(|e| {
            PipelineError::Config(format!("storage_api_base '{}': {}", api_base, e))
        })?;
        if server.cannot_be_a_base() {
            return Err(PipelineError::Config(format!(
                "storage_api_base '{}' cannot be a base",
                api_base
            )));
        }
        let agent: ureq::Agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(30))
            .timeout_write(Duration::from_secs(30))
            .build();

        Ok(GcsBlobStore {
            agent,
            server,
            bucket,
            access_token,
        })
    }

    fn with_segments(&self, segments: &[&str]) -> Url {
        let mut url = self.server.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn upload_url(&self, key: &str) -> Url {
        let bucket = self.bucket.as_str();
        let mut url = self.with_segments(&["upload", "storage", "v1", "b", bucket, "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);
        url
    }

    /// The object name is a single escaped segment, `/` included
    fn download_url(&self, key: &str) -> Url {
        let bucket = self.bucket.as_str();
        let mut url = self.with_segments(&["storage", "v1", "b", bucket, "o", key]);
        url.query_pairs_mut().append_pair("alt", "media");
        url
    }

    fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl BlobStore for GcsBlobStore {
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), PipelineError> {
        let url = self.upload_url(key);
        debug!("POST {} ({} bytes)", url, bytes.len());
        let result = self
            .agent
            .request_url("POST", &url)
            .set("Authorization", &self.authorization())
            .set("Content-Type", content_type)
            .send_bytes(bytes);

        match result {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, res)) => Err(PipelineError::StorageWrite {
                key: key.to_string(),
                reason: format!("status {}: {}", code, res.into_string().unwrap_or_default()),
            }),
            Err(e) => Err(PipelineError::StorageWrite {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, PipelineError> {
        let url = self.download_url(key);
        debug!("GET {}", url);
        let response = match self
            .agent
            .request_url("GET", &url)
            .set("Authorization", &self.authorization())
            .call()
        {
            Ok(res) => res,
            Err(ureq::Error::Status(404, _)) => {
                return Err(PipelineError::BlobNotFound {
                    key: key.to_string(),
                })
            }
            Err(ureq::Error::Status(code, res)) => {
                return Err(PipelineError::Download {
                    key: key.to_string(),
                    reason: format!("status {}: {}", code, res.into_string().unwrap_or_default()),
                })
            }
            Err(e) => {
                return Err(PipelineError::Download {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| PipelineError::Download {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        Ok(bytes)
    }
}

/// Keys are relative paths under `root`
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsBlobStore { root: root.into() }
    }

    /// Only plain relative keys, nothing that could leave `root`
    fn path_of(&self, key: &str) -> Option<PathBuf> {
        let relative = Path::new(key);
        let is_plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !is_plain {
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<(), PipelineError> {
        let write_error = |reason: String| PipelineError::StorageWrite {
            key: key.to_string(),
            reason,
        };
        let path = self
            .path_of(key)
            .ok_or_else(|| write_error("key is not a relative path".to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_error(e.to_string()))?;
        }
        debug!("write {} ({} bytes)", path.display(), bytes.len());
        fs::write(&path, bytes).map_err(|e| write_error(e.to_string()))
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, PipelineError> {
        let path = self.path_of(key).ok_or_else(|| PipelineError::Download {
            key: key.to_string(),
            reason: "key is not a relative path".to_string(),
        })?;
        debug!("read {}", path.display());
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PipelineError::BlobNotFound {
                key: key.to_string(),
            },
            _ => PipelineError::Download {
                key: key.to_string(),
                reason: e.to_string(),
            },
        })
    }
}
