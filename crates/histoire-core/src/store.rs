//! Shard stores.
//!
//! A shard is the text blob for one `(user, era)` pair, addressed as
//! `{root}/{user}/{user}.{era}.txt`. Absence is the common case (most users
//! post nothing in most eras) and is reported as [`ShardFetch::Absent`],
//! never as an error. Every call is exactly one read; retries belong to the
//! caller.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

/// Result of one shard read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardFetch {
    /// The shard exists; its full text.
    Found(String),
    /// No shard for this user and era.
    Absent,
}

/// A shard read that neither succeeded nor reported absence.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The server answered with a status other than success or not-found.
    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// No response at all (DNS, connect, TLS, timeout).
    #[error("GET {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The response arrived but its body could not be read.
    #[error("reading body of {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: io::Error,
    },

    /// A local shard file exists but could not be read.
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Relative address of a shard: `{user}/{user}.{era}.txt`.
#[must_use]
pub fn shard_path(user: &str, era: i64) -> String {
    format!("{user}/{user}.{era}.txt")
}

/// Backend that can read one shard.
///
/// Implementations are shared by reference across fetch tasks, hence the
/// `Send + Sync` bound.
pub trait ShardStore: Send + Sync {
    /// Read the shard for `user` in `era`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] for any failure other than absence.
    fn fetch(&self, user: &str, era: i64) -> Result<ShardFetch, FetchError>;

    /// Human-readable location of a shard, for logs and output.
    fn locate(&self, user: &str, era: i64) -> String;
}

/// How an HTTP status is treated by shard reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Found,
    Absent,
    Failed,
}

/// Classify a shard response status.
#[must_use]
pub const fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Found,
        404 => StatusClass::Absent,
        _ => StatusClass::Failed,
    }
}

/// Build the blocking HTTP agent shared by all remote reads.
#[must_use]
pub fn http_agent(timeout: Duration, user_agent: &str) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Shards served over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpShardStore {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpShardStore {
    #[must_use]
    pub fn new(agent: ureq::Agent, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { agent, base_url }
    }

    #[must_use]
    pub fn url(&self, user: &str, era: i64) -> String {
        format!("{}/{}", self.base_url, shard_path(user, era))
    }
}

impl ShardStore for HttpShardStore {
    fn fetch(&self, user: &str, era: i64) -> Result<ShardFetch, FetchError> {
        let url = self.url(user, era);
        let response = match self.agent.get(&url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return match classify_status(status) {
                    StatusClass::Absent => {
                        debug!(%url, "shard absent");
                        Ok(ShardFetch::Absent)
                    }
                    StatusClass::Found | StatusClass::Failed => {
                        Err(FetchError::Status { url, status })
                    }
                };
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(FetchError::Transport {
                    url,
                    message: transport.to_string(),
                });
            }
        };

        let status = response.status();
        if classify_status(status) != StatusClass::Found {
            return Err(FetchError::Status { url, status });
        }

        let body = response
            .into_string()
            .map_err(|source| FetchError::Body {
                url: url.clone(),
                source,
            })?;
        debug!(%url, bytes = body.len(), "shard fetched");
        Ok(ShardFetch::Found(body))
    }

    fn locate(&self, user: &str, era: i64) -> String {
        self.url(user, era)
    }
}

// ---------------------------------------------------------------------------
// Local directory
// ---------------------------------------------------------------------------

/// Shards read from a local checkout of the store.
#[derive(Debug, Clone)]
pub struct DirShardStore {
    root: PathBuf,
}

impl DirShardStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn path(&self, user: &str, era: i64) -> PathBuf {
        self.root.join(user).join(format!("{user}.{era}.txt"))
    }
}

impl ShardStore for DirShardStore {
    fn fetch(&self, user: &str, era: i64) -> Result<ShardFetch, FetchError> {
        let path = self.path(user, era);
        match std::fs::read_to_string(&path) {
            Ok(body) => {
                debug!(path = %path.display(), bytes = body.len(), "shard read");
                Ok(ShardFetch::Found(body))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(ShardFetch::Absent),
            Err(source) => Err(FetchError::Io { path, source }),
        }
    }

    fn locate(&self, user: &str, era: i64) -> String {
        self.path(user, era).display().to_string()
    }
}

// ---------------------------------------------------------------------------
// Location parsing
// ---------------------------------------------------------------------------

/// Where shards live, as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    Http(String),
    Dir(PathBuf),
}

impl StoreLocation {
    /// `http://` and `https://` URLs are remote; anything else is a local
    /// directory, with an optional `file://` prefix.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Self::Http(raw.to_string())
        } else {
            Self::Dir(PathBuf::from(raw.strip_prefix("file://").unwrap_or(raw)))
        }
    }

    /// Open a store for this location.
    #[must_use]
    pub fn open(&self, agent: &ureq::Agent) -> Box<dyn ShardStore> {
        match self {
            Self::Http(url) => Box::new(HttpShardStore::new(agent.clone(), url.clone())),
            Self::Dir(root) => Box::new(DirShardStore::new(root.clone())),
        }
    }
}
