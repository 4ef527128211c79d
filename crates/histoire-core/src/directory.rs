//! User directory with conditional refresh.
//!
//! The set of known users is the list of top-level directories in the shard
//! store. Fetching it is comparatively expensive, so the last listing is
//! persisted together with its freshness token (an `ETag`) and revalidated
//! with `If-None-Match` on refresh.
//!
//! # Refresh states
//!
//! ```text
//! FETCHING ─┬─> SUCCESS       persist {users, token}, return listing
//!           ├─> NOT_MODIFIED  return persisted listing
//!           └─> ERROR         log, return persisted listing or default user
//! ```
//!
//! Refresh never fails: a directory outage degrades the feed, it does not
//! block it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::lock::{CacheLock, LockError};
use crate::timing;

const CACHE_FILE: &str = "directory.json";
const LOCK_FILE: &str = "directory.lock";
const LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Persisted listing. The users and their token are stored as one document
/// so they can never be read back out of sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub users: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DirectoryStoreError {
    #[error("directory cache I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("directory cache at {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl DirectoryStoreError {
    #[must_use]
    pub const fn code(&self) -> crate::error::ErrorCode {
        match self {
            Self::Io { .. } => crate::error::ErrorCode::DirectoryCacheWriteFailed,
            Self::Corrupt { .. } => crate::error::ErrorCode::DirectoryCacheCorrupt,
            Self::Lock(err) => err.code(),
        }
    }
}

/// Durable key-value home for the directory listing.
pub trait DirectoryStore: Send + Sync {
    /// Read the persisted entry, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryStoreError`] if the entry exists but cannot be read.
    fn load(&self) -> Result<Option<DirectoryEntry>, DirectoryStoreError>;

    /// Replace the persisted entry as one unit.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryStoreError`] if the entry cannot be written.
    fn save(&self, entry: &DirectoryEntry) -> Result<(), DirectoryStoreError>;

    /// Drop the persisted entry. Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryStoreError`] if the entry cannot be removed.
    fn clear(&self) -> Result<bool, DirectoryStoreError>;
}

/// Entry stored as JSON under a cache directory.
///
/// Writes go to a temporary sibling and are renamed into place while holding
/// an exclusive advisory lock, so concurrent `hist` processes never observe
/// a half-written listing.
#[derive(Debug, Clone)]
pub struct FileDirectoryStore {
    dir: PathBuf,
}

impl FileDirectoryStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    fn io_err(path: &Path) -> impl FnOnce(io::Error) -> DirectoryStoreError + '_ {
        move |source| DirectoryStoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl DirectoryStore for FileDirectoryStore {
    fn load(&self) -> Result<Option<DirectoryEntry>, DirectoryStoreError> {
        let path = self.path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Self::io_err(&path)(err)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| DirectoryStoreError::Corrupt { path, source })
    }

    fn save(&self, entry: &DirectoryEntry) -> Result<(), DirectoryStoreError> {
        let path = self.path();
        fs::create_dir_all(&self.dir).map_err(Self::io_err(&self.dir))?;
        let _lock = CacheLock::acquire(&self.lock_path(), LOCK_TIMEOUT)?;

        let body = serde_json::to_string_pretty(entry).map_err(|source| {
            DirectoryStoreError::Corrupt {
                path: path.clone(),
                source,
            }
        })?;
        let staging = self.dir.join(format!("{CACHE_FILE}.tmp"));
        fs::write(&staging, body).map_err(Self::io_err(&staging))?;
        fs::rename(&staging, &path).map_err(Self::io_err(&path))?;
        Ok(())
    }

    fn clear(&self) -> Result<bool, DirectoryStoreError> {
        let path = self.path();
        if !path.exists() {
            return Ok(false);
        }
        let _lock = CacheLock::acquire(&self.lock_path(), LOCK_TIMEOUT)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(Self::io_err(&path)(err)),
        }
    }
}

/// In-process store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryDirectoryStore {
    entry: Mutex<Option<DirectoryEntry>>,
}

impl MemoryDirectoryStore {
    #[must_use]
    pub fn with_entry(entry: DirectoryEntry) -> Self {
        Self {
            entry: Mutex::new(Some(entry)),
        }
    }
}

impl DirectoryStore for MemoryDirectoryStore {
    fn load(&self) -> Result<Option<DirectoryEntry>, DirectoryStoreError> {
        Ok(self.entry.lock().ok().and_then(|entry| entry.clone()))
    }

    fn save(&self, entry: &DirectoryEntry) -> Result<(), DirectoryStoreError> {
        if let Ok(mut slot) = self.entry.lock() {
            *slot = Some(entry.clone());
        }
        Ok(())
    }

    fn clear(&self) -> Result<bool, DirectoryStoreError> {
        Ok(self
            .entry
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .is_some())
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Outcome of one conditional listing read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingResponse {
    /// Fresh listing (raw entry names, sentinels included).
    Modified {
        names: Vec<String>,
        freshness_token: Option<String>,
    },
    /// The precondition matched; the persisted listing is current.
    NotModified,
    /// Any other status, an unreadable body, or no response at all.
    Failed {
        status: Option<u16>,
        message: String,
    },
}

/// Backend that can list the users of a store.
pub trait DirectorySource: Send + Sync {
    /// Read the listing, sending `freshness_token` as a precondition if given.
    ///
    /// Never fails: transport errors are reported as
    /// [`ListingResponse::Failed`].
    fn fetch_listing(&self, freshness_token: Option<&str>) -> ListingResponse;
}

#[derive(Debug, Deserialize)]
struct ListingItem {
    name: String,
}

/// Parse a contents-API body: a JSON array of objects with a `name`.
///
/// # Errors
///
/// Returns the JSON error if the body is not such an array.
pub fn parse_listing(body: &str) -> Result<Vec<String>, serde_json::Error> {
    let items: Vec<ListingItem> = serde_json::from_str(body)?;
    Ok(items.into_iter().map(|item| item.name).collect())
}

/// Human-readable message for a failed listing response.
///
/// Prefers the `message` field of a JSON error body, then the raw body, then
/// the bare status.
#[must_use]
pub fn error_message(status: Option<u16>, body: &str) -> String {
    let structured = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        });
    if let Some(message) = structured {
        return message;
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    status.map_or_else(|| "no response".to_string(), |code| format!("HTTP {code}"))
}

/// Listing served by a GitHub-style contents endpoint.
#[derive(Debug, Clone)]
pub struct GitHubDirectory {
    agent: ureq::Agent,
    url: String,
}

impl GitHubDirectory {
    #[must_use]
    pub fn new(agent: ureq::Agent, url: impl Into<String>) -> Self {
        Self {
            agent,
            url: url.into(),
        }
    }
}

impl DirectorySource for GitHubDirectory {
    fn fetch_listing(&self, freshness_token: Option<&str>) -> ListingResponse {
        let mut request = self
            .agent
            .get(&self.url)
            .set("Accept", "application/vnd.github+json");
        if let Some(token) = freshness_token {
            request = request.set("If-None-Match", token);
        }

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                return ListingResponse::Failed {
                    status: Some(status),
                    message: error_message(Some(status), &body),
                };
            }
            Err(ureq::Error::Transport(transport)) => {
                return ListingResponse::Failed {
                    status: None,
                    message: transport.to_string(),
                };
            }
        };

        let status = response.status();
        if status == 304 {
            return ListingResponse::NotModified;
        }

        let freshness_token = response.header("ETag").map(str::to_string);
        let body = match response.into_string() {
            Ok(body) => body,
            Err(err) => {
                return ListingResponse::Failed {
                    status: Some(status),
                    message: format!("reading listing body: {err}"),
                };
            }
        };

        match parse_listing(&body) {
            Ok(names) => ListingResponse::Modified {
                names,
                freshness_token,
            },
            Err(err) => ListingResponse::Failed {
                status: Some(status),
                message: format!("unexpected listing body: {err}"),
            },
        }
    }
}

/// Listing of a local store: its subdirectories.
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    root: PathBuf,
}

impl LocalDirectory {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DirectorySource for LocalDirectory {
    fn fetch_listing(&self, _freshness_token: Option<&str>) -> ListingResponse {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                return ListingResponse::Failed {
                    status: None,
                    message: format!("listing {}: {err}", self.root.display()),
                };
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_dir()))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort_unstable();

        ListingResponse::Modified {
            names,
            freshness_token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Terminal state of a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RefreshState {
    /// A new listing was fetched and persisted.
    Updated,
    /// The persisted listing was revalidated.
    NotModified,
    /// The listing could not be fetched; a fallback was used.
    Failed { message: String },
    /// No refresh was attempted; the persisted listing was used as is.
    Cached,
}

/// Where the returned users came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingOrigin {
    Network,
    Cache,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshOutcome {
    pub users: Vec<String>,
    pub state: RefreshState,
    pub origin: ListingOrigin,
}

/// Cached view of the user directory.
pub struct DirectoryCache<'a> {
    source: &'a dyn DirectorySource,
    store: &'a dyn DirectoryStore,
    sentinels: Vec<String>,
    default_user: String,
}

impl<'a> DirectoryCache<'a> {
    #[must_use]
    pub fn new(
        source: &'a dyn DirectorySource,
        store: &'a dyn DirectoryStore,
        sentinels: Vec<String>,
        default_user: impl Into<String>,
    ) -> Self {
        Self {
            source,
            store,
            sentinels,
            default_user: default_user.into(),
        }
    }

    /// Users from the persisted listing, refreshing only when none exists.
    #[must_use]
    pub fn get_users(&self) -> RefreshOutcome {
        match self.load_persisted() {
            Some(entry) => RefreshOutcome {
                users: entry.users,
                state: RefreshState::Cached,
                origin: ListingOrigin::Cache,
            },
            None => self.refresh_users(),
        }
    }

    /// Revalidate the listing against the source.
    #[must_use]
    pub fn refresh_users(&self) -> RefreshOutcome {
        timing::timed("directory.refresh", || self.refresh_inner())
    }

    fn refresh_inner(&self) -> RefreshOutcome {
        let persisted = self.load_persisted();
        let token = persisted
            .as_ref()
            .and_then(|entry| entry.freshness_token.as_deref());

        match self.source.fetch_listing(token) {
            ListingResponse::Modified {
                names,
                freshness_token,
            } => {
                let entry = DirectoryEntry {
                    users: self.without_sentinels(names),
                    freshness_token,
                };
                if let Err(err) = self.store.save(&entry) {
                    warn!(error = %err, "failed to persist directory listing");
                }
                info!(users = entry.users.len(), "directory listing updated");
                RefreshOutcome {
                    users: entry.users,
                    state: RefreshState::Updated,
                    origin: ListingOrigin::Network,
                }
            }
            ListingResponse::NotModified => {
                debug!("directory listing not modified");
                self.fall_back(persisted, RefreshState::NotModified)
            }
            ListingResponse::Failed { status, message } => {
                warn!(?status, %message, "directory listing unavailable, using fallback");
                self.fall_back(persisted, RefreshState::Failed { message })
            }
        }
    }

    fn fall_back(&self, persisted: Option<DirectoryEntry>, state: RefreshState) -> RefreshOutcome {
        match persisted {
            Some(entry) => RefreshOutcome {
                users: entry.users,
                state,
                origin: ListingOrigin::Cache,
            },
            None => RefreshOutcome {
                users: vec![self.default_user.clone()],
                state,
                origin: ListingOrigin::Default,
            },
        }
    }

    fn load_persisted(&self) -> Option<DirectoryEntry> {
        match self.store.load() {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "ignoring unreadable directory cache");
                None
            }
        }
    }

    fn without_sentinels(&self, names: Vec<String>) -> Vec<String> {
        names
            .into_iter()
            .filter(|name| !self.sentinels.iter().any(|sentinel| sentinel == name))
            .collect()
    }
}
