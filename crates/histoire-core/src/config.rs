use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::era::DEFAULT_LOOKBACK_SECS;
use crate::feed::FeedLimits;
use crate::store::StoreLocation;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoireConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_url")]
    pub url: String,
    #[serde(default = "default_listing_url")]
    pub listing_url: String,
    #[serde(default = "default_edit_url")]
    pub edit_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            listing_url: default_listing_url(),
            edit_url: default_edit_url(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn location(&self) -> StoreLocation {
        StoreLocation::parse(&self.url)
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_user")]
    pub default_user: String,
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: i64,
    #[serde(default = "default_max_fetches")]
    pub max_fetches: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_user: default_user(),
            lookback_secs: default_lookback_secs(),
            max_fetches: default_max_fetches(),
        }
    }
}

impl FeedConfig {
    #[must_use]
    pub const fn limits(&self) -> FeedLimits {
        FeedLimits {
            max_fetches: self.max_fetches,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_sentinels")]
    pub sentinels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            sentinels: default_sentinels(),
            cache_dir: None,
        }
    }
}

impl DirectoryConfig {
    /// Configured cache directory, else the platform cache dir.
    #[must_use]
    pub fn resolved_cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("histoire")))
    }
}

/// Default location of the user config file.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("histoire/config.toml"))
}

/// Load configuration from `path`, or from the default location.
///
/// An explicit path must exist; a missing default file means defaults.
/// Environment overrides are applied last.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: Option<&Path>) -> Result<HistoireConfig> {
    let mut config = match path {
        Some(path) => {
            if !path.exists() {
                bail!("Config file {} does not exist", path.display());
            }
            read_config(path)?
        }
        None => match default_config_path() {
            Some(path) if path.exists() => read_config(&path)?,
            _ => HistoireConfig::default(),
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn read_config(path: &Path) -> Result<HistoireConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<HistoireConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Apply `HISTOIRE_*` overrides. Empty values are ignored.
pub fn apply_env_overrides(config: &mut HistoireConfig, lookup: impl Fn(&str) -> Option<String>) {
    let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(url) = lookup("HISTOIRE_STORE") {
        config.store.url = url;
    }
    if let Some(url) = lookup("HISTOIRE_LISTING_URL") {
        config.store.listing_url = url;
    }
    if let Some(dir) = lookup("HISTOIRE_CACHE_DIR") {
        config.directory.cache_dir = Some(PathBuf::from(dir));
    }
    if let Some(user) = lookup("HISTOIRE_DEFAULT_USER") {
        config.feed.default_user = user;
    }
}

fn default_store_url() -> String {
    "https://raw.githubusercontent.com/mrgiggles/histoire/master/users".to_string()
}

fn default_listing_url() -> String {
    "https://api.github.com/repos/mrgiggles/histoire/contents/users".to_string()
}

fn default_edit_url() -> String {
    "https://github.com/mrgiggles/histoire/edit/master/users".to_string()
}

const fn default_timeout_secs() -> u64 {
    20
}

fn default_user_agent() -> String {
    concat!("histoire/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_user() -> String {
    "mrgiggles".to_string()
}

const fn default_lookback_secs() -> i64 {
    DEFAULT_LOOKBACK_SECS
}

const fn default_max_fetches() -> usize {
    512
}

fn default_sentinels() -> Vec<String> {
    vec!["README.md".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn make_temp_dir(label: &str) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "histoire-config-test-{label}-{}-{id}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("temp dir must be created");
        dir
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg: HistoireConfig = toml::from_str("").expect("parse");
        assert_eq!(cfg, HistoireConfig::default());
        assert_eq!(cfg.feed.default_user, "mrgiggles");
        assert_eq!(cfg.feed.lookback_secs, 604_800);
        assert_eq!(cfg.feed.max_fetches, 512);
        assert_eq!(cfg.directory.sentinels, vec!["README.md".to_string()]);
        assert!(matches!(cfg.store.location(), StoreLocation::Http(_)));
    }

    #[test]
    fn partial_tables_fill_in_defaults() {
        let cfg: HistoireConfig = toml::from_str(
            r#"
[store]
url = "/srv/histoire/users"
timeout_secs = 5

[directory]
sentinels = ["README.md", "LICENSE"]
"#,
        )
        .expect("parse");

        assert_eq!(
            cfg.store.location(),
            StoreLocation::Dir(PathBuf::from("/srv/histoire/users"))
        );
        assert_eq!(cfg.store.timeout(), Duration::from_secs(5));
        assert_eq!(cfg.store.listing_url, default_listing_url());
        assert_eq!(cfg.directory.sentinels.len(), 2);
        assert_eq!(cfg.feed, FeedConfig::default());
    }

    #[test]
    fn explicit_path_is_loaded() {
        let dir = make_temp_dir("explicit");
        let path = dir.join("config.toml");
        std::fs::write(&path, "[feed]\nmax_fetches = 16\n").expect("write config");

        let cfg = load_config(Some(&path)).expect("load should succeed");
        assert_eq!(cfg.feed.limits().max_fetches, 16);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = make_temp_dir("missing");
        let err = load_config(Some(&dir.join("nope.toml"))).expect_err("should fail");
        assert!(err.to_string().contains("does not exist"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = make_temp_dir("malformed");
        let path = dir.join("config.toml");
        std::fs::write(&path, "[feed\nmax_fetches = ").expect("write config");

        let err = load_config(Some(&path)).expect_err("should fail");
        assert!(err.to_string().contains("Failed to parse"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn env_overrides_replace_values() {
        let env: HashMap<&str, &str> = [
            ("HISTOIRE_STORE", "file:///tmp/users"),
            ("HISTOIRE_CACHE_DIR", "/tmp/histoire-cache"),
            ("HISTOIRE_DEFAULT_USER", "sfink"),
            ("HISTOIRE_LISTING_URL", "  "),
        ]
        .into_iter()
        .collect();

        let mut cfg = HistoireConfig::default();
        apply_env_overrides(&mut cfg, |key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(cfg.store.location(), StoreLocation::Dir(PathBuf::from("/tmp/users")));
        assert_eq!(
            cfg.directory.resolved_cache_dir(),
            Some(PathBuf::from("/tmp/histoire-cache"))
        );
        assert_eq!(cfg.feed.default_user, "sfink");
        assert_eq!(cfg.store.listing_url, default_listing_url());
    }
}
