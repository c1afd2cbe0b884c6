use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Default, Deserialize, Clone)]
struct PartialConfig {
    #[serde(default)]
    local_sync_path: Option<PathBuf>,
    #[serde(default)]
    database_path: Option<PathBuf>,
    #[serde(default)]
    server_url: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    sync_interval_seconds: Option<u64>,
    #[serde(default)]
    file_change_debounce_seconds: Option<f64>,
    #[serde(default)]
    max_concurrent_transfers: Option<u32>,
    #[serde(default)]
    conflict_strategy: Option<String>,
}

/// Resolved, defaulted configuration for one sync core instance.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub local_sync_path: PathBuf,
    pub database_path: PathBuf,
    pub server_url: String,
    #[serde(default)]
    pub username: Option<String>,
    pub sync_interval_seconds: u64,
    pub file_change_debounce_seconds: f64,
    pub max_concurrent_transfers: u32,
    pub conflict_strategy: String,
    #[serde(default)]
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub local_sync_path: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub server_url: Option<String>,
    pub username: Option<String>,
    pub sync_interval_seconds: Option<u64>,
    pub file_change_debounce_seconds: Option<f64>,
}

impl Config {
    pub fn default_local_sync_path() -> PathBuf {
        PathBuf::from("/Volumes/Normal stor/Seafile")
    }

    pub fn default_database_path() -> PathBuf {
        app_support_dir().join("SeaSync").join("sync_state.sqlite")
    }

    pub fn default_config_path() -> PathBuf {
        home_dir().join(".seasync").join("config.json")
    }

    pub fn default_log_file_path() -> PathBuf {
        home_dir().join(".seasync").join("logs").join("seasync.log")
    }

    pub const DEFAULT_SYNC_INTERVAL_SECONDS: u64 = 300;
    pub const DEFAULT_DEBOUNCE_SECONDS: f64 = 2.0;
    pub const DEFAULT_MAX_CONCURRENT_TRANSFERS: u32 = 4;
    pub const DEFAULT_CONFLICT_STRATEGY: &'static str = "last_modified_wins";

    pub fn resolve_config_path(flag_path: Option<&Path>) -> PathBuf {
        let explicit = [
            flag_path.map(|p| p.to_path_buf()),
            non_empty_env("SEASYNC_CONFIG_PATH").map(PathBuf::from),
        ];
        if let Some(p) = explicit.into_iter().flatten().next() {
            return absolutize_path(&p);
        }

        let fallback = [
            Self::default_config_path(),
            home_dir().join(".config").join("seasync").join("config.json"),
        ]
        .into_iter()
        .find(|p| p.exists())
        .unwrap_or_else(Self::default_config_path);
        absolutize_path(&fallback)
    }

    pub fn load_file_only(path: &Path) -> Result<Self> {
        Self::load_with_overrides(path, ConfigOverrides::default())
    }

    pub fn load_with_overrides(path: &Path, overrides: ConfigOverrides) -> Result<Self> {
        let file_cfg = if path.exists() {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            serde_json::from_str::<PartialConfig>(&data).context("parse config json")?
        } else {
            PartialConfig::default()
        };

        let env_cfg = read_env_config();

        let local_sync_path = overrides
            .local_sync_path
            .or(env_cfg.local_sync_path)
            .or(file_cfg.local_sync_path)
            .unwrap_or_else(Self::default_local_sync_path);
        let database_path = overrides
            .database_path
            .or(env_cfg.database_path)
            .or(file_cfg.database_path)
            .unwrap_or_else(Self::default_database_path);
        let server_url = overrides
            .server_url
            .or(env_cfg.server_url)
            .or(file_cfg.server_url)
            .unwrap_or_default();
        let username = overrides.username.or(env_cfg.username).or(file_cfg.username);
        let sync_interval_seconds = overrides
            .sync_interval_seconds
            .or(env_cfg.sync_interval_seconds)
            .or(file_cfg.sync_interval_seconds)
            .unwrap_or(Self::DEFAULT_SYNC_INTERVAL_SECONDS);
        let file_change_debounce_seconds = overrides
            .file_change_debounce_seconds
            .or(env_cfg.file_change_debounce_seconds)
            .or(file_cfg.file_change_debounce_seconds)
            .unwrap_or(Self::DEFAULT_DEBOUNCE_SECONDS);
        let max_concurrent_transfers = env_cfg
            .max_concurrent_transfers
            .or(file_cfg.max_concurrent_transfers)
            .unwrap_or(Self::DEFAULT_MAX_CONCURRENT_TRANSFERS);
        let conflict_strategy = env_cfg
            .conflict_strategy
            .or(file_cfg.conflict_strategy)
            .unwrap_or_else(|| Self::DEFAULT_CONFLICT_STRATEGY.to_string());

        let mut cfg = Config {
            local_sync_path,
            database_path,
            server_url,
            username,
            sync_interval_seconds,
            file_change_debounce_seconds,
            max_concurrent_transfers,
            conflict_strategy,
            config_path: Some(path.to_path_buf()),
        };
        cfg.normalize()?;
        if !cfg.server_url.is_empty() {
            cfg.validate()?;
        }
        Ok(cfg)
    }

    pub fn new_for_save(
        path: &Path,
        local_sync_path: &Path,
        server_url: &str,
        username: &str,
    ) -> Result<Self> {
        let mut cfg = Config {
            local_sync_path: local_sync_path.to_path_buf(),
            database_path: Self::default_database_path(),
            server_url: server_url.to_string(),
            username: Some(username.to_string()),
            sync_interval_seconds: Self::DEFAULT_SYNC_INTERVAL_SECONDS,
            file_change_debounce_seconds: Self::DEFAULT_DEBOUNCE_SECONDS,
            max_concurrent_transfers: Self::DEFAULT_MAX_CONCURRENT_TRANSFERS,
            conflict_strategy: Self::DEFAULT_CONFLICT_STRATEGY.to_string(),
            config_path: Some(path.to_path_buf()),
        };
        cfg.normalize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.config_path else {
            anyhow::bail!("config_path missing");
        };
        save_config_file(path, self)
    }

    fn normalize(&mut self) -> Result<()> {
        self.local_sync_path = absolutize_path(&self.local_sync_path);
        self.database_path = absolutize_path(&self.database_path);
        if let Some(p) = self.config_path.take() {
            self.config_path = Some(absolutize_path(&p));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        validate_url(&self.server_url).context("server_url")?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct PersistedConfig<'a> {
    local_sync_path: &'a PathBuf,
    database_path: &'a PathBuf,
    server_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: &'a Option<String>,
    sync_interval_seconds: u64,
    file_change_debounce_seconds: f64,
    max_concurrent_transfers: u32,
    conflict_strategy: &'a str,
}

fn save_config_file(path: &Path, cfg: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let persisted = PersistedConfig {
        local_sync_path: &cfg.local_sync_path,
        database_path: &cfg.database_path,
        server_url: &cfg.server_url,
        username: &cfg.username,
        sync_interval_seconds: cfg.sync_interval_seconds,
        file_change_debounce_seconds: cfg.file_change_debounce_seconds,
        max_concurrent_transfers: cfg.max_concurrent_transfers,
        conflict_strategy: &cfg.conflict_strategy,
    };
    let data = serde_json::to_vec(&persisted).context("serialize config")?;
    std::fs::write(path, data).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub(crate) fn validate_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw)?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("url must be http or https");
    }
    Ok(())
}

fn home_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(h) if !h.is_empty() => PathBuf::from(h),
        _ => PathBuf::from("."),
    }
}

fn app_support_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(home_dir)
}

fn absolutize_path(path: &Path) -> PathBuf {
    let expanded = expand_tilde(path);
    let abs = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(expanded)
    };
    lexically_normalize(&abs)
}

/// Replaces a leading `~` (or `~/...`) with the resolved home directory;
/// any other path is returned unchanged.
fn expand_tilde(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if raw == "~" {
        return home_dir();
    }
    match raw.strip_prefix("~/") {
        Some(rest) => home_dir().join(rest),
        None => path.to_path_buf(),
    }
}

/// Resolves `.` and `..` segments without touching the filesystem, the way
/// `path/filepath.Clean` would: a trailing `Normal` segment is popped by a
/// following `..`, and a `..` at the root or past a prefix is dropped.
fn lexically_normalize(path: &Path) -> PathBuf {
    let mut stack: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match stack.last() {
                Some(Component::Normal(_)) => {
                    stack.pop();
                }
                Some(Component::ParentDir) => stack.push(component),
                // RootDir, Prefix, or nothing yet to resolve against: drop it.
                _ => {}
            },
            other => stack.push(other),
        }
    }

    let mut out = PathBuf::new();
    for component in &stack {
        out.push(component);
    }
    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn read_env_config() -> PartialConfig {
    let mut out = PartialConfig::default();
    if let Ok(v) = std::env::var("SEASYNC_LOCAL_SYNC_PATH") {
        if !v.trim().is_empty() {
            out.local_sync_path = Some(PathBuf::from(v.trim()));
        }
    }
    if let Ok(v) = std::env::var("SEASYNC_DATABASE_PATH") {
        if !v.trim().is_empty() {
            out.database_path = Some(PathBuf::from(v.trim()));
        }
    }
    if let Ok(v) = std::env::var("SEASYNC_SERVER_URL") {
        if !v.trim().is_empty() {
            out.server_url = Some(v.trim().to_string());
        }
    }
    if let Ok(v) = std::env::var("SEASYNC_USERNAME") {
        if !v.trim().is_empty() {
            out.username = Some(v.trim().to_string());
        }
    }
    if let Ok(v) = std::env::var("SEASYNC_SYNC_INTERVAL_SECONDS") {
        if let Ok(n) = v.trim().parse() {
            out.sync_interval_seconds = Some(n);
        }
    }
    if let Ok(v) = std::env::var("SEASYNC_FILE_CHANGE_DEBOUNCE_SECONDS") {
        if let Ok(n) = v.trim().parse() {
            out.file_change_debounce_seconds = Some(n);
        }
    }
    if let Ok(v) = std::env::var("SEASYNC_MAX_CONCURRENT_TRANSFERS") {
        if let Ok(n) = v.trim().parse() {
            out.max_concurrent_transfers = Some(n);
        }
    }
    if let Ok(v) = std::env::var("SEASYNC_CONFLICT_STRATEGY") {
        if !v.trim().is_empty() {
            out.conflict_strategy = Some(v.trim().to_string());
        }
    }
    out
}
