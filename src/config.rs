//! Configuration for dispatch-board, read from `board.toml`.
//!
//! Settings are layered file → environment → CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [board]
//! kind = "work-orders"          # or "technicians"
//!
//! [server]
//! base_url = "http://localhost:8080/api"
//! ws_url = "ws://localhost:8080/ws"   # derived from base_url when omitted
//! token = "..."
//! # status_path = "/work-orders/{id}/status"
//! # snapshot_path = "/dashboard/work-orders"
//!
//! [sync]
//! request_timeout_secs = 10
//! poll_interval_secs = 15
//! keepalive_secs = 60
//! connect_timeout_secs = 10
//! resync_on_connect = true
//!
//! [sync.backoff]
//! initial_ms = 1000
//! max_ms = 30000
//! multiplier = 2.0
//!
//! [filters]
//! search_debounce_ms = 300
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::board::status::BoardKind;
use crate::sync::realtime::{BackoffPolicy, RealtimeSettings};

pub const CONFIG_FILE_NAME: &str = "board.toml";

pub const ENV_SERVER_URL: &str = "DISPATCH_BOARD_SERVER_URL";
pub const ENV_WS_URL: &str = "DISPATCH_BOARD_WS_URL";
pub const ENV_TOKEN: &str = "DISPATCH_BOARD_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardSection {
    #[serde(default)]
    pub kind: BoardKind,
    /// Push subscription channel (default depends on the board kind)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Status-update path template; must contain `{id}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ws_url: None,
            token: None,
            status_path: None,
            snapshot_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffSection {
    #[serde(default = "default_backoff_initial_ms")]
    pub initial_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
}

fn default_backoff_initial_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            initial_ms: default_backoff_initial_ms(),
            max_ms: default_backoff_max_ms(),
            multiplier: default_backoff_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_resync_on_connect")]
    pub resync_on_connect: bool,
    #[serde(default)]
    pub backoff: BackoffSection,
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_keepalive_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_resync_on_connect() -> bool {
    true
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            keepalive_secs: default_keepalive_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            resync_on_connect: default_resync_on_connect(),
            backoff: BackoffSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiltersSection {
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,
}

fn default_search_debounce_ms() -> u64 {
    300
}

impl Default for FiltersSection {
    fn default() -> Self {
        Self {
            search_debounce_ms: default_search_debounce_ms(),
        }
    }
}

/// The complete board.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardToml {
    #[serde(default)]
    pub board: BoardSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub filters: FiltersSection,
}

impl BoardToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse board.toml")
    }

    /// Load from `path`, or defaults if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize board.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `DISPATCH_BOARD_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in
    /// production). Empty values are ignored.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get(ENV_SERVER_URL) {
            self.server.base_url = url;
        }
        if let Some(url) = get(ENV_WS_URL) {
            self.server.ws_url = Some(url);
        }
        if let Some(token) = get(ENV_TOKEN) {
            self.server.token = Some(token);
        }
    }

    /// WebSocket URL: explicit, or derived from the REST base URL
    /// (`http` → `ws`, `https` → `wss`, path `/ws`).
    pub fn ws_url(&self) -> Option<String> {
        if let Some(ref url) = self.server.ws_url {
            return Some(url.clone());
        }
        let mut url = Url::parse(&self.server.base_url).ok()?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            _ => return None,
        };
        url.set_scheme(scheme).ok()?;
        url.set_path("/ws");
        url.set_query(None);
        Some(url.to_string())
    }

    pub fn channel(&self) -> String {
        self.board
            .channel
            .clone()
            .unwrap_or_else(|| self.board.kind.default_channel().to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.request_timeout_secs.max(1))
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.filters.search_debounce_ms)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        let backoff = &self.sync.backoff;
        BackoffPolicy {
            initial: Duration::from_millis(backoff.initial_ms.max(1)),
            max: Duration::from_millis(backoff.max_ms.max(backoff.initial_ms).max(1)),
            multiplier: backoff.multiplier,
        }
    }

    pub fn realtime_settings(&self) -> RealtimeSettings {
        RealtimeSettings {
            channel: self.channel(),
            poll_interval: Duration::from_secs(self.sync.poll_interval_secs.max(1)),
            keepalive_timeout: Duration::from_secs(self.sync.keepalive_secs.max(2)),
            connect_timeout: Duration::from_secs(self.sync.connect_timeout_secs.max(1)),
            backoff: self.backoff(),
            resync_on_connect: self.sync.resync_on_connect,
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        match Url::parse(&self.server.base_url) {
            Ok(url) => {
                if !matches!(url.scheme(), "http" | "https") {
                    warnings.push(format!(
                        "server.base_url '{}' should use http or https",
                        self.server.base_url
                    ));
                }
                if url.scheme() == "http"
                    && self.server.token.is_some()
                    && !matches!(url.host_str(), Some("localhost" | "127.0.0.1"))
                {
                    warnings.push("server.token will be sent over plain http".to_string());
                }
            }
            Err(e) => warnings.push(format!(
                "Invalid server.base_url '{}': {}",
                self.server.base_url, e
            )),
        }

        if let Some(ref ws) = self.server.ws_url {
            match Url::parse(ws) {
                Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
                Ok(_) => warnings.push(format!("server.ws_url '{}' should use ws or wss", ws)),
                Err(e) => warnings.push(format!("Invalid server.ws_url '{}': {}", ws, e)),
            }
        }

        if let Some(ref path) = self.server.status_path
            && !path.contains("{id}")
        {
            warnings.push(format!(
                "server.status_path '{}' has no {{id}} placeholder",
                path
            ));
        }

        for (name, value) in [
            ("request_timeout_secs", self.sync.request_timeout_secs),
            ("poll_interval_secs", self.sync.poll_interval_secs),
            ("keepalive_secs", self.sync.keepalive_secs),
            ("connect_timeout_secs", self.sync.connect_timeout_secs),
        ] {
            if value == 0 {
                warnings.push(format!("sync.{} is 0; using the minimum instead", name));
            }
        }

        let backoff = &self.sync.backoff;
        if backoff.multiplier < 1.0 {
            warnings.push(format!(
                "sync.backoff.multiplier {} is below 1.0; delays will not grow",
                backoff.multiplier
            ));
        }
        if backoff.initial_ms > backoff.max_ms {
            warnings.push(format!(
                "sync.backoff.initial_ms ({}) exceeds max_ms ({})",
                backoff.initial_ms, backoff.max_ms
            ));
        }

        warnings
    }
}

/// Default config location: `./board.toml` when present, otherwise
/// `<config dir>/dispatch-board/board.toml`.
pub fn default_config_path() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|dir| dir.join("dispatch-board").join(CONFIG_FILE_NAME))
        .unwrap_or(local)
}

/// Command-line overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub server: Option<String>,
    pub ws: Option<String>,
    pub token: Option<String>,
    pub kind: Option<BoardKind>,
}

/// Resolved configuration: file → environment → CLI.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    /// File the settings were read from (it may not exist)
    pub path: PathBuf,
    pub toml: BoardToml,
}

impl BoardConfig {
    pub fn resolve(path: Option<&Path>, overrides: &CliOverrides) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        let mut toml = BoardToml::load_or_default(&path)?;
        toml.apply_env();
        overrides.apply(&mut toml);
        Ok(Self { path, toml })
    }

    pub fn kind(&self) -> BoardKind {
        self.toml.board.kind
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

impl CliOverrides {
    pub fn apply(&self, toml: &mut BoardToml) {
        if let Some(ref url) = self.server {
            toml.server.base_url = url.clone();
        }
        if let Some(ref url) = self.ws {
            toml.server.ws_url = Some(url.clone());
        }
        if let Some(ref token) = self.token {
            toml.server.token = Some(token.clone());
        }
        if let Some(kind) = self.kind {
            toml.board.kind = kind;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = BoardToml::default();
        assert_eq!(config.board.kind, BoardKind::WorkOrders);
        assert_eq!(config.server.base_url, "http://localhost:8080/api");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.search_debounce(), Duration::from_millis(300));
        assert_eq!(config.channel(), "work_orders");
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_file_fills_defaults() {
        let config = BoardToml::parse(
            r#"
            [board]
            kind = "technicians"

            [sync]
            poll_interval_secs = 5

            [sync.backoff]
            max_ms = 8000
            "#,
        )
        .unwrap();
        assert_eq!(config.board.kind, BoardKind::Technicians);
        assert_eq!(config.channel(), "technicians");
        let settings = config.realtime_settings();
        assert_eq!(settings.poll_interval, Duration::from_secs(5));
        assert_eq!(settings.backoff.max, Duration::from_secs(8));
        assert_eq!(settings.backoff.initial, Duration::from_secs(1));
        assert_eq!(settings.keepalive_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_parse_rejects_unknown_board_kind() {
        assert!(BoardToml::parse("[board]\nkind = \"trucks\"").is_err());
    }

    #[test]
    fn test_ws_url_is_derived_from_base_url() {
        let mut config = BoardToml::default();
        config.server.base_url = "https://dispatch.example.com/api/v1".to_string();
        assert_eq!(
            config.ws_url().as_deref(),
            Some("wss://dispatch.example.com/ws")
        );
        config.server.ws_url = Some("ws://push.example.com/socket".to_string());
        assert_eq!(
            config.ws_url().as_deref(),
            Some("ws://push.example.com/socket")
        );
    }

    #[test]
    fn test_env_overrides_file_and_cli_overrides_env() {
        let env: HashMap<&str, &str> = [
            (ENV_SERVER_URL, "http://env.example.com"),
            (ENV_TOKEN, "env-token"),
            (ENV_WS_URL, "  "),
        ]
        .into_iter()
        .collect();
        let mut config = BoardToml::parse("[server]\nbase_url = \"http://file.example.com\"").unwrap();
        config.apply_env_from(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.server.base_url, "http://env.example.com");
        assert_eq!(config.server.token.as_deref(), Some("env-token"));
        assert!(config.server.ws_url.is_none());

        let overrides = CliOverrides {
            server: Some("http://cli.example.com".to_string()),
            kind: Some(BoardKind::Technicians),
            ..CliOverrides::default()
        };
        overrides.apply(&mut config);
        assert_eq!(config.server.base_url, "http://cli.example.com");
        assert_eq!(config.board.kind, BoardKind::Technicians);
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut config = BoardToml::default();
        config.server.base_url = "not a url".to_string();
        config.server.ws_url = Some("http://example.com/ws".to_string());
        config.server.status_path = Some("/work-orders/status".to_string());
        config.sync.poll_interval_secs = 0;
        config.sync.backoff.multiplier = 0.5;
        config.sync.backoff.initial_ms = 60_000;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 6, "{:?}", warnings);
        assert!(warnings.iter().any(|w| w.contains("base_url")));
        assert!(warnings.iter().any(|w| w.contains("{id}")));
        assert!(warnings.iter().any(|w| w.contains("poll_interval_secs")));
    }

    #[test]
    fn test_validate_warns_about_token_over_plain_http() {
        let mut config = BoardToml::default();
        config.server.base_url = "http://dispatch.example.com".to_string();
        config.server.token = Some("secret".to_string());
        assert_eq!(config.validate().len(), 1);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let mut config = BoardToml::default();
        config.server.token = Some("abc".to_string());
        config.sync.poll_interval_secs = 7;
        config.save(&path).unwrap();

        let loaded = BoardToml::load(&path).unwrap();
        assert_eq!(loaded.server.token.as_deref(), Some("abc"));
        assert_eq!(loaded.sync.poll_interval_secs, 7);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let config = BoardToml::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.sync.request_timeout_secs, 10);
    }

    #[test]
    fn test_load_reports_path_on_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[sync\npoll = ").unwrap();
        let err = BoardToml::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("board.toml"));
    }

    #[test]
    fn test_resolve_with_explicit_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[board]\nkind = \"technicians\"\n").unwrap();
        let config = BoardConfig::resolve(Some(&path), &CliOverrides::default()).unwrap();
        assert_eq!(config.kind(), BoardKind::Technicians);
        assert_eq!(config.path, path);
    }
}
