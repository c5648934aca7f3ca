use crate::events::to_minor_units_ceil;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    #[serde(default)]
    pub wallet_watch: WalletWatchConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Absent section disables log tailing entirely
    #[serde(default)]
    pub log_watch: Option<LogWatchConfig>,
    #[serde(default)]
    pub peer_geo: PeerGeoConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Node IPC socket, e.g. `/root/cypher/data/cypher.ipc`
    #[serde(default)]
    pub ipc_path: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_sec: f64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_sec: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletWatchConfig {
    /// Alert threshold in major units
    #[serde(default = "default_min_amount")]
    pub min_amount: f64,
    #[serde(default = "default_true")]
    pub notify_incoming: bool,
    #[serde(default = "default_true")]
    pub notify_outgoing: bool,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_watchlist_path")]
    pub watchlist_path: PathBuf,
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default = "default_telegram_api")]
    pub api_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogWatchConfig {
    #[serde(default)]
    pub logs_dir: PathBuf,
    #[serde(default)]
    pub app_name: String,
    #[serde(default = "default_true")]
    pub watch_out: bool,
    #[serde(default = "default_true")]
    pub watch_err: bool,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default = "default_tail_poll_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_wait_interval")]
    pub wait_interval_sec: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeerGeoConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_peer_geo_path")]
    pub output_path: PathBuf,
    #[serde(default = "default_peer_geo_interval")]
    pub update_interval_sec: u64,
    /// `{ip}` is substituted with the peer address
    #[serde(default = "default_geo_provider")]
    pub provider_url: String,
    #[serde(default = "default_geo_timeout")]
    pub request_timeout_sec: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> f64 {
    5.0
}

fn default_request_timeout() -> u64 {
    30
}

fn default_min_amount() -> f64 {
    1.0
}

fn default_decimals() -> u8 {
    18
}

fn default_symbol() -> String {
    "CPH".to_string()
}

fn default_watchlist_path() -> PathBuf {
    PathBuf::from("watchlist.json")
}

fn default_state_path() -> PathBuf {
    PathBuf::from("state.json")
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

pub fn default_keywords() -> Vec<String> {
    [
        "FATAL",
        "fatal",
        "panic",
        "ERROR",
        "Error",
        "bad block",
        "consensus",
        "OOM",
        "out of memory",
    ]
    .iter()
    .map(|k| k.to_string())
    .collect()
}

fn default_tail_poll_ms() -> u64 {
    500
}

fn default_wait_interval() -> u64 {
    2
}

fn default_peer_geo_path() -> PathBuf {
    PathBuf::from("peer_geo.json")
}

fn default_peer_geo_interval() -> u64 {
    3600
}

fn default_geo_provider() -> String {
    "https://ipapi.co/{ip}/json/".to_string()
}

fn default_geo_timeout() -> u64 {
    4
}

fn default_user_agent() -> String {
    "cph-monitor/peer-geo".to_string()
}

impl Default for WalletWatchConfig {
    fn default() -> Self {
        Self {
            min_amount: default_min_amount(),
            notify_incoming: true,
            notify_outgoing: true,
            decimals: default_decimals(),
            symbol: default_symbol(),
            watchlist_path: default_watchlist_path(),
            state_path: default_state_path(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_token: String::new(),
            chat_id: String::new(),
            api_url: default_telegram_api(),
        }
    }
}

impl Default for PeerGeoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_path: default_peer_geo_path(),
            update_interval_sec: default_peer_geo_interval(),
            provider_url: default_geo_provider(),
            request_timeout_sec: default_geo_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl NodeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_sec)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }
}

impl LogWatchConfig {
    pub fn out_log_path(&self) -> PathBuf {
        self.logs_dir.join(format!("{}-out.log", self.app_name))
    }

    pub fn err_log_path(&self) -> PathBuf {
        self.logs_dir.join(format!("{}-error.log", self.app_name))
    }
}

impl Config {
    /// Loads `.env`, then the TOML file named by `MONITOR_CONFIG` (or `config.toml`).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let path = std::env::var("MONITOR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&raw)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Secrets may live in the environment instead of the file.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("NODE_IPC_PATH") {
            self.node.ipc_path = path;
        }
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(chat_id) = lookup("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = chat_id;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.ipc_path.trim().is_empty() {
            return Err(ConfigError::Missing("node.ipc_path"));
        }
        let poll_interval = self.node.poll_interval_sec;
        if poll_interval <= 0.0 || Duration::try_from_secs_f64(poll_interval).is_err() {
            return Err(ConfigError::Invalid(format!(
                "node.poll_interval_sec must be a positive number of seconds, got {poll_interval}"
            )));
        }
        if !self.wallet_watch.min_amount.is_finite() || self.wallet_watch.min_amount < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "wallet_watch.min_amount must be a non-negative number, got {}",
                self.wallet_watch.min_amount
            )));
        }
        if self.wallet_watch.decimals > 77 {
            return Err(ConfigError::Invalid(format!(
                "wallet_watch.decimals must be at most 77, got {}",
                self.wallet_watch.decimals
            )));
        }
        to_minor_units_ceil(self.wallet_watch.min_amount, self.wallet_watch.decimals)?;

        if let Some(log_watch) = &self.log_watch {
            if log_watch.logs_dir.as_os_str().is_empty() {
                return Err(ConfigError::Missing("log_watch.logs_dir"));
            }
            if log_watch.app_name.trim().is_empty() {
                return Err(ConfigError::Missing("log_watch.app_name"));
            }
            if log_watch.keywords.is_empty() {
                return Err(ConfigError::Invalid(
                    "log_watch.keywords must not be empty".to_string(),
                ));
            }
            if log_watch.poll_interval_ms == 0 {
                return Err(ConfigError::Invalid(
                    "log_watch.poll_interval_ms must be greater than zero".to_string(),
                ));
            }
            if log_watch.wait_interval_sec == 0 {
                return Err(ConfigError::Invalid(
                    "log_watch.wait_interval_sec must be greater than zero".to_string(),
                ));
            }
        }

        if self.peer_geo.enabled && self.peer_geo.update_interval_sec == 0 {
            return Err(ConfigError::Invalid(
                "peer_geo.update_interval_sec must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [node]
        ipc_path = "/tmp/node.ipc"
    "#;

    #[test]
    fn test_defaults_applied() {
        let config = Config::parse(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.node.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.wallet_watch.min_amount, 1.0);
        assert!(config.wallet_watch.notify_incoming);
        assert!(config.wallet_watch.notify_outgoing);
        assert_eq!(config.wallet_watch.symbol, "CPH");
        assert!(config.telegram.enabled);
        assert!(config.log_watch.is_none());
        assert!(config.peer_geo.enabled);
        assert_eq!(config.peer_geo.update_interval_sec, 3600);
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = Config::parse(include_str!("../config.example.toml")).unwrap();
        config.validate().unwrap();

        let log_watch = config.log_watch.unwrap();
        assert_eq!(log_watch.keywords, default_keywords());
        assert_eq!(
            log_watch.err_log_path(),
            PathBuf::from("/root/.pm2/logs/cypher-error.log")
        );
    }

    #[test]
    fn test_missing_ipc_path_is_fatal() {
        let config = Config::parse("[node]\npoll_interval_sec = 2\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("node.ipc_path"))
        ));
    }

    #[test]
    fn test_missing_node_section_fails_to_parse() {
        assert!(matches!(
            Config::parse("[telegram]\nenabled = false\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_invalid_poll_interval() {
        let config = Config::parse(
            r#"
            [node]
            ipc_path = "/tmp/node.ipc"
            poll_interval_sec = 0
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_oversized_poll_interval_rejected() {
        let config = Config::parse(
            r#"
            [node]
            ipc_path = "/tmp/node.ipc"
            poll_interval_sec = 1e30
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_loop_intervals_rejected() {
        let tail_spin = Config::parse(
            r#"
            [node]
            ipc_path = "/tmp/node.ipc"

            [log_watch]
            logs_dir = "/var/log/pm2"
            app_name = "cypher"
            poll_interval_ms = 0
            "#,
        )
        .unwrap();
        assert!(matches!(tail_spin.validate(), Err(ConfigError::Invalid(_))));

        let geo_spin = Config::parse(
            r#"
            [node]
            ipc_path = "/tmp/node.ipc"

            [peer_geo]
            update_interval_sec = 0
            "#,
        )
        .unwrap();
        assert!(matches!(geo_spin.validate(), Err(ConfigError::Invalid(_))));

        let geo_disabled = Config::parse(
            r#"
            [node]
            ipc_path = "/tmp/node.ipc"

            [peer_geo]
            enabled = false
            update_interval_sec = 0
            "#,
        )
        .unwrap();
        geo_disabled.validate().unwrap();
    }

    #[test]
    fn test_unrepresentable_threshold_rejected() {
        let config = Config::parse(
            r#"
            [node]
            ipc_path = "/tmp/node.ipc"

            [wallet_watch]
            min_amount = 1e80
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_log_watch_paths_and_keywords() {
        let config = Config::parse(
            r#"
            [node]
            ipc_path = "/tmp/node.ipc"

            [log_watch]
            logs_dir = "/var/log/pm2"
            app_name = "cypher"
            watch_err = false
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        let log_watch = config.log_watch.unwrap();
        assert_eq!(
            log_watch.out_log_path(),
            PathBuf::from("/var/log/pm2/cypher-out.log")
        );
        assert_eq!(
            log_watch.err_log_path(),
            PathBuf::from("/var/log/pm2/cypher-error.log")
        );
        assert!(log_watch.watch_out);
        assert!(!log_watch.watch_err);
        assert!(log_watch.keywords.iter().any(|k| k == "out of memory"));
    }

    #[test]
    fn test_log_watch_requires_app_name() {
        let config = Config::parse(
            r#"
            [node]
            ipc_path = "/tmp/node.ipc"

            [log_watch]
            logs_dir = "/var/log/pm2"
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("log_watch.app_name"))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::parse(MINIMAL).unwrap();
        config.apply_overrides(|key| match key {
            "TELEGRAM_BOT_TOKEN" => Some("123:abc".to_string()),
            "TELEGRAM_CHAT_ID" => Some("-100200".to_string()),
            _ => None,
        });

        assert_eq!(config.node.ipc_path, "/tmp/node.ipc");
        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.telegram.chat_id, "-100200");
    }

    #[test]
    fn test_load_reports_io_error() {
        let result = Config::load(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
