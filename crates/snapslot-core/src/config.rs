use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::classes::ClassEntry;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_TIMEZONE: &str = "America/Santiago";
pub const DEFAULT_COMMIT_TIMEOUT_MS: u64 = 2_000; // bounded click, not the scheduling waits
pub const DEFAULT_MAX_RETAINED_RUNS: usize = 256;
pub const DEFAULT_AUTOMATION_URL: &str = "http://127.0.0.1:9515";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 90;

/// Top-level config (snapslot.toml + SNAPSLOT_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SnapslotConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub classes: Vec<ClassEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Orchestrator tuning. Lead time and execution epsilon are constants in
/// the scheduler crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Zone used when a submission does not name one: an IANA name or a fixed offset.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Upper bound for the commit action itself.
    #[serde(default = "default_commit_timeout_ms")]
    pub commit_timeout_ms: u64,
    /// Finished runs kept queryable before the oldest are evicted.
    #[serde(default = "default_max_retained_runs")]
    pub max_retained_runs: usize,
    /// Submit today's class from the catalog when the gateway starts.
    #[serde(default)]
    pub auto_book_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            commit_timeout_ms: DEFAULT_COMMIT_TIMEOUT_MS,
            max_retained_runs: DEFAULT_MAX_RETAINED_RUNS,
            auto_book_on_start: false,
        }
    }
}

/// Remote browser-automation service used by the concrete collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    #[serde(default = "default_automation_url")]
    pub base_url: String,
    /// Booking site the automation service should drive.
    #[serde(default)]
    pub site_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "bool_true")]
    pub headless: bool,
    /// Per-request HTTP timeout. Preparation navigates a full site, so this is generous.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl AutomationConfig {
    /// True when site URL and both credentials are present.
    pub fn has_credentials(&self) -> bool {
        !self.site_url.is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            base_url: default_automation_url(),
            site_url: String::new(),
            username: String::new(),
            password: String::new(),
            headless: true,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}
fn default_commit_timeout_ms() -> u64 {
    DEFAULT_COMMIT_TIMEOUT_MS
}
fn default_max_retained_runs() -> usize {
    DEFAULT_MAX_RETAINED_RUNS
}
fn default_automation_url() -> String {
    DEFAULT_AUTOMATION_URL.to_string()
}
fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl SnapslotConfig {
    /// Load config from a TOML file with SNAPSLOT_* env var overrides.
    ///
    /// Nested keys use a double underscore: `SNAPSLOT_SCHEDULER__COMMIT_TIMEOUT_MS=1500`.
    /// Without an explicit path, `~/.snapslot/snapslot.toml` is used.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::SnapslotError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SNAPSLOT_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.snapslot/snapslot.toml", home)
}
