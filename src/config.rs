//! Configuration for the TestRail reporter
//!
//! Resolves TestRail credentials and the target run id from an explicit
//! environment snapshot, with `runId.txt` as a fallback for the run id.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

pub const TESTRAIL_HOST: &str = "TESTRAIL_HOST";
pub const TESTRAIL_USERNAME: &str = "TESTRAIL_USERNAME";
pub const TESTRAIL_PASSWORD: &str = "TESTRAIL_PASSWORD";
pub const TESTRAIL_PROJECTID: &str = "TESTRAIL_PROJECTID";
pub const TESTRAIL_RUN_ID: &str = "TESTRAIL_RUN_ID";
pub const TESTRAIL_ALLOW_CLOSING_PARTIAL_RUN: &str = "TESTRAIL_ALLOW_CLOSING_PARTIAL_RUN";

/// Name of the fallback file holding the run id
pub const RUN_ID_FILE: &str = "runId.txt";

/// Configuration error type
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TESTRAIL_HOST is required")]
    MissingHost,

    #[error("TESTRAIL_USERNAME is required")]
    MissingUsername,

    #[error("TESTRAIL_PASSWORD is required. Could be an API key.")]
    MissingPassword,

    #[error("TESTRAIL_PROJECTID is required.")]
    MissingProjectId,

    #[error("invalid TESTRAIL_HOST '{host}': {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("invalid test run id '{0}'")]
    InvalidRunId(String),

    #[error("Missing test rail run ID")]
    MissingRunId,

    #[error("failed to read {path}: {source}")]
    RunIdFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Snapshot of environment variables, taken once at startup
#[derive(Clone, Default)]
pub struct Env {
    vars: HashMap<String, String>,
}

impl Env {
    /// Capture the current process environment. Non-UTF-8 entries are dropped.
    pub fn from_process() -> Self {
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Value of `key` when set to a non-empty string
    fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Env {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// Values may hold credentials, so only the keys are printed.
impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.vars.keys().collect();
        keys.sort();
        f.debug_struct("Env").field("keys", &keys).finish()
    }
}

/// Returns true if any of the TestRail connection variables is present.
///
/// Presence of a single key is enough to attempt full resolution; the
/// missing ones are then reported by [`TestRailConfig::from_env`].
pub fn has_config(env: &Env) -> bool {
    [
        TESTRAIL_HOST,
        TESTRAIL_USERNAME,
        TESTRAIL_PASSWORD,
        TESTRAIL_PROJECTID,
    ]
    .iter()
    .any(|key| env.contains(key))
}

/// Whether closing a run that still has untested cases is allowed
pub fn allow_closing_partial_run(env: &Env) -> bool {
    env.contains(TESTRAIL_ALLOW_CLOSING_PARTIAL_RUN)
}

/// TestRail connection settings
#[derive(Clone, PartialEq, Eq)]
pub struct TestRailConfig {
    /// Base URL of the TestRail server, without trailing slash
    pub host: String,
    pub username: String,
    /// Password or API key
    pub password: String,
    pub project_id: String,
}

impl TestRailConfig {
    /// Build the configuration from the environment.
    ///
    /// Fields are checked in order (host, username, password, project id) and
    /// the first missing one is reported.
    pub fn from_env(env: &Env) -> Result<Self, ConfigError> {
        let host = env.non_empty(TESTRAIL_HOST).ok_or(ConfigError::MissingHost)?;
        let username = env
            .non_empty(TESTRAIL_USERNAME)
            .ok_or(ConfigError::MissingUsername)?;
        let password = env
            .non_empty(TESTRAIL_PASSWORD)
            .ok_or(ConfigError::MissingPassword)?;
        let project_id = env
            .non_empty(TESTRAIL_PROJECTID)
            .ok_or(ConfigError::MissingProjectId)?;

        validate_host(host)?;

        let config = Self {
            host: host.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            project_id: project_id.to_string(),
        };
        debug!(config = ?config, "TestRail info without the password");

        Ok(config)
    }

    /// HTTP Basic authorization header value for these credentials
    pub fn authorization(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {token}")
    }

    /// Full URL of a TestRail API v2 endpoint, e.g. `add_results_for_cases/12`
    pub fn api_url(&self, endpoint: &str) -> String {
        format!("{}/index.php?/api/v2/{endpoint}", self.host)
    }
}

impl fmt::Debug for TestRailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestRailConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"***")
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Validate that the host is an absolute http(s) URL
fn validate_host(host: &str) -> Result<(), ConfigError> {
    let url = url::Url::parse(host).map_err(|e| ConfigError::InvalidHost {
        host: host.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidHost {
            host: host.to_string(),
            reason: "must start with http:// or https://".to_string(),
        });
    }

    Ok(())
}

/// Resolve the TestRail run id.
///
/// `TESTRAIL_RUN_ID` takes precedence; otherwise `runId.txt` in `dir` is read.
/// Returns `Ok(None)` when neither source exists.
pub fn resolve_run_id(env: &Env, dir: &Path) -> Result<Option<u64>, ConfigError> {
    if let Some(raw) = env.get(TESTRAIL_RUN_ID) {
        return parse_run_id(raw).map(Some);
    }

    let path = dir.join(RUN_ID_FILE);
    debug!(file = %path.display(), "checking run id file");

    if !path.exists() {
        debug!(dir = %dir.display(), "could not find runId.txt");
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::RunIdFile {
        path: path.display().to_string(),
        source,
    })?;
    let trimmed = content.trim();
    debug!(value = trimmed, "read run id file");

    parse_run_id(trimmed).map(Some)
}

/// Parse a run id from the leading integer of `raw`.
///
/// Leading whitespace is skipped and anything after the digits is ignored,
/// so `"42\n"` and `"42abc"` both give 42. Zero is not a valid run id.
pub fn parse_run_id(raw: &str) -> Result<u64, ConfigError> {
    let s = raw.trim_start();
    let s = s.strip_prefix('+').unwrap_or(s);
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(s.len(), |(i, _)| i);

    match s[..end].parse::<u64>() {
        Ok(0) | Err(_) => Err(ConfigError::InvalidRunId(raw.to_string())),
        Ok(id) => Ok(id),
    }
}
