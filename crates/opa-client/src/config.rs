//! Client and watch configuration.
//!
//! Both configs follow the same pattern: `Default` gives a working setup for
//! a local OPA server, and builder-style setters override single fields.
//! `ClientConfig` can also be loaded from JSON or from the environment.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Suffix appended to URLs when debug output is requested.
pub const DEFAULT_DEBUG_QUERY: &str = "?explain=full&pretty";
/// Suffix that turns a GET into a streaming watch.
pub const DEFAULT_WATCH_QUERY: &str = "?watch&pretty=true";
/// Error code OPA reports when a policy fails to compile.
pub const DEFAULT_INVALID_REGO_CODE: &str = "invalid_parameter";

/// Connection settings for an OPA server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: String,
    pub port: u16,
    pub api_version: String,
    /// Connect timeout in milliseconds. Reads are never timed out.
    pub connect_timeout_ms: u64,
    pub debug_query: String,
    pub watch_query: String,
    pub invalid_rego_code: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            port: 8181,
            api_version: "v1".to_string(),
            connect_timeout_ms: 2000,
            debug_query: DEFAULT_DEBUG_QUERY.to_string(),
            watch_query: DEFAULT_WATCH_QUERY.to_string(),
            invalid_rego_code: DEFAULT_INVALID_REGO_CODE.to_string(),
        }
    }
}

impl ClientConfig {
    /// Create a config for the given server and port.
    pub fn new(server: impl Into<String>, port: u16) -> Self {
        Self {
            server: server.into(),
            port,
            ..Self::default()
        }
    }

    /// Build a config from `OPA_SERVER`, `OPA_PORT` and `OPA_API_VERSION`.
    ///
    /// Unset, empty or unparsable variables keep their default value.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(server) = non_empty_var("OPA_SERVER") {
            config.server = server;
        }
        if let Some(port) = non_empty_var("OPA_PORT").and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        if let Some(version) = non_empty_var("OPA_API_VERSION") {
            config.api_version = version;
        }
        config
    }

    /// Parse a config from JSON. Missing fields take their default value.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn debug_query(mut self, query: impl Into<String>) -> Self {
        self.debug_query = query.into();
        self
    }

    pub fn watch_query(mut self, query: impl Into<String>) -> Self {
        self.watch_query = query.into();
        self
    }

    pub fn invalid_rego_code(mut self, code: impl Into<String>) -> Self {
        self.invalid_rego_code = code.into();
        self
    }

    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Base URL for the configured API version, always ending in `/`.
    pub fn base_url(&self) -> String {
        format!(
            "http://{}:{}/{}/",
            self.server, self.port, self.api_version
        )
    }
}

/// Where watch workers come from and where they write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchConfig {
    /// Path to the `opa-watch` binary. Resolved with [`WatchConfig::resolve_worker_binary`]
    /// when unset.
    pub worker_binary: Option<PathBuf>,
    /// Directory for generated sink files. Defaults to the working directory.
    pub sink_dir: Option<PathBuf>,
}

/// Name of the worker binary shipped by the `opa-watch` crate.
pub const WORKER_BINARY_NAME: &str = "opa-watch";
/// Environment variable overriding the worker binary location.
pub const WORKER_BINARY_ENV: &str = "OPA_WATCH_BIN";

impl WatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn worker_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.worker_binary = Some(path.into());
        self
    }

    pub fn sink_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sink_dir = Some(dir.into());
        self
    }

    /// Locate the worker binary.
    ///
    /// Order: explicit setting, `OPA_WATCH_BIN`, a sibling of the current
    /// executable, then the bare name (looked up on `PATH` at spawn time).
    pub fn resolve_worker_binary(&self) -> PathBuf {
        if let Some(path) = &self.worker_binary {
            return path.clone();
        }
        if let Some(path) = non_empty_var(WORKER_BINARY_ENV) {
            return PathBuf::from(path);
        }
        let file_name = format!("{}{}", WORKER_BINARY_NAME, env::consts::EXE_SUFFIX);
        if let Some(sibling) = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(&file_name)))
        {
            if sibling.is_file() {
                return sibling;
            }
        }
        PathBuf::from(file_name)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env<F: FnOnce()>(vars: &[(&str, Option<&str>)], f: F) {
        let _guard = ENV_LOCK.lock().unwrap();
        let previous: Vec<(String, Option<String>)> = vars
            .iter()
            .map(|(name, _)| (name.to_string(), env::var(name).ok()))
            .collect();

        for (name, value) in vars {
            match value {
                Some(value) => env::set_var(name, value),
                None => env::remove_var(name),
            }
        }

        f();

        for (name, value) in previous {
            match value {
                Some(value) => env::set_var(&name, value),
                None => env::remove_var(&name),
            }
        }
    }

    #[test]
    fn default_points_at_local_server() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url(), "http://localhost:8181/v1/");
        assert_eq!(config.debug_query, "?explain=full&pretty");
        assert_eq!(config.watch_query, "?watch&pretty=true");
        assert_eq!(config.connect_timeout_duration(), Duration::from_secs(2));
    }

    #[test]
    fn builder_overrides_fields() {
        let config = ClientConfig::new("opa.internal", 9000)
            .api_version("v2")
            .connect_timeout(Duration::from_millis(500))
            .watch_query("?watch")
            .invalid_rego_code("rego_parse_error");

        assert_eq!(config.base_url(), "http://opa.internal:9000/v2/");
        assert_eq!(config.connect_timeout_ms, 500);
        assert_eq!(config.watch_query, "?watch");
        assert_eq!(config.invalid_rego_code, "rego_parse_error");
    }

    #[test]
    fn from_json_fills_missing_fields() {
        let config = ClientConfig::from_json(r#"{"server": "10.0.0.5", "port": 8282}"#).unwrap();
        assert_eq!(config.server, "10.0.0.5");
        assert_eq!(config.port, 8282);
        assert_eq!(config.api_version, "v1");
        assert_eq!(config.debug_query, DEFAULT_DEBUG_QUERY);
    }

    #[test]
    fn from_env_reads_variables() {
        with_env(
            &[
                ("OPA_SERVER", Some("opa.example")),
                ("OPA_PORT", Some("8443")),
                ("OPA_API_VERSION", None),
            ],
            || {
                let config = ClientConfig::from_env();
                assert_eq!(config.base_url(), "http://opa.example:8443/v1/");
            },
        );
    }

    #[test]
    fn from_env_ignores_bad_port() {
        with_env(
            &[
                ("OPA_SERVER", None),
                ("OPA_PORT", Some("not-a-port")),
                ("OPA_API_VERSION", Some("")),
            ],
            || {
                let config = ClientConfig::from_env();
                assert_eq!(config, ClientConfig::default());
            },
        );
    }

    #[test]
    fn explicit_worker_binary_wins() {
        with_env(&[(WORKER_BINARY_ENV, Some("/from/env"))], || {
            let config = WatchConfig::new().worker_binary("/opt/bin/opa-watch");
            assert_eq!(
                config.resolve_worker_binary(),
                PathBuf::from("/opt/bin/opa-watch")
            );
        });
    }

    #[test]
    fn env_worker_binary_used_when_unset() {
        with_env(&[(WORKER_BINARY_ENV, Some("/from/env"))], || {
            assert_eq!(
                WatchConfig::new().resolve_worker_binary(),
                PathBuf::from("/from/env")
            );
        });
    }
}
