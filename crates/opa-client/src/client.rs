//! OPA API client.
//!
//! [`OpaClient::create_policy`] works on policy names relative to the
//! configured server. The remaining operations take full resource URLs, so
//! they can be pointed at any document or policy path.

use std::path::PathBuf;

use crate::config::{ClientConfig, WatchConfig};
use crate::error::{OpaError, Result};
use crate::policy::{validate_policy_name, Policy, PolicySource};
use crate::rest::{
    RestClient, RestReturn, CONTENT_TYPE_JSON, CONTENT_TYPE_JSON_PATCH, CONTENT_TYPE_TEXT,
};
use crate::watch::{sink_path_for, OpaWatch, WatchWorker, WorkerConfig};

const EMPTY_DOCUMENT: &[u8] = b"{}";

/// Connection to one OPA server.
#[derive(Clone)]
pub struct OpaClient {
    config: ClientConfig,
    watch_config: WatchConfig,
    rest: RestClient,
}

impl OpaClient {
    pub fn new(config: ClientConfig) -> Self {
        let rest = RestClient::new(config.connect_timeout_duration());
        Self {
            config,
            watch_config: WatchConfig::default(),
            rest,
        }
    }

    /// Replace the watch settings (worker binary, sink directory).
    pub fn with_watch_config(mut self, watch_config: WatchConfig) -> Self {
        self.watch_config = watch_config;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `http://<server>:<port>/<api_version>/`
    pub fn base(&self) -> String {
        self.config.base_url()
    }

    pub fn policy_url(&self, name: &str) -> String {
        format!("{}policies/{}", self.base(), name)
    }

    pub fn data_url(&self, path: &str) -> String {
        format!("{}data/{}", self.base(), path.trim_start_matches('/'))
    }

    fn with_debug(&self, url: &str, debug: bool) -> String {
        if debug {
            format!("{}{}", url, self.config.debug_query)
        } else {
            url.to_string()
        }
    }

    // ------------------------------------------------------------------
    // Policies
    // ------------------------------------------------------------------

    /// Upload a Rego policy under `name`.
    ///
    /// The name is checked before anything is sent. A 400 answer carrying
    /// the configured invalid-Rego code becomes [`OpaError::InvalidRego`].
    pub fn create_policy(&self, name: &str, source: impl Into<PolicySource>) -> Result<Policy> {
        validate_policy_name(name)?;
        let url = self.policy_url(name);
        let rego = source.into().into_bytes()?;

        let ret = self.rest.put(&url, &rego, CONTENT_TYPE_TEXT)?;

        if ret.http_status == 400 && self.is_invalid_rego(&ret) {
            let errors = ret
                .json_body
                .as_ref()
                .and_then(|body| body.get("errors"))
                .map(|errors| errors.to_string())
                .unwrap_or_else(|| "Invalid or Empty REGO".to_string());
            return Err(OpaError::InvalidRego { errors });
        }

        if ret.http_status == 200 && ret.body_is_empty() {
            log::info!("Created policy {}", name);
            return Ok(Policy {
                name: name.to_string(),
                url,
                rego,
            });
        }

        Err(OpaError::PolicyNotCreated {
            status: ret.http_status,
            message: ret.message,
        })
    }

    fn is_invalid_rego(&self, ret: &RestReturn) -> bool {
        ret.json_body
            .as_ref()
            .and_then(|body| body.get("code"))
            .and_then(|code| code.as_str())
            == Some(self.config.invalid_rego_code.as_str())
    }

    /// PUT a policy at an arbitrary URL without name checks.
    pub fn create_opa_policy(
        &self,
        url: &str,
        source: impl Into<PolicySource>,
    ) -> Result<RestReturn> {
        let rego = source.into().into_bytes()?;
        self.rest.put(url, &rego, CONTENT_TYPE_TEXT)
    }

    pub fn delete_policy(&self, url: &str, debug: bool) -> Result<RestReturn> {
        self.rest.delete(&self.with_debug(url, debug))
    }

    /// Replace the policy collection at `url` with an empty one.
    pub fn delete_all_policies(&self, url: &str, debug: bool) -> Result<RestReturn> {
        self.rest
            .put(&self.with_debug(url, debug), EMPTY_DOCUMENT, CONTENT_TYPE_JSON)
    }

    // ------------------------------------------------------------------
    // Base documents
    // ------------------------------------------------------------------

    pub fn create_base_doc(&self, url: &str, json: &str) -> Result<RestReturn> {
        self.rest.put(url, json.as_bytes(), CONTENT_TYPE_JSON)
    }

    /// Apply a JSON Patch document to the base document at `url`.
    pub fn patch_base_doc(&self, url: &str, json_patch: &str) -> Result<RestReturn> {
        self.rest
            .patch(url, json_patch.as_bytes(), CONTENT_TYPE_JSON_PATCH)
    }

    pub fn get_base_doc(&self, url: &str, debug: bool) -> Result<RestReturn> {
        self.rest.get(&self.with_debug(url, debug))
    }

    pub fn delete_base_doc(&self, url: &str, debug: bool) -> Result<RestReturn> {
        self.rest.delete(&self.with_debug(url, debug))
    }

    /// Overwrite the base document at `url` with `{}`.
    pub fn delete_all_base_data_doc(&self, url: &str, debug: bool) -> Result<RestReturn> {
        self.rest
            .put(&self.with_debug(url, debug), EMPTY_DOCUMENT, CONTENT_TYPE_JSON)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// POST `json` (usually `{"input": ...}`) to a query URL.
    pub fn execute_query(&self, url: &str, json: &str) -> Result<RestReturn> {
        self.rest.post(url, json.as_bytes(), CONTENT_TYPE_JSON)
    }

    pub fn execute_adhoc_query(&self, url: &str, query: Option<&str>) -> Result<RestReturn> {
        self.rest.get(&adhoc_query_url(url, query))
    }

    // ------------------------------------------------------------------
    // Watches
    // ------------------------------------------------------------------

    /// Start watching `url`, writing into a freshly named sink file.
    pub fn create_watch(&self, url: &str) -> Result<OpaWatch> {
        let sink = sink_path_for(self.watch_config.sink_dir.as_deref(), url);
        self.create_watch_to(url, sink)
    }

    /// Start watching `url`, writing into `sink`.
    ///
    /// Returns once the server accepted the stream. When it did not, no
    /// worker is left behind and [`OpaError::WatchRejected`] is returned.
    pub fn create_watch_to(&self, url: &str, sink: impl Into<PathBuf>) -> Result<OpaWatch> {
        let worker_config = WorkerConfig {
            url: format!("{}{}", url, self.config.watch_query),
            sink: sink.into(),
            connect_timeout: self.config.connect_timeout_duration(),
        };
        let binary = self.watch_config.resolve_worker_binary();

        let worker = WatchWorker::spawn(&binary, &worker_config)?;
        log::info!(
            "Watching {} into {} (pid {})",
            url,
            worker_config.sink.display(),
            worker.id()
        );
        Ok(OpaWatch::new(url.to_string(), worker_config.sink, worker))
    }
}

impl Default for OpaClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

/// Stop a watch and wait for its worker to exit.
pub fn destroy_watch(watch: OpaWatch) -> Result<()> {
    watch.terminate()?;
    Ok(())
}

/// Append `?q=<query>` (form encoded) to `url` when a query is given.
pub fn adhoc_query_url(url: &str, query: Option<&str>) -> String {
    match query.filter(|q| !q.is_empty()) {
        Some(query) => {
            let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
            format!("{}?q={}", url, encoded)
        }
        None => url.to_string(),
    }
}
