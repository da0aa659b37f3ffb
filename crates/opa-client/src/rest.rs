//! Blocking REST helper on top of `ureq`.
//!
//! Every call resolves to a [`RestReturn`]: HTTP error statuses are ordinary
//! unsuccessful results, only transport failures (refused connection, DNS,
//! connect timeout) come back as `Err`.

use serde_json::Value;
use std::io::Read;
use std::time::Duration;

use crate::error::{OpaError, Result};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_JSON_PATCH: &str = "application/json-patch+json";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

/// Outcome of a single REST call.
#[derive(Debug, Clone, PartialEq)]
pub struct RestReturn {
    /// True for 2xx statuses.
    pub success: bool,
    /// Server error message when one was sent, otherwise the status text.
    pub message: String,
    pub http_status: u16,
    /// Decoded body, when the body was non-empty JSON.
    pub json_body: Option<Value>,
}

impl RestReturn {
    /// Read the whole body, however large, and build the result from it.
    fn from_response(response: ureq::Response) -> Result<Self> {
        let http_status = response.status();
        let status_text = response.status_text().to_string();
        let mut body = Vec::new();
        response.into_reader().read_to_end(&mut body)?;
        Ok(Self::from_parts(
            http_status,
            status_text,
            &String::from_utf8_lossy(&body),
        ))
    }

    fn from_parts(http_status: u16, status_text: String, body: &str) -> Self {
        let success = (200..300).contains(&http_status);
        let json_body = if body.trim().is_empty() {
            None
        } else {
            serde_json::from_str::<Value>(body).ok()
        };

        let message = json_body
            .as_ref()
            .filter(|_| !success)
            .and_then(|json| json.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or(status_text);

        Self {
            success,
            message,
            http_status,
            json_body,
        }
    }

    /// True when the body is absent or an empty JSON object/array.
    pub fn body_is_empty(&self) -> bool {
        match &self.json_body {
            None => true,
            Some(Value::Object(map)) => map.is_empty(),
            Some(Value::Array(items)) => items.is_empty(),
            Some(Value::Null) => true,
            Some(_) => false,
        }
    }
}

/// An open streaming response.
///
/// `body` is only present when the server answered with a success status.
pub struct StreamResponse {
    pub head: RestReturn,
    pub body: Option<Box<dyn Read + Send + Sync + 'static>>,
}

/// Thin wrapper around a `ureq` agent.
///
/// The agent has a connect timeout and no read timeout, so it is suitable
/// both for short requests and for long-lived streams.
#[derive(Clone)]
pub struct RestClient {
    agent: ureq::Agent,
}

impl RestClient {
    pub fn new(connect_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .build();
        Self { agent }
    }

    pub fn get(&self, url: &str) -> Result<RestReturn> {
        self.dispatch("GET", url, None)
    }

    pub fn delete(&self, url: &str) -> Result<RestReturn> {
        self.dispatch("DELETE", url, None)
    }

    pub fn put(&self, url: &str, body: &[u8], content_type: &str) -> Result<RestReturn> {
        self.dispatch("PUT", url, Some((body, content_type)))
    }

    pub fn patch(&self, url: &str, body: &[u8], content_type: &str) -> Result<RestReturn> {
        self.dispatch("PATCH", url, Some((body, content_type)))
    }

    pub fn post(&self, url: &str, body: &[u8], content_type: &str) -> Result<RestReturn> {
        self.dispatch("POST", url, Some((body, content_type)))
    }

    /// Issue a GET and hand back the unread body for streaming.
    pub fn get_stream(&self, url: &str) -> Result<StreamResponse> {
        log::debug!("GET {} (stream)", url);
        match self.agent.get(url).call() {
            Ok(response) => {
                let head = RestReturn::from_parts(
                    response.status(),
                    response.status_text().to_string(),
                    "",
                );
                Ok(StreamResponse {
                    head,
                    body: Some(response.into_reader()),
                })
            }
            Err(ureq::Error::Status(_, response)) => Ok(StreamResponse {
                head: RestReturn::from_response(response)?,
                body: None,
            }),
            Err(other) => Err(OpaError::Transport(other.to_string())),
        }
    }

    fn dispatch(
        &self,
        method: &str,
        url: &str,
        body: Option<(&[u8], &str)>,
    ) -> Result<RestReturn> {
        log::debug!("{} {}", method, url);
        let request = self.agent.request(method, url);
        let result = match body {
            Some((bytes, content_type)) => request
                .set("Content-Type", content_type)
                .send_bytes(bytes),
            None => request.call(),
        };

        let ret = match result {
            Ok(response) => RestReturn::from_response(response)?,
            Err(ureq::Error::Status(_, response)) => RestReturn::from_response(response)?,
            Err(other) => return Err(OpaError::Transport(other.to_string())),
        };

        if !ret.success {
            log::warn!(
                "{} {} returned {}: {}",
                method,
                url,
                ret.http_status,
                ret.message
            );
        }
        Ok(ret)
    }
}

impl Default for RestClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}
