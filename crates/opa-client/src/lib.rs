//! # opa-client
//!
//! Client for the Open Policy Agent REST API.
//!
//! - Policies: upload Rego under validated names, delete policies
//! - Base documents: create, patch, read and delete data documents
//! - Queries: POSTed queries and ad-hoc `?q=` queries
//! - Watches: stream change notifications into a file from a worker process
//!
//! ## Key Concepts
//!
//! - **RestReturn**: outcome of one call (success flag, message, status, JSON body)
//! - **Policy**: a Rego payload the server accepted
//! - **OpaWatch**: handle to a running watch worker, terminated explicitly
//!
//! ```rust,ignore
//! use opa_client::{ClientConfig, OpaClient};
//!
//! let client = OpaClient::new(ClientConfig::new("localhost", 8181));
//! let policy = client.create_policy("example/authz", "package example.authz")?;
//!
//! let watch = client.create_watch(&client.data_url("servers"))?;
//! // ... read watch.sink() ...
//! watch.terminate()?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod policy;
pub mod rest;
pub mod watch;

// Re-export commonly used types
pub use client::{adhoc_query_url, destroy_watch, OpaClient};
pub use config::{ClientConfig, WatchConfig};
pub use error::{OpaError, Result};
pub use policy::{read_from_file, validate_policy_name, Policy, PolicySource};
pub use rest::{RestClient, RestReturn};
pub use watch::OpaWatch;
