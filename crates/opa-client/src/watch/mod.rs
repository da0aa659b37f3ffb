//! OPA watches: long-lived streams of change notifications.
//!
//! A watch goes through three states:
//! - requesting: the worker process is spawned and issues the streaming GET
//! - active: the server accepted the stream; records flow into the sink
//! - terminated: the owner called [`OpaWatch::terminate`]
//!
//! Nothing ends a watch on its own. Dropping an [`OpaWatch`] without
//! terminating it leaves the worker running.

pub mod reassembly;
pub mod worker;
pub mod writer;

use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use crate::error::Result;
pub use reassembly::{read_records, ChunkReader, Records};
pub use worker::{Handshake, WatchWorker, WorkerConfig};

/// Handle to an active watch. Owns its worker process.
#[derive(Debug)]
pub struct OpaWatch {
    url: String,
    sink: PathBuf,
    worker: WatchWorker,
}

impl OpaWatch {
    pub(crate) fn new(url: String, sink: PathBuf, worker: WatchWorker) -> Self {
        Self { url, sink, worker }
    }

    /// Watched resource URL, without the watch query.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// File the worker writes records to.
    pub fn sink(&self) -> &Path {
        &self.sink
    }

    /// Process id of the worker.
    pub fn pid(&self) -> u32 {
        self.worker.id()
    }

    pub fn is_running(&mut self) -> bool {
        self.worker.is_running()
    }

    /// Stop the worker and wait for it to exit.
    pub fn terminate(mut self) -> Result<ExitStatus> {
        log::info!("Terminating watch on {} (pid {})", self.url, self.pid());
        self.worker.terminate()
    }
}

/// Generate a sink path for `url` that no other handle will share.
///
/// The file name is `watch-<slug>-<8 hex chars>.txt`, where the slug comes
/// from the URL path.
pub fn sink_path_for(dir: Option<&Path>, url: &str) -> PathBuf {
    let path = url::Url::parse(url)
        .map(|parsed| parsed.path().to_string())
        .unwrap_or_else(|_| url.to_string());

    let mut slug: String = path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    slug = slug.trim_matches('_').to_string();
    if slug.is_empty() {
        slug = "root".to_string();
    }

    let unique = uuid::Uuid::new_v4().simple().to_string();
    let file_name = format!("watch-{}-{}.txt", slug, &unique[..8]);
    match dir {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_name_derives_from_url_path() {
        let path = sink_path_for(None, "http://localhost:8181/v1/data/servers?watch");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("watch-v1_data_servers-"), "{}", name);
        assert!(name.ends_with(".txt"));
        assert_eq!(name.len(), "watch-v1_data_servers-".len() + 8 + ".txt".len());
    }

    #[test]
    fn sink_names_are_unique_per_call() {
        let url = "http://localhost:8181/v1/data/servers";
        assert_ne!(sink_path_for(None, url), sink_path_for(None, url));
    }

    #[test]
    fn sink_goes_into_dir() {
        let path = sink_path_for(Some(Path::new("/var/lib/opa")), "http://h/v1/data");
        assert_eq!(path.parent().unwrap(), Path::new("/var/lib/opa"));
    }

    #[test]
    fn unparsable_url_still_gets_a_name() {
        let path = sink_path_for(None, "///");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("watch-root-"));
    }
}
