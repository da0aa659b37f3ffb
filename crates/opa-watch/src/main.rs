//! opa-watch - worker process behind `OpaClient::create_watch`.
//!
//! Issues the streaming GET, opens the sink once the server accepted it,
//! reports a one-line JSON handshake on stdout and then appends every record
//! to the sink until the server closes the stream or the process is
//! terminated.

use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use opa_client::watch::worker::{self, WorkerConfig};

#[derive(Parser, Debug)]
#[command(name = "opa-watch", about = "Stream an OPA watch into a file")]
struct Args {
    /// Full URL to watch, watch query included
    #[arg(long)]
    url: String,

    /// File that receives one record per line
    #[arg(long)]
    sink: PathBuf,

    /// Connect timeout in milliseconds (reads never time out)
    #[arg(long, default_value_t = 2000)]
    connect_timeout_ms: u64,
}

impl From<Args> for WorkerConfig {
    fn from(args: Args) -> Self {
        WorkerConfig {
            url: args.url,
            sink: args.sink,
            connect_timeout: Duration::from_millis(args.connect_timeout_ms),
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = WorkerConfig::from(Args::parse());
    let mut stdout = io::stdout().lock();

    match worker::run(&config, &mut stdout) {
        Ok(written) => {
            log::debug!("Wrote {} records to {}", written, config.sink.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Watch on {} failed: {}", config.url, e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_match_worker_config_args() {
        let config = WorkerConfig {
            url: "http://localhost:8181/v1/data?watch&pretty=true".to_string(),
            sink: PathBuf::from("/tmp/watch.txt"),
            connect_timeout: Duration::from_millis(1500),
        };

        let mut argv = vec!["opa-watch".to_string()];
        argv.extend(config.to_args());
        let parsed = WorkerConfig::from(Args::try_parse_from(argv).unwrap());

        assert_eq!(parsed, config);
    }

    #[test]
    fn connect_timeout_has_default() {
        let args = Args::try_parse_from(["opa-watch", "--url", "http://h/v1/data", "--sink", "w.txt"])
            .unwrap();
        assert_eq!(args.connect_timeout_ms, 2000);
    }

    #[test]
    fn url_is_required() {
        assert!(Args::try_parse_from(["opa-watch", "--sink", "w.txt"]).is_err());
    }
}
