//! Folio collaboration server binary.
//!
//! Usage:
//!   folio-server [--ws-addr ADDR] [--http-addr ADDR] [--data-dir DIR]
//!
//! Every flag can also be set through its `FOLIO_*` environment variable.
//! Log output is controlled by `RUST_LOG`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use folio_collab::{CollabServer, ServerConfig};
use log::info;

#[derive(Parser, Debug)]
#[command(name = "folio-server")]
#[command(about = "Block sync API and live edit relay for Folio notes")]
#[command(version)]
struct Args {
    /// WebSocket address for live edit events
    #[arg(long, env = "FOLIO_WS_ADDR", default_value = "127.0.0.1:9090")]
    ws_addr: String,

    /// HTTP address for document and sync requests
    #[arg(long, env = "FOLIO_HTTP_ADDR", default_value = "127.0.0.1:8080")]
    http_addr: String,

    /// RocksDB directory; documents are kept in memory when omitted
    #[arg(long, env = "FOLIO_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Frames queued per session before new ones are dropped
    #[arg(long, env = "FOLIO_OUTBOUND_CAPACITY", default_value_t = 256)]
    outbound_capacity: usize,

    /// Milliseconds to hold a full sync so bursts collapse to the newest
    #[arg(long, env = "FOLIO_SYNC_DEBOUNCE_MS", default_value_t = 0)]
    sync_debounce_ms: u64,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            ws_bind_addr: self.ws_addr,
            http_bind_addr: self.http_addr,
            outbound_capacity: self.outbound_capacity,
            storage_path: self.data_dir,
            sync_debounce_ms: self.sync_debounce_ms,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let config = Args::parse().into_config();
    info!("Starting Folio server...");

    let server = match CollabServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            log::error!("Failed to open store: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        log::error!("Server stopped: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
