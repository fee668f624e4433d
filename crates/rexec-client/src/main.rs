//! rexec binary entry point.
//!
//! Attach to a replica of a compute unit and run a command there.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use rexec_client::{
    Attachment, CallerIo, Cli, ClusterRouter, ClustersConfig, SessionRunner, connect_host,
    stdin_is_tty, terminal_size,
};
use rexec_core::session::{Finalizer, ProcessExit};
use rexec_core::{Error, Result};

fn main() {
    let cli = Cli::parse();

    let log_format = cli.log_format.into();
    if let Err(e) = rexec_core::init_logging(cli.verbose, cli.log_file.as_deref(), log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!(version = env!("CARGO_PKG_VERSION"), unit = %cli.unit, "rexec starting");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("rexec: failed to create runtime: {}", e);
            std::process::exit(1);
        }
    };

    // A session ends the process through its exit hook; reaching the end of
    // `run` means setup failed before a session existed.
    if let Err(e) = runtime.block_on(run(&cli)) {
        error!(error = %e, "rexec failed");
        if e.is_application_error() {
            eprintln!("rexec: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let path = cli.clusters_path().ok_or_else(|| Error::Config {
        message: "no clusters file; pass --clusters".to_string(),
    })?;
    let clusters = ClustersConfig::load(&path)?;
    let config = cli.session_config();
    let router = Arc::new(ClusterRouter::new(clusters.backends(), config.discovery_timeout)?);

    let host = match &cli.host_socket {
        Some(path) => Some(connect_host(path).await?),
        None => None,
    };
    // Losing the host transport ends the session.
    let cancel = host
        .as_ref()
        .map(|conn| conn.closed().child_token())
        .unwrap_or_default();

    let attachment = Attachment {
        io: CallerIo::process(),
        host: host.as_ref().map(|conn| conn.dispatcher()),
        raw_mode: stdin_is_tty(),
        os_signals: true,
        term_size: terminal_size(),
    };

    SessionRunner::new(router, config)
        .run(cli.exec_request(), attachment, cancel, &Finalizer::new(), &ProcessExit)
        .await?;
    Ok(())
}
