//! Main entry point for the zipserve binary.
//!
//! Serves a directory over HTTP; zip archives anywhere in the tree (and
//! zips inside those) can be browsed like ordinary folders.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use zipserve::{Cli, Close, FileSystem, OsFs, ZipOpenFs, server};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.log_filter() {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();

    let meta = std::fs::metadata(&cli.root)
        .with_context(|| format!("cannot access {}", cli.root.display()))?;
    anyhow::ensure!(meta.is_dir(), "{} is not a directory", cli.root.display());

    let fs = Arc::new(ZipOpenFs::new(OsFs::new(&cli.root)));
    info!(fs = %fs.describe(), "root filesystem ready");

    let listener = TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("cannot listen on {}", cli.listen))?;
    info!(addr = %listener.local_addr()?, "serving");

    server::serve(listener, fs.clone(), shutdown_signal())
        .await
        .context("HTTP server failed")?;

    match Arc::try_unwrap(fs) {
        Ok(mut fs) => fs.close().context("failed to close root filesystem")?,
        Err(_) => warn!("root filesystem still referenced at exit, not closed"),
    }
    info!("bye");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("graceful shutdown initiated");
}
