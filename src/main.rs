mod config;
mod downloads;
mod error;
mod extractor;
mod formats;
mod routes;
mod service;
mod sites;

use std::{io, path::PathBuf, sync::Arc};

use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{
    config::Config,
    extractor::{MediaExtractor, YtDlp},
    routes::AppState,
    service::MediaService,
};

#[derive(Debug, Error)]
enum StartupError {
    #[error("could not create download directory {path:?}")]
    DownloadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not listen on {addr}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("HTTP server error")]
    Serve(#[source] io::Error),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "clipfetch=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        match std::error::Error::source(&error) {
            Some(source) => eprintln!("Server error: {error}: {source}"),
            None => eprintln!("Server error: {error}"),
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config = Config::from_env();
    if config.uses_dev_session_secret() {
        warn!("SESSION_SECRET is not set. Falling back to the development key.");
    }

    tokio::fs::create_dir_all(&config.download_dir)
        .await
        .map_err(|source| StartupError::DownloadDir {
            path: config.download_dir.clone(),
            source,
        })?;

    let extractor = Arc::new(YtDlp::new(
        config.ytdlp_bin.clone(),
        config.extractor_timeout,
    ));
    info!(
        "Using {} ({}) with up to {} concurrent jobs, keeping {} downloads in {:?}",
        extractor.name(),
        config.ytdlp_bin,
        config.max_concurrent_jobs,
        config.max_retained_downloads,
        config.download_dir
    );

    let state = AppState {
        media: Arc::new(MediaService::new(extractor, &config)),
    };
    let app = routes::router(state, &config.static_dir);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: config.bind_addr.clone(),
            source,
        })?;

    info!("Server ready at http://{}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .map_err(StartupError::Serve)
}
