use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use axum::http::HeaderValue;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uploader::api;
use uploader::config::Config;
use uploader::utils::cli::Args;
use uploader::utils::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "uploader=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = validate_config(&args).await?;
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(config).await?);

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutting down");
}

async fn validate_config(args: &Args) -> anyhow::Result<Config> {
    let mut validation_errors = Vec::new();

    let root_dir = PathBuf::from(&args.root);
    match tokio::fs::metadata(&root_dir).await {
        Ok(meta) if !meta.is_dir() => validation_errors.push(format!(
            "UPLOADER_ROOTDIR `{}` exists but is not a directory",
            args.root,
        )),
        Ok(_) => {}
        Err(_) => {
            if let Err(err) = tokio::fs::create_dir_all(&root_dir).await {
                validation_errors.push(format!(
                    "UPLOADER_ROOTDIR `{}` cannot be created: {err}",
                    args.root,
                ));
            }
        }
    }

    if args.max_chunk_bytes == 0 {
        validation_errors.push("UPLOADER_MAX_CHUNK_BYTES must be greater than zero".to_string());
    }
    if args.merge_concurrency == 0 {
        validation_errors.push("UPLOADER_MERGE_CONCURRENCY must be greater than zero".to_string());
    }

    let mut cors_origins = Vec::new();
    for origin in args
        .cors_origin
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
    {
        match HeaderValue::from_str(origin) {
            Ok(value) => cors_origins.push(value),
            Err(_) => validation_errors.push(format!("invalid CORS origin `{origin}`")),
        }
    }

    if !validation_errors.is_empty() {
        bail!("{}", validation_errors.join("\n"));
    }

    Ok(Config {
        host: args.host.clone(),
        port: args.port,
        root_dir,
        max_chunk_bytes: args.max_chunk_bytes,
        merge_concurrency: args.merge_concurrency,
        cors_origins,
    })
}
