use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use bsfm_core::{CoreConfig, FileStorageService};

/// Main entry point for the blob store service
///
/// Loads configuration from the environment (and `.env` when present), then serves the
/// REST API until interrupted.
///
/// # Environment Variables
/// - `BSFM_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `BSFM_ACTIVE_ROOT`, `BSFM_ARCHIVED_ROOT`, `BSFM_HEADER_ROOT`, `BSFM_SPECIAL_ROOT`:
///   storage roots (required)
/// - `BSFM_ARCHIVE_AFTER_DAYS`: age in days after which content resolves to the archived
///   root (default: 0, never)
/// - `BSFM_METADATA_FILE`: metadata store file
/// - `CLAMAV_HOST`, `CLAMAV_PORT`, `CLAMAV_TIMEOUT_SECS`: clamd connection
/// - `BSFM_FILES_GROUP`, `BSFM_HEADERS_GROUP`, `BSFM_SPECIALS_GROUP`: optional group (name or
///   gid) per category
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bsfm_run=info".parse()?)
                .add_directive("bsfm_core=info".parse()?)
                .add_directive("bsfm_files=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("BSFM_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let config = CoreConfig::from_env()?;
    let service = FileStorageService::from_config(&config)?;
    tracing::info!(
        "Storage roots: active={} archived={} headers={} specials={}",
        config.roots().active.display(),
        config.roots().archived.display(),
        config.roots().headers.display(),
        config.roots().specials.display()
    );

    tracing::info!("++ Starting blob store REST on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, router(AppState::new(service)))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
