//! BIM Portal health check
//!
//! Verifies public connectivity, credentials (when configured) and,
//! optionally, a project PDF export. Exits non-zero if any step fails.
//!
//! Configured through the same environment variables as the client library,
//! plus `BIM_PORTAL_EXPORT_GUID` to select the project to export.

use bim_portal_client::export::{export_filename, ExportWriter};
use bim_portal_client::models::{AiaResource, ExportFormat};
use bim_portal_client::{AuthOutcome, Config, ResourceClient};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bim_portal_client=info,bim_portal_health=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        base_url = %config.base_url,
        authenticated = config.credentials.is_some(),
        auth_retry_limit = config.auth_retry_limit,
        "Configuration loaded"
    );

    let client = ResourceClient::from_config(&config)?;

    // Public connectivity, independent of the configured credentials
    let public_client = ResourceClient::from_config(&config.anonymous())?;
    let projects = public_client
        .search_aia(AiaResource::Project, None)
        .await
        .map_err(|e| {
            error!("Public project search failed: {}", e);
            e
        })?;
    info!(count = projects.len(), "Public API reachable");

    // Credentials
    match client.authenticator().authenticate().await {
        AuthOutcome::Authenticated(_) => {
            let expires_at = client.authenticator().token_store().expires_at();
            info!(expires_at = ?expires_at, "Authentication succeeded");
        }
        AuthOutcome::Unconfigured => {
            info!("No credentials configured, skipping authentication check");
        }
        AuthOutcome::Failed(e) => {
            error!("Authentication failed: {}", e);
            return Err(e.into());
        }
    }

    // Export
    if let Some(guid) = config.export_guid {
        let Some(content) = client
            .export(AiaResource::Project, guid, ExportFormat::Pdf)
            .await?
        else {
            error!(%guid, "Project PDF export returned no content");
            return Err(format!("export of project {guid} failed").into());
        };

        let writer = ExportWriter::new(config.export_directory.clone());
        let path = writer
            .save(
                &content,
                &export_filename(AiaResource::Project, guid, ExportFormat::Pdf),
            )
            .await?;
        info!(path = %path.display(), "Project PDF exported");
    }

    if client.authenticator().is_configured() {
        if let Err(e) = client.authenticator().logout().await {
            warn!("Logout failed: {}", e);
        }
    }

    info!("Health check passed");
    Ok(())
}
