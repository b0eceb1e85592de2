use cds_core::{ConfigValues, SandboxConfig, Session};
use fhir::HttpConnector;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the CDS sandbox
///
/// Resolves configuration, bootstraps a session for the default patient and serves the REST
/// API until interrupted.
///
/// # Environment Variables
/// - `CDS_PATIENT_ID`: patient put in context (default: "1288992")
/// - `CDS_FHIR_SERVICE_URL`: FHIR server base URL (default: "http://hooks.smarthealthit.org:9080")
/// - `CDS_TRUSTED_ORIGINS`: comma separated origins whose messages are accepted (default: none)
/// - `CDS_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CDS_BOOTSTRAP_QUERY`: URL query string seeding the context (`patientId`, `fhirServiceUrl`)
///
/// # Errors
/// Returns an error if the logging configuration, the sandbox configuration or the HTTP client
/// cannot be initialised, or if the REST server fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cds=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SandboxConfig::from_values(ConfigValues::from_env())?;
    let rest_addr = config.rest_addr();
    let session = Arc::new(Session::from_config(config, Arc::new(HttpConnector::new()?))?);

    let query = std::env::var("CDS_BOOTSTRAP_QUERY").unwrap_or_default();
    // Fetch runs in the background; the server starts without waiting for it.
    drop(session.bootstrap(&query));

    tokio::select! {
        result = api_rest::serve(Arc::clone(&session), rest_addr) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("-- Shutting down CDS sandbox"),
    }

    session.close();

    Ok(())
}
