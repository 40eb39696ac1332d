#![deny(unused)]
//! Testbed - ephemeral test container control plane
//!
//! Diagnostic entry point: checks that the configured engine is reachable and
//! reports what the lifecycle engine will see.

use std::sync::Arc;

use testbed_core::config::TestbedConfig;
use testbed_core::telemetry::configure_tracing;
use testbed_core::{EngineGateway, ImageReference};
use testbed_docker::DockerGateway;
use testbed_engine::{CacheMode, EngineCapabilities, ImageCache};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = TestbedConfig::load()?;
    configure_tracing(&config.logging)?;

    tracing::info!("Starting Testbed diagnostics v{}", env!("CARGO_PKG_VERSION"));

    // =========================================================================
    // Engine connection
    // =========================================================================
    let docker = DockerGateway::connect(&config.docker)?;
    if let Err(e) = docker.ping().await {
        tracing::error!(error = %e, "Docker daemon not reachable");
        return Err(e.into());
    }
    let gateway: Arc<dyn EngineGateway> = Arc::new(docker);

    let info = gateway.info().await?;
    tracing::info!(
        server_version = ?info.server_version,
        api_version = ?info.api_version,
        os = ?info.operating_system,
        "Connected to engine"
    );

    // =========================================================================
    // Capabilities
    // =========================================================================
    let capabilities = EngineCapabilities::new(gateway.clone());
    let exec_supported = capabilities.supports_exec().await?;
    tracing::info!(exec_supported, "Checked exec support");

    // =========================================================================
    // Image cache
    // =========================================================================
    let images = ImageCache::new(gateway.clone(), &config.images);
    // Any lookup triggers the one-time population.
    let sample: ImageReference = "alpine:latest".parse()?;
    let alpine = images.get(&sample).await?;
    match images.mode() {
        Some(CacheMode::Populated) => {
            tracing::info!(cached = images.len(), alpine = alpine.is_some(), "Image cache populated")
        }
        _ => tracing::info!("Image listing unavailable, images resolved per reference"),
    }

    println!(
        "server={} exec={} cached_images={}",
        info.server_version.as_deref().unwrap_or("unknown"),
        exec_supported,
        images.len()
    );

    Ok(())
}
