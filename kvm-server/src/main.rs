//! KVM switch server
//!
//! The always-on coordinator: builds the layout and the device registry from
//! settings, starts one driver per configured serial device, and holds the
//! application context the transport layer serves from. The HTTP/websocket
//! transport that clients (the mouse-edge detectors on each computer) talk
//! to consumes [`kvm_core::AppContext`]; it attaches where noted in `main`.

mod settings;

use anyhow::Context;
use kvm_core::{AppContext, DeviceRegistry, Driver};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kvm_server=info,kvm_core=info,kvm_protocol=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting KVM switch server");

    let settings = Settings::load();
    if let Some(path) = Settings::config_path() {
        if !path.exists() {
            if let Err(err) = settings.save() {
                warn!(%err, "could not write default settings file");
            }
        }
    }

    let mut registry = DeviceRegistry::new();
    for device in &settings.devices {
        info!(
            driver = %device.short_name,
            family = device.family.name(),
            path = %device.serial_path,
            baud = device.baud_rate,
            "registering driver"
        );
        registry
            .register(Driver::new(device.clone()))
            .with_context(|| format!("registering driver {}", device.short_name))?;
    }

    registry.start_all();

    let context = AppContext::new(registry, settings.layout.clone());

    // The HTTP/websocket transport attaches here: it serves the layout,
    // relays edge triggers into context.apply_edge_trigger, and snapshots
    // context.registry.statuses() for the status endpoints.
    info!("drivers started; waiting for shutdown signal");
    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;

    info!("shutting down");
    context.registry.shutdown_all().await;
    Ok(())
}
