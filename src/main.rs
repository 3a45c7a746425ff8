pub mod alarm;
pub mod api;
pub mod broadcast;
pub mod config;
pub mod correlator;
pub mod mqtt;
pub mod sensors;

use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::api::AppState;
use crate::broadcast::BroadcasterHandle;
use crate::config::Config;
use crate::correlator::CommandCorrelator;
use crate::mqtt::{BusGateway, MqttHandle};
use crate::sensors::SensorProxy;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = Config::resolve_path(std::env::args().nth(1));
    let config = Config::load(config_path.as_deref())
        .await
        .map_err(|e| eyre!("Failed to load configuration: {}", e))?;

    let shutdown = CancellationToken::new();

    let (bus, mqtt_task) = MqttHandle::spawn(&config.mqtt, shutdown.clone());
    let (broadcaster, broadcast_task) = BroadcasterHandle::spawn(
        bus.subscribe(&config.mqtt.state_topic),
        config.broadcast_settings(),
        shutdown.clone(),
    );

    let bus_status = bus.status();
    let correlator = CommandCorrelator::new(
        Arc::new(bus),
        broadcaster.clone(),
        config.correlator_settings(),
    );
    let sensors = SensorProxy::new(&config.home_assistant)
        .map_err(|e| eyre!("Failed to set up sensor proxy: {}", e))?;

    let router = api::build_router(AppState {
        correlator: Arc::new(correlator),
        broadcaster,
        sensors: Arc::new(sensors),
        bus_status,
    });

    let listener = tokio::net::TcpListener::bind(config.http.listen_addr)
        .await
        .map_err(|e| eyre!("Failed to bind {}: {}", config.http.listen_addr, e))?;
    info!("Keypad bridge listening on {}", config.http.listen_addr);

    let server_shutdown = shutdown.clone();
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
                _ = server_shutdown.cancelled() => {}
            }
        })
        .await;

    shutdown.cancel();
    for (name, task) in [("MQTT", mqtt_task), ("broadcaster", broadcast_task)] {
        if let Err(e) = task.await {
            error!("{} task ended abnormally: {}", name, e);
        }
    }

    served.map_err(|e| eyre!("HTTP server failed: {}", e))?;
    info!("Keypad bridge stopped");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
