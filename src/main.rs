use std::{process, sync::Arc, time::Duration};

use bridge_mqtt::MqttConnector;
use bridge_pubsub::PubSubSink;
use pubsub_bridge::{
    config::Config,
    core::{signals, Backoff, ConnectionSupervisor, OutboundRelay},
    logger::LoggerManager,
    print_error, print_warn,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            print_warn!("Failed to read .env file: {}", e);
        }
    }

    let cfg = Config::new().unwrap_or_else(|e| {
        print_error!("{}", e);
        process::exit(1);
    });

    let mut logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });
    info!("Starting pubsub-bridge version {}...", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", cfg.logger.level);
    debug!("Bridge settings: {:?}", cfg.bridge);

    let connector = MqttConnector::new(cfg.mqtt.clone()).unwrap_or_else(|e| {
        error!("Failed to create MQTT connector: {}", e);
        process::exit(1);
    });
    let sink = PubSubSink::from_config(&cfg.pubsub).unwrap_or_else(|e| {
        error!("Failed to create Pub/Sub sink: {}", e);
        process::exit(1);
    });

    let cancel = CancellationToken::new();
    let relay = OutboundRelay::new(Arc::new(sink), cfg.pubsub.topic.as_str());
    let supervisor = ConnectionSupervisor::new(
        Arc::new(connector),
        relay,
        cfg.mqtt.topic.clone(),
        cancel.clone(),
    )
    .with_backoff(Backoff::new(cfg.bridge.reconnect_delay()))
    .with_shutdown_timeout(cfg.bridge.shutdown_timeout());

    let mut supervisor_task = tokio::spawn(supervisor.run());

    tokio::select! {
        result = &mut supervisor_task => {
            error!("Supervisor unexpectedly finished: {:?}", result);
            process::exit(1);
        }
        signal = signals::wait_for_shutdown_signal() => match signal {
            Ok(name) => info!("Received {}, initiating graceful shutdown...", name),
            Err(e) => error!("Failed to listen for shutdown signals, shutting down: {}", e),
        },
    }

    cancel.cancel();

    // DISCONNECT and the publish drain are each bounded by shutdown_timeout.
    let bound = cfg.bridge.shutdown_timeout() * 2 + Duration::from_secs(1);
    match tokio::time::timeout(bound, supervisor_task).await {
        Ok(Ok(())) => info!("Shutdown complete"),
        Ok(Err(e)) => error!("Supervisor task failed: {}", e),
        Err(_) => warn!("Shutdown did not complete within {:?}", bound),
    }
}
