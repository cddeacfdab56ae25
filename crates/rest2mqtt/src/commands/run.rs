//! `rest2mqtt run`: connect, start the bridge and serve until Ctrl-C.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rest2mqtt_core::{Bridge, MqttClient};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// How long a clean MQTT disconnect may take before the event loop is cut.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    info!(version = env!("CARGO_PKG_VERSION"), "rest2mqtt");

    let config = rest2mqtt_config::load_bridge_config(&global.config)?;
    info!(config = %global.config.display(), apis = config.apis.len(), "configuration loaded");

    let connection = CancellationToken::new();
    let (client, inbound, mut event_loop) = MqttClient::connect(&config.mqtt, connection.clone());
    let bridge = Bridge::from_config(&config, client)?;

    let started = tokio::select! {
        result = bridge.start() => Some(result),
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(CliError::Signal)?;
            None
        }
    };

    let outcome = match started {
        Some(Ok(())) => {
            let runner = {
                let bridge = bridge.clone();
                tokio::spawn(async move { bridge.run(inbound).await })
            };
            let signal = tokio::signal::ctrl_c().await.map_err(CliError::Signal);
            info!("shutdown requested");
            bridge.stop().await.ok();
            if let Err(e) = runner.await {
                warn!(error = %e, "dispatch loop panicked");
            }
            signal
        }
        Some(Err(e)) => {
            bridge.stop().await.ok();
            Err(e.into())
        }
        None => {
            info!("interrupted during startup");
            bridge.stop().await.ok();
            Ok(())
        }
    };

    if tokio::time::timeout(SHUTDOWN_GRACE, &mut event_loop)
        .await
        .is_err()
    {
        connection.cancel();
        event_loop.await.ok();
    }

    outcome
}
