// ── MQTT client ──
//
// `rumqttc`-backed implementation of the transport boundary. The event
// loop runs on its own task: it forwards publishes to the inbound channel,
// logs connection transitions and re-polls after a fixed delay when the
// connection drops. The session is persistent, so the broker restores
// prior subscriptions on reconnect.

use std::time::Duration;

use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{MqttSettings, default_client_id};
use crate::error::CoreError;
use crate::transport::{InboundMessage, Transport};

const REQUEST_CHANNEL_SIZE: usize = 64;
const INBOUND_CHANNEL_SIZE: usize = 256;

/// A connected MQTT client.
#[derive(Debug, Clone)]
pub struct MqttClient {
    client: AsyncClient,
}

impl MqttClient {
    /// Open a connection to the broker described by `settings`.
    ///
    /// Returns the client, the channel inbound messages arrive on, and the
    /// event-loop task. The task ends after a clean disconnect, when the
    /// inbound receiver is dropped, or when `cancel` fires.
    pub fn connect(
        settings: &MqttSettings,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<InboundMessage>, JoinHandle<()>) {
        let client_id = match settings.client_id.trim() {
            "" => default_client_id(),
            id => id.to_owned(),
        };

        let mut options = MqttOptions::new(client_id.clone(), settings.host.clone(), settings.port);
        options
            .set_keep_alive(settings.keep_alive)
            .set_clean_session(false);
        if let Some(username) = settings.username.as_deref().filter(|u| !u.is_empty()) {
            let password = settings
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_owned())
                .unwrap_or_default();
            options.set_credentials(username, password);
        }

        info!(
            host = %settings.host,
            port = settings.port,
            client_id = %client_id,
            "connecting to MQTT broker"
        );

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_SIZE);
        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_SIZE);
        let handle = tokio::spawn(event_loop_task(
            eventloop,
            tx,
            settings.reconnect_delay,
            cancel,
        ));

        (Self { client }, rx, handle)
    }
}

impl Transport for MqttClient {
    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), CoreError> {
        self.client.subscribe(filter, qos).await?;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), CoreError> {
        self.client.publish_bytes(topic, qos, false, payload).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), CoreError> {
        self.client.disconnect().await?;
        Ok(())
    }
}

// ── Event loop ───────────────────────────────────────────────────────

async fn event_loop_task(
    mut eventloop: EventLoop,
    tx: mpsc::Sender<InboundMessage>,
    reconnect_delay: Duration,
    cancel: CancellationToken,
) {
    let mut connected = false;

    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                connected = true;
                info!(session_present = ack.session_present, "connected to MQTT broker");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage {
                    topic: publish.topic,
                    payload: publish.payload,
                };
                if tx.send(message).await.is_err() {
                    debug!("inbound receiver dropped, stopping event loop");
                    break;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("disconnected from MQTT broker");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if connected {
                    error!(error = %e, "disconnected from MQTT broker with error");
                } else {
                    error!(error = %e, "unable to connect to MQTT broker");
                }
                connected = false;

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(reconnect_delay) => {
                        debug!(delay = ?reconnect_delay, "reconnecting");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    use super::*;

    const CONNACK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

    /// A QoS 0 PUBLISH packet.
    fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
        let remaining = 2 + topic.len() + payload.len();
        let mut packet = vec![0x30, u8::try_from(remaining).unwrap()];
        packet.extend_from_slice(&u16::try_from(topic.len()).unwrap().to_be_bytes());
        packet.extend_from_slice(topic.as_bytes());
        packet.extend_from_slice(payload);
        packet
    }

    fn settings(port: u16, reconnect_delay: Duration) -> MqttSettings {
        let mut settings = MqttSettings::new("127.0.0.1");
        settings.port = port;
        settings.reconnect_delay = reconnect_delay;
        settings.client_id = "rest2mqtt-test".into();
        settings
    }

    /// Accepts every connection and closes it straight away.
    async fn refusing_broker() -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(socket);
            }
        });
        (port, attempts)
    }

    async fn wait_for(attempts: &AtomicUsize, at_least: usize) {
        for _ in 0..200 {
            if attempts.load(Ordering::SeqCst) >= at_least {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("only {} connection attempts", attempts.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dropped_connections_are_retried_after_delay() {
        let (port, attempts) = refusing_broker().await;
        let cancel = CancellationToken::new();
        let (_client, _inbound, handle) =
            MqttClient::connect(&settings(port, Duration::from_millis(20)), cancel.clone());

        wait_for(&attempts, 3).await;
        assert!(!handle.is_finished());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn unreachable_broker_keeps_polling_until_cancelled() {
        let cancel = CancellationToken::new();
        let (_client, _inbound, handle) =
            MqttClient::connect(&settings(1, Duration::from_millis(20)), cancel.clone());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!handle.is_finished());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_interrupts_reconnect_delay() {
        let (port, attempts) = refusing_broker().await;
        let cancel = CancellationToken::new();
        let (_client, _inbound, handle) =
            MqttClient::connect(&settings(port, Duration::from_secs(60)), cancel.clone());

        wait_for(&attempts, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn publishes_are_forwarded_until_receiver_drops() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (release, released) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut connect = [0u8; 256];
            let _ = socket.read(&mut connect).await.unwrap();
            socket.write_all(&CONNACK).await.unwrap();
            socket
                .write_all(&publish_packet("home/weather/get/oslo", b"hi"))
                .await
                .unwrap();
            released.await.ok();
            socket
                .write_all(&publish_packet("home/weather/get/oslo", b"again"))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let cancel = CancellationToken::new();
        let (_client, mut inbound, handle) =
            MqttClient::connect(&settings(port, Duration::from_secs(60)), cancel);

        let message = tokio::time::timeout(Duration::from_secs(2), inbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.topic, "home/weather/get/oslo");
        assert_eq!(message.payload, Bytes::from_static(b"hi"));

        drop(inbound);
        release.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
