// Pub/sub transport boundary
//
// The bridge talks to the broker only through this trait. The production
// implementation is `MqttClient`; tests substitute an in-memory recorder.

use std::future::Future;

use bytes::Bytes;
pub use rumqttc::QoS;

use crate::error::CoreError;

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Outbound half of a connected pub/sub client.
///
/// Inbound messages are delivered separately, through the channel returned
/// when the connection is opened.
pub trait Transport: Send + Sync + 'static {
    fn subscribe(&self, filter: &str, qos: QoS) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: QoS,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn disconnect(&self) -> impl Future<Output = Result<(), CoreError>> + Send;
}
