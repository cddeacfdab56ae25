//! Bridging engine between declarative REST APIs and an MQTT broker.
//!
//! - **[`Bridge`]**: lifecycle owner. [`start()`](Bridge::start) loads
//!   persisted tokens, registers and subscribes every subscribe-bound
//!   endpoint and fires the on-start endpoints; [`run()`](Bridge::run)
//!   dispatches inbound messages, one task per message.
//!
//! - **[`TopicPattern`]**: compiles `%name%` topic templates into a match
//!   expression and a wildcard subscribe filter.
//!
//! - **[`SubscriptionRegistry`]**: first-match routing of inbound topics to
//!   their (api, endpoint) pair and placeholder values.
//!
//! - **[`with_reauth`]**: the single-shot "log in again and retry once"
//!   policy applied to every endpoint call.
//!
//! - **[`Transport`]**: the pub/sub boundary, implemented over `rumqttc` by
//!   [`MqttClient`].

pub mod bridge;
pub mod config;
pub mod error;
pub mod mqtt;
pub mod policy;
pub mod publish;
pub mod registry;
pub mod topic;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{Bridge, BridgeState, Dispatch};
pub use config::{BridgeConfig, MqttSettings};
pub use error::CoreError;
pub use mqtt::MqttClient;
pub use policy::{Authenticate, with_reauth};
pub use registry::{Resolved, Subscription, SubscriptionRegistry};
pub use topic::{TopicError, TopicPattern};
pub use transport::{InboundMessage, QoS, Transport};
