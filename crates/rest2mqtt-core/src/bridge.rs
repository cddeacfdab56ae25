// ── Bridge controller ──
//
// Owns the transport handle and drives the bridge lifecycle:
//
//   Starting  load persisted tokens, register and subscribe every
//             subscribe-bound endpoint, subscribe the control topics,
//             then fire the on-start endpoints without waiting for them
//   Running   every inbound message is handled on its own task
//   Stopping  disconnect from the transport
//   Stopped
//
// The registry is frozen once Starting completes. Inbound traffic is only
// drained after that, so routing never sees a partially built registry.

use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use reqwest::StatusCode;
use rest2mqtt_api::{Api, Authenticator, Executor, Params, TokenStore};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::error::CoreError;
use crate::policy::with_reauth;
use crate::publish;
use crate::registry::{Subscription, SubscriptionRegistry};
use crate::transport::{InboundMessage, QoS, Transport};

/// Delivery guarantee requested for every subscription.
pub const SUBSCRIBE_QOS: QoS = QoS::AtMostOnce;

// ── BridgeState ──────────────────────────────────────────────────────

/// Lifecycle state observable through [`Bridge::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// What handling one inbound message amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A control message ran a publish endpoint on demand.
    Performed {
        api: String,
        endpoint: String,
        published: usize,
    },
    /// A subscribe-bound endpoint was called.
    Executed {
        api: String,
        endpoint: String,
        status: StatusCode,
    },
    /// Nothing matched the topic, or the control payload named no endpoint.
    Ignored,
}

// ── Bridge ───────────────────────────────────────────────────────────

/// The bridge between configured REST APIs and a pub/sub transport.
///
/// Cheaply cloneable via `Arc<BridgeInner>`.
pub struct Bridge<T> {
    inner: Arc<BridgeInner<T>>,
}

impl<T> Clone for Bridge<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct BridgeInner<T> {
    apis: Vec<Arc<Api>>,
    transport: T,
    executor: Arc<Executor>,
    authenticator: Authenticator,
    /// Set once, at the end of Starting.
    registry: OnceLock<SubscriptionRegistry>,
    state: watch::Sender<BridgeState>,
    cancel: CancellationToken,
}

impl<T: Transport> Bridge<T> {
    pub fn new(apis: Vec<Arc<Api>>, executor: Arc<Executor>, transport: T) -> Self {
        let (state, _) = watch::channel(BridgeState::Starting);
        Self {
            inner: Arc::new(BridgeInner {
                apis,
                transport,
                authenticator: Authenticator::new(Arc::clone(&executor)),
                executor,
                registry: OnceLock::new(),
                state,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Build the HTTP side from `config` and attach it to `transport`.
    pub fn from_config(config: &BridgeConfig, transport: T) -> Result<Self, CoreError> {
        let http = config.http.build_client()?;
        let tokens = Arc::new(TokenStore::new(&config.token_dir));
        let executor = Arc::new(Executor::new(http, tokens));
        Ok(Self::new(config.apis.clone(), executor, transport))
    }

    pub fn apis(&self) -> &[Arc<Api>] {
        &self.inner.apis
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.inner.executor
    }

    /// The frozen registry; `None` until [`start`](Self::start) succeeds.
    pub fn registry(&self) -> Option<&SubscriptionRegistry> {
        self.inner.registry.get()
    }

    /// Subscribe to lifecycle transitions.
    pub fn state(&self) -> watch::Receiver<BridgeState> {
        self.inner.state.subscribe()
    }

    /// Token cancelled by [`stop`](Self::stop). Cancelling it during
    /// [`start`](Self::start) aborts startup.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    // ── Starting ─────────────────────────────────────────────────────

    /// Run the Starting phase.
    ///
    /// Returns once every subscription is registered and subscribed. The
    /// on-start endpoints are spawned but not awaited.
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.inner.registry.get().is_some() {
            return Err(CoreError::AlreadyStarted);
        }
        self.inner.state.send_replace(BridgeState::Starting);
        info!(apis = self.inner.apis.len(), "starting bridge");

        let registry = tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => return Err(CoreError::Cancelled),
            registry = self.setup() => registry?,
        };

        let subscriptions = registry.len();
        if self.inner.registry.set(registry).is_err() {
            return Err(CoreError::AlreadyStarted);
        }

        for api in &self.inner.apis {
            for (key, _) in api.on_start_endpoints() {
                self.spawn_perform(Arc::clone(api), key.to_owned());
            }
        }

        self.inner.state.send_replace(BridgeState::Running);
        info!(subscriptions, "bridge running");
        Ok(())
    }

    async fn setup(&self) -> Result<SubscriptionRegistry, CoreError> {
        let mut registry = SubscriptionRegistry::new();
        let tokens = self.inner.executor.tokens();

        for api in &self.inner.apis {
            if tokens.load(api).await? {
                debug!(api = %api.name, "using persisted token");
            }

            for (key, _) in api.subscribe_endpoints() {
                let filter = registry.register(api, key)?;
                info!(api = %api.name, endpoint = key, %filter, "subscribing");
                self.inner.transport.subscribe(&filter, SUBSCRIBE_QOS).await?;
            }

            let control = api.control_topic();
            debug!(api = %api.name, topic = %control, "subscribing to control topic");
            self.inner.transport.subscribe(&control, SUBSCRIBE_QOS).await?;
        }

        Ok(registry)
    }

    fn spawn_perform(&self, api: Arc<Api>, key: String) -> JoinHandle<()> {
        let bridge = self.clone();
        tokio::spawn(async move {
            match bridge.perform_on(&api, &key).await {
                Ok(published) => {
                    debug!(api = %api.name, endpoint = %key, published, "on-start endpoint done");
                }
                Err(e) => {
                    error!(api = %api.name, endpoint = %key, error = %e, "on-start endpoint failed");
                }
            }
        })
    }

    // ── Running ──────────────────────────────────────────────────────

    /// Drain `inbound` until it closes or the bridge is stopped.
    ///
    /// Each message is handled on its own task; handler failures are logged
    /// and never end the loop.
    pub async fn run(&self, mut inbound: mpsc::Receiver<InboundMessage>) {
        let cancel = self.inner.cancel.clone();
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                message = inbound.recv() => {
                    let Some(message) = message else {
                        info!("inbound channel closed");
                        break;
                    };
                    self.dispatch(message);
                }
            }
        }
        debug!("dispatch loop finished");
    }

    /// Handle `message` on a new task.
    pub fn dispatch(&self, message: InboundMessage) -> JoinHandle<()> {
        let bridge = self.clone();
        tokio::spawn(async move {
            let topic = message.topic.clone();
            if let Err(e) = bridge.handle_message(message).await {
                error!(%topic, error = %e, "message handling failed");
            }
        })
    }

    /// Route one inbound message and run whatever it triggers.
    pub async fn handle_message(&self, message: InboundMessage) -> Result<Dispatch, CoreError> {
        debug!(topic = %message.topic, bytes = message.payload.len(), "received message");

        if let Some(api) = self
            .inner
            .apis
            .iter()
            .find(|api| api.control_topic() == message.topic)
        {
            let key = String::from_utf8_lossy(&message.payload).trim().to_owned();
            if api.endpoint(&key).is_none() {
                warn!(api = %api.name, endpoint = %key, "control message names no endpoint");
                return Ok(Dispatch::Ignored);
            }
            let published = self.perform_on(api, &key).await?;
            return Ok(Dispatch::Performed {
                api: api.name.clone(),
                endpoint: key,
                published,
            });
        }

        let Some(resolved) = self
            .inner
            .registry
            .get()
            .and_then(|registry| registry.resolve(&message.topic))
        else {
            debug!(topic = %message.topic, "no subscription for topic");
            return Ok(Dispatch::Ignored);
        };

        let subscription = resolved.subscription;
        debug!(
            api = %subscription.api().name,
            endpoint = subscription.key(),
            params = ?resolved.params,
            "resolved subscription"
        );
        let status = self
            .execute(subscription, &resolved.params, message.payload)
            .await?;

        Ok(Dispatch::Executed {
            api: subscription.api().name.clone(),
            endpoint: subscription.key().to_owned(),
            status,
        })
    }

    async fn execute(
        &self,
        subscription: &Subscription,
        params: &Params,
        body: Bytes,
    ) -> Result<StatusCode, CoreError> {
        let api = subscription.api().as_ref();
        let request = &subscription.endpoint().request;
        let executor = self.inner.executor.as_ref();

        let response = with_reauth(&self.inner.authenticator, api, move || {
            executor.execute_checked(api, request, Some(params), Some(body.clone()))
        })
        .await?;

        let status = response.status();
        debug!(api = %api.name, endpoint = subscription.key(), %status, "endpoint executed");
        Ok(status)
    }

    /// Execute endpoint `key` of the API named `api` and publish its
    /// response, whatever the endpoint's configured MQTT action.
    ///
    /// Returns the number of messages published.
    pub async fn perform(&self, api: &str, key: &str) -> Result<usize, CoreError> {
        let api = self
            .inner
            .apis
            .iter()
            .find(|a| a.name == api)
            .ok_or_else(|| CoreError::UnknownApi {
                name: api.to_owned(),
            })?;
        self.perform_on(api, key).await
    }

    async fn perform_on(&self, api: &Api, key: &str) -> Result<usize, CoreError> {
        let endpoint = api.endpoint(key).ok_or_else(|| CoreError::UnknownEndpoint {
            api: api.name.clone(),
            endpoint: key.to_owned(),
        })?;
        let request = &endpoint.request;
        let executor = self.inner.executor.as_ref();

        let response = with_reauth(&self.inner.authenticator, api, move || {
            executor.execute_checked(api, request, None, None)
        })
        .await?;

        publish::publish(&self.inner.transport, api, endpoint, response).await
    }

    // ── Stopping ─────────────────────────────────────────────────────

    /// Stop dispatching and disconnect from the transport.
    ///
    /// In-flight handlers are neither cancelled nor awaited.
    pub async fn stop(&self) -> Result<(), CoreError> {
        let current = *self.inner.state.borrow();
        if matches!(current, BridgeState::Stopping | BridgeState::Stopped) {
            return Ok(());
        }

        self.inner.state.send_replace(BridgeState::Stopping);
        info!("stopping bridge");
        self.inner.cancel.cancel();

        let result = self.inner.transport.disconnect().await;
        if let Err(e) = &result {
            warn!(error = %e, "transport disconnect failed");
        }

        self.inner.state.send_replace(BridgeState::Stopped);
        info!("bridge stopped");
        result
    }
}
