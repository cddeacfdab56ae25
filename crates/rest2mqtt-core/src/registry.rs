// Subscription registry
//
// Holds the compiled topic pattern of every subscribe-bound endpoint and
// routes inbound topics back to their (api, endpoint) pair. Resolution
// scans entries in registration order and the first match wins, so
// overlapping patterns resolve to whichever endpoint registered first.

use std::sync::Arc;

use regex::Regex;
use rest2mqtt_api::{Api, Endpoint, Params};
use tracing::debug;

use crate::error::CoreError;
use crate::topic::{TopicError, TopicPattern};

// ── Subscription ─────────────────────────────────────────────────────

/// One registered (api, endpoint) pair.
#[derive(Debug)]
pub struct Subscription {
    api: Arc<Api>,
    key: String,
    endpoint: Endpoint,
    pattern: TopicPattern,
    matcher: Regex,
}

impl Subscription {
    pub fn api(&self) -> &Arc<Api> {
        &self.api
    }

    /// Endpoint key within the API.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn pattern(&self) -> &TopicPattern {
        &self.pattern
    }

    /// The absolute subscribe filter, `{base_topic}/{filter}`.
    pub fn filter(&self) -> String {
        self.api.topic(self.pattern.filter())
    }

    fn captures(&self, topic: &str) -> Option<Params> {
        let caps = self.matcher.captures(topic)?;
        Some(
            self.pattern
                .placeholders()
                .iter()
                .filter_map(|name| {
                    caps.name(name)
                        .map(|m| (name.clone(), m.as_str().to_owned()))
                })
                .collect(),
        )
    }
}

/// A topic resolved to its subscription, with the placeholder values.
#[derive(Debug)]
pub struct Resolved<'a> {
    pub subscription: &'a Subscription,
    pub params: Params,
}

// ── SubscriptionRegistry ─────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Vec<Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register endpoint `key` of `api` and return the absolute subscribe
    /// filter to hand to the transport.
    ///
    /// Registering the same pair twice keeps the first entry.
    pub fn register(&mut self, api: &Arc<Api>, key: &str) -> Result<String, CoreError> {
        if let Some(existing) = self
            .entries
            .iter()
            .find(|s| s.api.name == api.name && s.key == key)
        {
            return Ok(existing.filter());
        }

        let endpoint = api
            .endpoint(key)
            .ok_or_else(|| CoreError::UnknownEndpoint {
                api: api.name.clone(),
                endpoint: key.to_owned(),
            })?
            .clone();

        let pattern = TopicPattern::compile(&endpoint.mqtt.topic)?;
        let matcher = Regex::new(&pattern.anchored(&api.base_topic)).map_err(|e| {
            TopicError::Matcher {
                template: pattern.template().to_owned(),
                message: e.to_string(),
            }
        })?;

        let subscription = Subscription {
            api: Arc::clone(api),
            key: key.to_owned(),
            endpoint,
            pattern,
            matcher,
        };
        let filter = subscription.filter();
        debug!(api = %api.name, endpoint = key, %filter, "registered subscription");
        self.entries.push(subscription);
        Ok(filter)
    }

    /// The first registered subscription matching `topic`.
    pub fn resolve(&self, topic: &str) -> Option<Resolved<'_>> {
        self.entries.iter().find_map(|subscription| {
            subscription.captures(topic).map(|params| Resolved {
                subscription,
                params,
            })
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
