// Response publication
//
// Turns one HTTP response into zero or more MQTT messages: the body is
// parsed, the endpoint selector picks nodes, and each node is published on
// its own to `{base_topic}/{topic}`. Only JSON bodies are supported.

use bytes::Bytes;
use rest2mqtt_api::encoding;
use rest2mqtt_api::{Api, BodyEncoding, Endpoint, Error as ApiError};
use tracing::debug;

use crate::error::CoreError;
use crate::transport::{QoS, Transport};

/// Delivery guarantee of every publication.
pub const PUBLISH_QOS: QoS = QoS::ExactlyOnce;

/// Select the nodes of `body` addressed by the endpoint selector, each
/// serialized back to its source encoding.
pub fn render(endpoint: &Endpoint, body: &str) -> Result<Vec<Bytes>, CoreError> {
    match endpoint.request.encoding {
        BodyEncoding::Json => {
            let document = encoding::parse_json(body)?;
            let selector = encoding::json_path(endpoint.selector())?;
            selector
                .query(&document)
                .iter()
                .map(|node| {
                    serde_json::to_vec(node)
                        .map(Bytes::from)
                        .map_err(CoreError::from)
                })
                .collect()
        }
        other @ (BodyEncoding::Yaml | BodyEncoding::Xml) => {
            Err(CoreError::Api(ApiError::UnsupportedEncoding {
                encoding: other,
                operation: "response publication",
            }))
        }
    }
}

/// Publish the selected nodes of `response` for `endpoint`.
///
/// Returns the number of messages published.
pub async fn publish<T: Transport>(
    transport: &T,
    api: &Api,
    endpoint: &Endpoint,
    response: reqwest::Response,
) -> Result<usize, CoreError> {
    let body = response.text().await.map_err(ApiError::from)?;
    let payloads = render(endpoint, &body)?;
    let topic = api.topic(&endpoint.mqtt.topic);

    debug!(api = %api.name, %topic, count = payloads.len(), "publishing response");
    for payload in &payloads {
        transport.publish(&topic, payload.clone(), PUBLISH_QOS).await?;
    }
    Ok(payloads.len())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn endpoint(selector: Option<&str>, encoding: &str) -> Endpoint {
        let selector = selector.map_or(String::new(), |s| format!("selector: '{s}'\n"));
        serde_yaml::from_str(&format!(
            "path: x\nencoding: {encoding}\nmqtt: {{ topic: out, action: publish }}\n{selector}"
        ))
        .unwrap()
    }

    #[test]
    fn each_selected_node_is_its_own_payload() {
        let body = r#"{"days": [{"t": 1}, {"t": 2}, "three"]}"#;
        let payloads = render(&endpoint(Some("$.days[*]"), "json"), body).unwrap();
        assert_eq!(
            payloads,
            vec![
                Bytes::from_static(br#"{"t":1}"#),
                Bytes::from_static(br#"{"t":2}"#),
                Bytes::from_static(br#""three""#),
            ]
        );
    }

    #[test]
    fn missing_selector_publishes_whole_document() {
        let payloads = render(&endpoint(None, "json"), r#"{ "a" : 1 }"#).unwrap();
        assert_eq!(payloads, vec![Bytes::from_static(br#"{"a":1}"#)]);
    }

    #[test]
    fn empty_selection_publishes_nothing() {
        let payloads = render(&endpoint(Some("$.missing[*]"), "json"), r#"{"a": 1}"#).unwrap();
        assert!(payloads.is_empty());
    }

    #[test]
    fn non_json_encodings_are_unsupported() {
        let err = render(&endpoint(None, "xml"), "<a/>").unwrap_err();
        assert!(
            matches!(err, CoreError::Api(ApiError::UnsupportedEncoding { .. })),
            "got: {err:?}"
        );
        assert!(err.is_configuration());
    }
}
