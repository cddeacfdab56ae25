// Endpoint executor
//
// Builds and sends one HTTP request for one configured endpoint: path
// placeholder substitution, base → endpoint header merging, credential
// decoration and method dispatch. The response is handed back untouched.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, trace};
use url::Url;

use crate::auth::{self, TokenStore};
use crate::error::Error;
use crate::model::{Api, RequestSpec};

/// Placeholder name → literal value, extracted from an inbound topic.
pub type Params = HashMap<String, String>;

/// Issues HTTP requests for configured endpoints.
///
/// Cheap to share: the underlying `reqwest::Client` pools connections
/// across every API.
#[derive(Debug, Clone)]
pub struct Executor {
    http: reqwest::Client,
    tokens: Arc<TokenStore>,
}

impl Executor {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenStore>) -> Self {
        Self { http, tokens }
    }

    /// The token store consulted for Bearer/Header credentials.
    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Substitute every `%name%` in `template` with its value in `params`.
    ///
    /// Placeholders without a value are left as-is.
    pub fn substitute(template: &str, params: Option<&Params>) -> String {
        let Some(params) = params else {
            return template.to_owned();
        };
        params.iter().fold(template.to_owned(), |path, (name, value)| {
            path.replace(&format!("%{name}%"), value)
        })
    }

    /// `{base_url}/{path}` with placeholders substituted.
    pub fn build_url(api: &Api, request: &RequestSpec, params: Option<&Params>) -> Result<Url, Error> {
        let path = Self::substitute(&request.path, params);
        let raw = format!(
            "{}/{}",
            api.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&raw).map_err(|source| Error::InvalidUrl { url: raw, source })
    }

    // ── Headers ──────────────────────────────────────────────────────

    /// API-wide headers overlaid with request-specific ones.
    fn headers(api: &Api, request: &RequestSpec) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        for (name, value) in api.headers.iter().chain(request.headers.iter()) {
            let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                Error::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                }
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| Error::InvalidHeader {
                name: name.clone(),
                message: e.to_string(),
            })?;
            headers.insert(header, value);
        }
        Ok(headers)
    }

    // ── Execution ────────────────────────────────────────────────────

    /// Send the request described by `request` on behalf of `api`.
    ///
    /// Returns the raw response whatever its status.
    pub async fn execute(
        &self,
        api: &Api,
        request: &RequestSpec,
        params: Option<&Params>,
        body: Option<Bytes>,
    ) -> Result<reqwest::Response, Error> {
        let url = Self::build_url(api, request, params)?;
        let headers = Self::headers(api, request)?;

        debug!(api = %api.name, method = ?request.method, %url, "executing request");

        let mut builder = self
            .http
            .request(request.method.into(), url)
            .headers(headers);

        if request.method.has_body() {
            let body = body.unwrap_or_default();
            trace!(bytes = body.len(), "request body");
            builder = builder.body(body);
        }

        let token = self.tokens.token(api);
        let builder = auth::apply(api, token.as_ref(), builder)?;

        let resp = builder.send().await?;
        debug!(api = %api.name, status = %resp.status(), "response received");
        Ok(resp)
    }

    /// Like [`execute`](Self::execute), but any non-success status becomes
    /// [`Error::Status`].
    pub async fn execute_checked(
        &self,
        api: &Api,
        request: &RequestSpec,
        params: Option<&Params>,
        body: Option<Bytes>,
    ) -> Result<reqwest::Response, Error> {
        let resp = self.execute(api, request, params, body).await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(Error::Status {
            status,
            body: body.chars().take(200).collect(),
        })
    }
}
