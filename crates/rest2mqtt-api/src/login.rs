// Token login
//
// Runs the login request of an API through the executor and stores the
// token it returns. Only Bearer and Header schemes fetch tokens; Basic
// credentials are static and attached per request.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, info};

use crate::encoding;
use crate::error::Error;
use crate::executor::Executor;
use crate::model::{Api, BodyEncoding, RequestSpec};

/// Performs the login call of an API and saves the resulting token.
#[derive(Debug, Clone)]
pub struct Authenticator {
    executor: Arc<Executor>,
}

impl Authenticator {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// Log in to `api` and store the fetched token.
    ///
    /// Returns `Ok(false)` when the login endpoint answers with a
    /// non-success status; the API is then left without a token. A response
    /// that does not contain the token is a configuration error.
    pub async fn authenticate(&self, api: &Api) -> Result<bool, Error> {
        let auth = &api.authentication;
        let tokens = self.executor.tokens();
        tokens.clear(api);

        let body = encoding::encode_body(auth.body_encoding, &auth.body, &auth.body_root)?;
        let request = login_request(api, auth.body_encoding);

        debug!(api = %api.name, encoding = %auth.body_encoding, "authenticating");
        let resp = self
            .executor
            .execute(api, &request, None, Some(Bytes::from(body)))
            .await?;

        let status = resp.status();
        if !status.is_success() {
            error!(api = %api.name, %status, "authentication failed");
            return Ok(false);
        }

        let text = resp.text().await?;
        let Some(token) = encoding::extract_token(auth.body_encoding, &text, &auth.token_path)?
        else {
            return Err(Error::TokenNotFound {
                api: api.name.clone(),
                path: auth.token_path.clone(),
            });
        };

        tokens.save(api, &token).await?;
        info!(api = %api.name, "authenticated");
        Ok(true)
    }
}

/// The configured login request, with a `Content-Type` matching the body
/// unless the request or the API headers already set one.
fn login_request(api: &Api, encoding: BodyEncoding) -> RequestSpec {
    let mut request = api.authentication.request.clone();
    let has_content_type = request
        .headers
        .keys()
        .chain(api.headers.keys())
        .any(|k| k.eq_ignore_ascii_case("content-type"));
    if !has_content_type {
        request.headers.insert(
            "Content-Type".to_owned(),
            encoding::content_type(encoding).to_owned(),
        );
    }
    request
}
