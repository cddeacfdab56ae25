// Authentication state and request decoration.
//
// Tokens are runtime state kept outside the immutable configuration: one
// entry per API name, mirrored to `{name}.auth` so a restart can reuse the
// last token without logging in again.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use reqwest::RequestBuilder;
use reqwest::header::{HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::error::Error;
use crate::model::{Api, AuthType};

// ── TokenStore ───────────────────────────────────────────────────────

/// Per-API token cache with file persistence.
///
/// The token file holds the raw token with no framing. A missing file is
/// not an error: it means the API has not been authenticated yet.
///
/// Concurrent re-authentications of the same API may race on the file;
/// the last writer wins.
#[derive(Debug)]
pub struct TokenStore {
    dir: PathBuf,
    tokens: DashMap<String, SecretString>,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::in_working_dir()
    }
}

impl TokenStore {
    /// Store token files in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tokens: DashMap::new(),
        }
    }

    /// Store token files relative to the process working directory.
    pub fn in_working_dir() -> Self {
        Self::new(".")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The token file of `api`: `{dir}/{api.name}.auth`.
    pub fn path_for(&self, api: &Api) -> PathBuf {
        self.dir.join(format!("{}.auth", api.name))
    }

    /// Load the persisted token of `api`, if any.
    ///
    /// Returns whether a token file was found.
    pub async fn load(&self, api: &Api) -> Result<bool, Error> {
        let path = self.path_for(api);
        match tokio::fs::read_to_string(&path).await {
            Ok(token) => {
                debug!(api = %api.name, path = %path.display(), "loaded persisted token");
                self.set(api, token);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.clear(api);
                Ok(false)
            }
            Err(source) => Err(Error::Io { path, source }),
        }
    }

    /// Replace the token of `api` and persist it verbatim.
    pub async fn save(&self, api: &Api, token: &str) -> Result<(), Error> {
        self.set(api, token.to_owned());

        let path = self.path_for(api);
        tokio::fs::write(&path, token)
            .await
            .map_err(|source| Error::Io { path, source })?;
        debug!(api = %api.name, "persisted token");
        Ok(())
    }

    /// The current token of `api`; `None` when empty or never set.
    pub fn token(&self, api: &Api) -> Option<SecretString> {
        self.tokens
            .get(&api.name)
            .filter(|t| !t.expose_secret().is_empty())
            .map(|t| t.value().clone())
    }

    /// Forget the in-memory token of `api`. The file is left untouched.
    pub fn clear(&self, api: &Api) {
        self.tokens.remove(&api.name);
    }

    fn set(&self, api: &Api, token: String) {
        self.tokens
            .insert(api.name.clone(), SecretString::from(token));
    }
}

// ── Request decoration ───────────────────────────────────────────────

/// Attach the credentials of `api` to a request.
///
/// Token-based schemes are skipped while no token is held; the endpoint
/// then answers 401, which is what triggers a login.
pub(crate) fn apply(
    api: &Api,
    token: Option<&SecretString>,
    builder: RequestBuilder,
) -> Result<RequestBuilder, Error> {
    let auth = &api.authentication;
    match (auth.kind, token) {
        (AuthType::None, _) | (AuthType::Bearer | AuthType::Header, None) => Ok(builder),
        (AuthType::Basic, _) => {
            let username = auth.basic_username.as_deref().unwrap_or_default();
            let password = auth.basic_password.as_ref().map(ExposeSecret::expose_secret);
            Ok(builder.basic_auth(username, password))
        }
        (AuthType::Bearer, Some(token)) => Ok(builder.bearer_auth(token.expose_secret())),
        (AuthType::Header, Some(token)) => {
            let name = auth.header_name.as_deref().unwrap_or("Authorization");
            let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                Error::InvalidHeader {
                    name: name.to_owned(),
                    message: e.to_string(),
                }
            })?;
            let mut value = HeaderValue::from_str(token.expose_secret()).map_err(|e| {
                Error::InvalidHeader {
                    name: name.to_owned(),
                    message: e.to_string(),
                }
            })?;
            value.set_sensitive(true);
            Ok(builder.header(header, value))
        }
    }
}
