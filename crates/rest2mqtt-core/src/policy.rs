// Re-authentication policy
//
// Wraps one endpoint call. A 401 triggers a single login for the owning API
// followed by exactly one retry; every other outcome, including a second
// 401, goes back to the caller untouched. No backoff, no loop.

use std::future::Future;

use rest2mqtt_api::{Api, Authenticator, Error as ApiError};
use tracing::{info, warn};

/// Something that can log an API in.
pub trait Authenticate: Send + Sync {
    /// Fetch and store a fresh token for `api`.
    ///
    /// `Ok(false)` means the login endpoint refused the credentials.
    fn authenticate(&self, api: &Api) -> impl Future<Output = Result<bool, ApiError>> + Send;
}

impl Authenticate for Authenticator {
    fn authenticate(&self, api: &Api) -> impl Future<Output = Result<bool, ApiError>> + Send {
        Authenticator::authenticate(self, api)
    }
}

/// Run `op`, re-authenticating once and retrying once on HTTP 401.
///
/// An error from the login itself replaces the 401.
pub async fn with_reauth<A, F, Fut, T>(auth: &A, api: &Api, mut op: F) -> Result<T, ApiError>
where
    A: Authenticate,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    match op().await {
        Err(e) if e.is_unauthorized() => {
            warn!(api = %api.name, "access denied, re-authenticating");
            if auth.authenticate(api).await? {
                info!(api = %api.name, "retrying after authentication");
            } else {
                warn!(api = %api.name, "authentication rejected, retrying anyway");
            }
            op().await
        }
        other => other,
    }
}
