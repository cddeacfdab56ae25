// rest2mqtt-api: declarative REST endpoints, HTTP execution and token authentication

pub mod auth;
pub mod encoding;
pub mod error;
pub mod executor;
pub mod login;
pub mod model;
pub mod transport;
mod xml;

pub use auth::TokenStore;
pub use error::Error;
pub use executor::{Executor, Params};
pub use login::Authenticator;
pub use model::{
    Api, AuthType, Authentication, BodyEncoding, Endpoint, Method, MqttAction, MqttBinding,
    RequestSpec,
};
pub use transport::{TlsMode, TransportConfig};
