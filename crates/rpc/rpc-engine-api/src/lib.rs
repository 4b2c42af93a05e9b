//! Server implementation of the `engine_` namespace: version gating over the engine service,
//! the RPC error-code mapping, and the JWT bearer-auth HTTP layer consensus clients
//! authenticate with.

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

mod auth;
mod engine_api;
mod error;

pub use auth::{AuthLayer, AuthService, Claims, JwtError, JwtSecret};
pub use engine_api::{EngineApi, EngineApiMessageVersion};
pub use error::{EngineApiError, EngineApiResult, UNKNOWN_PAYLOAD_CODE};
