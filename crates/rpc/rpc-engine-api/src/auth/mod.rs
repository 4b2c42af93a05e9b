//! JWT bearer authentication for the engine namespace.

mod jwt_secret;
mod layer;

pub use jwt_secret::{Claims, JwtError, JwtSecret};
pub use layer::{AuthLayer, AuthService};
