pub mod authorizer;
pub mod error;

pub use authorizer::{Authorized, Authorizer, JwtAuthorizer};
pub use error::AuthError;
