pub mod auth;
pub mod response;

pub use auth::{require_auth, BearerToken};
pub use response::{ApiResponse, ApiResult, ErrorEnvelope, Message};
