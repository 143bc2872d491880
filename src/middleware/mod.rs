mod auth;
mod correlation;
mod error_handler;
mod rate_limit;

pub use auth::{Principal, auth_middleware, extract_api_key};
pub use correlation::{CORRELATION_ID_HEADER, CorrelationId, correlation_id};
pub use error_handler::log_errors;
pub use rate_limit::{client_ip, rate_limit_identifier, rate_limit_middleware};
