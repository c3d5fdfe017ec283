//! HTTP middleware stack for the storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP context)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Security headers (CSP, frame and sniffing protection)
//! 5. Session layer (tower-sessions)
//! 6. Rate limiting (governor), when enabled
//!
//! Authentication is enforced per handler by the extractors in [`auth`].
//! Request bodies go through [`AppJson`], which keeps rejections in the
//! `{"message"}` error shape.

pub mod auth;
pub mod json;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{
    AuthRejection, OptionalAuth, RequireAdmin, RequireAuth, clear_current_user, set_current_user,
};
pub use json::AppJson;
pub use rate_limit::{api_rate_limiter, auth_rate_limiter};
pub use request_id::{RequestId, request_id_middleware};
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;
