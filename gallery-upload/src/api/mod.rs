//! HTTP surface of the service.
//!
//! - **[`handlers`]**: axum route handlers
//! - **[`models`]**: request/response bodies
//!
//! The upload endpoint is served at both `POST /upload` and `POST /`, with `OPTIONS` preflight on
//! the same paths. API documentation is available at `/docs` when the server is running.

pub mod handlers;
pub mod models;
