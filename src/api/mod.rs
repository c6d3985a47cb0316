//! HTTP API over the intake, charting and report operations.
//!
//! Handlers run database and generation work on the blocking pool, one
//! connection per request.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_api_server, ApiServer, ServerError};
pub use types::ApiContext;
