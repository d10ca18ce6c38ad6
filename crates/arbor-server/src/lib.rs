//! HTTP server for Arbor.
//!
//! Exposes the branch engine, blob stores and branch directory over a JSON
//! API under `/v1`, with change notifications streamed as server-sent events.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use router::build_router;
pub use server::ArborServer;
pub use state::AppState;
