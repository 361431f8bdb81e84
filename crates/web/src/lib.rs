//! Authenticated axum HTTP surface for the ChemCloud compute gateway.
//!
//! Wires `chemgate_core`'s submission/retrieval core onto an axum
//! `Router`: the Auth Guard, the Submission and Retrieval handlers, the
//! OAuth passthrough routes, and the deferred-cleanup executor.

pub mod auth;
pub mod cleanup;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use auth::JwksCache;
pub use error::AppError;
pub use server::{build_app, run_server};
pub use state::AppState;
