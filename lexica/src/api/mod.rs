//! HTTP API: admin cache control, page reads, graph queries and the
//! scheduled regeneration trigger

pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::{router, ApiServer};
