//! Admin HTTP surface: `/health` liveness and `/metrics` Prometheus scrape.

pub mod logging;
pub mod routes;

pub use routes::{router, serve};
