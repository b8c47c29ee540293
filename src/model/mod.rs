//! HTTP bridge to the external fraud model (§4.4).

pub mod client;

pub use client::{FakeModelClient, HttpModelClient, ModelClient};
