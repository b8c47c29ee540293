//! Fraud transaction scoring pipeline: a streaming, per-user stateful rule
//! engine combined with an external model's prediction, producing
//! ALLOW/REVIEW/BLOCK decisions with idempotent persistence.

pub mod admin;
pub mod config;
pub mod domain;
pub mod error;
pub mod features;
pub mod model;
pub mod rules;
pub mod scoring;
pub mod sink;
pub mod state;
pub mod stream;
pub mod telemetry;
