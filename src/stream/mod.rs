//! Inbound/outbound event bus transport and the per-worker orchestration
//! loop that ties every other component together (§4.6).

pub mod bus;
pub mod processor;

pub use processor::Worker;
