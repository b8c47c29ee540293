//! Outbound publish and durable persistence for a finished decision (§4.7).

pub mod decision_store;
pub mod publisher;

pub use decision_store::DecisionStore;
