//! Weighted blend of rule and model scores, and threshold classification (§4.5).

pub mod combiner;

pub use combiner::{classify, combine};
