//! Wire-level and persisted shapes shared by every component: the inbound
//! transaction, the outbound/persisted decision, and the closed reason-tag
//! vocabulary that ties them together.

pub mod decision;
pub mod reason;
pub mod transaction;

pub use decision::{Category, Decision};
pub use reason::{ReasonList, ReasonTag};
pub use transaction::{is_schema_valid, Device, Location, Transaction};
