//! Versioned notice entities and the OCDS document envelope.
//!
//! # Responsibility
//! - Define the keyed rows persisted for releases, packages and budgets.
//! - Keep the OCDS payload opaque apart from the few routing fields the
//!   services need (`ocid`, `id`, tender status).
//!
//! # Invariants
//! - Entities are immutable once written; a change is a new row with a later
//!   timestamp.
//! - Timestamps are Unix epoch milliseconds.

pub mod budget;
pub mod ids;
pub mod ocds;
pub mod package;
pub mod release;
