//! Domain model for contact identity reconciliation.
//!
//! # Responsibility
//! - Define the contact record shared by the store and the identify flow.
//!
//! # Invariants
//! - Every contact carries at least one identifying attribute.
//! - A contact is linked iff it is secondary.
//! - Contacts are never physically deleted; only their link state changes.

pub mod contact;
