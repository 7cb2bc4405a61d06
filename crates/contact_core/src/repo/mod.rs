//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the store capabilities the identify flow consumes.
//! - Isolate SQLite query details from cluster orchestration.
//!
//! # Invariants
//! - Repository writes must pass contact validation before persistence.
//! - Repository reads reject invalid persisted state instead of masking it.

pub mod contact_repo;
