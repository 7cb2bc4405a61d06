//! Identify use-case services.
//!
//! # Responsibility
//! - Normalize caller input, discover clusters, consolidate them and build
//!   the response summary.
//! - Keep callers decoupled from storage details.

pub mod cluster;
pub mod identify_service;
pub mod normalize;
pub mod response;
