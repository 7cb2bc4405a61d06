//! Contact identity reconciliation core.
//!
//! Links contact records that share an email or phone number into clusters
//! with exactly one primary, and summarizes a cluster for identify callers.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{
    default_log_level, init_logging, init_logging_with, logging_status, LogConfig, LoggingError,
};
pub use model::contact::{
    Contact, ContactId, ContactLinkUpdate, ContactValidationError, LinkPrecedence, NewContact,
};
pub use repo::contact_repo::{ContactRepository, RepoError, RepoResult, SqliteContactRepository};
pub use service::cluster::find_cluster;
pub use service::identify_service::{
    identify_contact, Consolidation, IdentifyError, IdentifyService,
};
pub use service::normalize::{
    normalize_email, normalize_input, normalize_phone, IdentifyRequest, NormalizedInput,
    PhoneInput,
};
pub use service::response::{build_response, ContactSummary, IdentifyResponse};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
