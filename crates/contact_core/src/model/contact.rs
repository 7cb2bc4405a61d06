//! Contact domain model.
//!
//! # Responsibility
//! - Define the canonical contact record and its link precedence.
//! - Validate attribute and link invariants before persistence.
//!
//! # Invariants
//! - `email` or `phone_number` is set.
//! - `linked_id` is `Some` iff `link_precedence == Secondary`.
//! - A secondary never links to itself.
//! - `created_at` is assigned by the store and never changes.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned contact identifier. Monotonic in creation order.
pub type ContactId = i64;

/// Role of a contact inside its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPrecedence {
    /// Canonical representative, earliest-created member of the cluster.
    Primary,
    /// Any other member, linked to the primary.
    Secondary,
}

impl LinkPrecedence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "primary" => Some(Self::Primary),
            "secondary" => Some(Self::Secondary),
            _ => None,
        }
    }
}

/// Persisted contact record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: ContactId,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub link_precedence: LinkPrecedence,
    /// Primary this contact points at. Only set for secondaries.
    pub linked_id: Option<ContactId>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds. Bumped on demotion.
    pub updated_at: i64,
}

impl Contact {
    pub fn is_primary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Primary
    }

    /// Key used to elect the primary: earliest creation, lowest id on ties.
    pub fn election_key(&self) -> (i64, ContactId) {
        (self.created_at, self.id)
    }

    /// Validates attribute and link invariants of a persisted record.
    pub fn validate(&self) -> Result<(), ContactValidationError> {
        validate_fields(
            self.email.as_deref(),
            self.phone_number.as_deref(),
            self.link_precedence,
            self.linked_id,
        )?;
        if self.linked_id == Some(self.id) {
            return Err(ContactValidationError::SelfLink(self.id));
        }
        Ok(())
    }
}

/// Field set for inserting one contact; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub link_precedence: LinkPrecedence,
    pub linked_id: Option<ContactId>,
}

impl NewContact {
    /// Builds a primary contact carrying the given attributes.
    pub fn primary(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email,
            phone_number,
            link_precedence: LinkPrecedence::Primary,
            linked_id: None,
        }
    }

    /// Builds a secondary contact linked to `primary_id`.
    pub fn secondary(
        email: Option<String>,
        phone_number: Option<String>,
        primary_id: ContactId,
    ) -> Self {
        Self {
            email,
            phone_number,
            link_precedence: LinkPrecedence::Secondary,
            linked_id: Some(primary_id),
        }
    }

    pub fn validate(&self) -> Result<(), ContactValidationError> {
        validate_fields(
            self.email.as_deref(),
            self.phone_number.as_deref(),
            self.link_precedence,
            self.linked_id,
        )
    }
}

/// Link-state change applied to a batch of contacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactLinkUpdate {
    pub link_precedence: LinkPrecedence,
    pub linked_id: Option<ContactId>,
}

impl ContactLinkUpdate {
    /// Demotes contacts to secondaries of `primary_id`.
    pub fn demote_to(primary_id: ContactId) -> Self {
        Self {
            link_precedence: LinkPrecedence::Secondary,
            linked_id: Some(primary_id),
        }
    }

    /// Restores an unlinked primary.
    pub fn promote() -> Self {
        Self {
            link_precedence: LinkPrecedence::Primary,
            linked_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), ContactValidationError> {
        validate_link(self.link_precedence, self.linked_id)
    }
}

/// Contact invariant violations detected before write or after read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactValidationError {
    /// Neither email nor phone number is present.
    MissingIdentifier,
    /// Secondary contact without a `linked_id`.
    SecondaryWithoutLink,
    /// Primary contact carrying a `linked_id`.
    PrimaryWithLink(ContactId),
    /// Secondary linked to itself.
    SelfLink(ContactId),
}

impl Display for ContactValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingIdentifier => {
                write!(f, "contact requires at least one of email or phone number")
            }
            Self::SecondaryWithoutLink => write!(f, "secondary contact must set linked_id"),
            Self::PrimaryWithLink(linked_id) => {
                write!(f, "primary contact must not link to contact {linked_id}")
            }
            Self::SelfLink(id) => write!(f, "contact {id} cannot link to itself"),
        }
    }
}

impl Error for ContactValidationError {}

fn validate_fields(
    email: Option<&str>,
    phone_number: Option<&str>,
    link_precedence: LinkPrecedence,
    linked_id: Option<ContactId>,
) -> Result<(), ContactValidationError> {
    let has_email = email.is_some_and(|value| !value.is_empty());
    let has_phone = phone_number.is_some_and(|value| !value.is_empty());
    if !has_email && !has_phone {
        return Err(ContactValidationError::MissingIdentifier);
    }
    validate_link(link_precedence, linked_id)
}

fn validate_link(
    link_precedence: LinkPrecedence,
    linked_id: Option<ContactId>,
) -> Result<(), ContactValidationError> {
    match (link_precedence, linked_id) {
        (LinkPrecedence::Primary, Some(linked_id)) => {
            Err(ContactValidationError::PrimaryWithLink(linked_id))
        }
        (LinkPrecedence::Secondary, None) => Err(ContactValidationError::SecondaryWithoutLink),
        _ => Ok(()),
    }
}
