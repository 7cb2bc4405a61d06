//! Identify use-case service: cluster consolidation.
//!
//! # Responsibility
//! - Elect one primary per cluster and demote every competing primary.
//! - Record genuinely new email/phone information as one secondary.
//! - Run the whole read/modify/read sequence in a single write transaction.
//!
//! # Invariants
//! - The earliest-created member (lowest id on ties) is the primary.
//! - After consolidation every other member links directly to the primary.
//! - Repeating an already-known `(email, phone)` pair creates nothing.
//! - Callers get a fully consolidated response or an error, never a partial
//!   result; `identify_contact` rolls back all writes on error.

use crate::model::contact::{Contact, ContactId, ContactLinkUpdate, LinkPrecedence, NewContact};
use crate::repo::contact_repo::{ContactRepository, RepoError, SqliteContactRepository};
use crate::service::cluster::find_cluster;
use crate::service::normalize::{normalize_input, IdentifyRequest, NormalizedInput};
use crate::service::response::{build_response, IdentifyResponse};
use log::{debug, error, info, warn};
use rusqlite::{Connection, TransactionBehavior};
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Service error for identify use-cases.
#[derive(Debug)]
pub enum IdentifyError {
    /// Neither an email nor a phone number survived normalization.
    Validation(String),
    /// Store unreachable or query failure. Not retried.
    Storage(RepoError),
    /// Persisted cluster state breaks the single-primary invariant.
    InvariantViolation(String),
}

impl Display for IdentifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(message) => write!(f, "invalid identify request: {message}"),
            Self::Storage(err) => write!(f, "contact store failure: {err}"),
            Self::InvariantViolation(details) => {
                write!(f, "contact cluster invariant violated: {details}")
            }
        }
    }
}

impl Error for IdentifyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for IdentifyError {
    fn from(value: RepoError) -> Self {
        Self::Storage(value)
    }
}

impl From<rusqlite::Error> for IdentifyError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(RepoError::from(value))
    }
}

impl IdentifyError {
    /// Stable code for log lines and outer error mapping.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::Storage(_) => "storage_failed",
            Self::InvariantViolation(_) => "invariant_violation",
        }
    }
}

/// Outcome of consolidating one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consolidation {
    /// Final cluster ordered by `created_at ASC, id ASC`.
    pub cluster: Vec<Contact>,
    /// Elected primary as persisted after consolidation.
    pub primary: Contact,
    /// Contacts whose link state was rewritten to point at `primary`.
    pub relinked_ids: Vec<ContactId>,
    /// Contact inserted by this request, if any.
    pub created_id: Option<ContactId>,
}

/// Identify service facade over repository implementations.
pub struct IdentifyService<R: ContactRepository> {
    repo: R,
}

impl<R: ContactRepository> IdentifyService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Normalizes, consolidates and summarizes one identify request.
    ///
    /// Writes go straight to the repository; wrap the repository's connection
    /// in a transaction (see `identify_contact`) to serialize concurrent
    /// requests.
    pub fn identify(&self, request: &IdentifyRequest) -> Result<IdentifyResponse, IdentifyError> {
        let input = normalize_input(request)?;
        self.identify_normalized(&input)
    }

    /// Runs consolidation for already-normalized input.
    pub fn identify_normalized(
        &self,
        input: &NormalizedInput,
    ) -> Result<IdentifyResponse, IdentifyError> {
        let cluster = self.find_cluster(input.email.as_deref(), input.phone_number.as_deref())?;
        let consolidation = self.consolidate(
            input.email.as_deref(),
            input.phone_number.as_deref(),
            cluster,
        )?;
        Ok(build_response(&consolidation.primary, &consolidation.cluster))
    }

    /// Resolves the cluster reachable from the given values without writing.
    pub fn find_cluster(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<Contact>, IdentifyError> {
        Ok(find_cluster(&self.repo, email, phone_number)?)
    }

    /// Consolidates `cluster` for the given input values.
    ///
    /// # Contract
    /// - Empty cluster: creates one primary carrying the input values.
    /// - Otherwise: elects the primary, demotes competing primaries, adds one
    ///   secondary for unseen values and re-resolves the cluster.
    pub fn consolidate(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
        cluster: Vec<Contact>,
    ) -> Result<Consolidation, IdentifyError> {
        if cluster.is_empty() {
            let created = self.repo.create_contact(&NewContact::primary(
                email.map(str::to_string),
                phone_number.map(str::to_string),
            ))?;
            debug!(
                "event=contact_create module=service status=ok precedence=primary contact_id={}",
                created.id
            );
            return Ok(Consolidation {
                created_id: Some(created.id),
                cluster: vec![created.clone()],
                primary: created,
                relinked_ids: Vec::new(),
            });
        }

        if !cluster.iter().any(Contact::is_primary) {
            return Err(IdentifyError::InvariantViolation(format!(
                "cluster of {} contacts has no primary member",
                cluster.len()
            )));
        }

        let mut primary = cluster
            .iter()
            .min_by_key(|contact| contact.election_key())
            .cloned()
            .ok_or_else(|| {
                IdentifyError::InvariantViolation("no electable primary".to_string())
            })?;
        let mut working: BTreeMap<ContactId, Contact> = cluster
            .into_iter()
            .map(|contact| (contact.id, contact))
            .collect();

        if !primary.is_primary() {
            warn!(
                "event=primary_promote module=service status=repair contact_id={}",
                primary.id
            );
            self.repo.update_many(&[primary.id], &ContactLinkUpdate::promote())?;
            primary.link_precedence = LinkPrecedence::Primary;
            primary.linked_id = None;
            working.insert(primary.id, primary.clone());
        }

        let relinked_ids: Vec<ContactId> = working
            .values()
            .filter(|contact| contact.id != primary.id)
            .filter(|contact| contact.is_primary() || contact.linked_id != Some(primary.id))
            .map(|contact| contact.id)
            .collect();
        if !relinked_ids.is_empty() {
            let update = ContactLinkUpdate::demote_to(primary.id);
            let changed = self.repo.update_many(&relinked_ids, &update)?;
            for id in &relinked_ids {
                if let Some(contact) = working.get_mut(id) {
                    contact.link_precedence = update.link_precedence;
                    contact.linked_id = update.linked_id;
                }
            }
            debug!(
                "event=contact_relink module=service status=ok primary_id={} relinked={} changed={}",
                primary.id,
                relinked_ids.len(),
                changed
            );
        }

        let created_id = self.add_new_information(&mut working, &primary, email, phone_number)?;

        let refetched = find_cluster(
            &self.repo,
            primary.email.as_deref().or(email),
            primary.phone_number.as_deref().or(phone_number),
        )?;
        for contact in refetched {
            working.insert(contact.id, contact);
        }

        let mut final_cluster: Vec<Contact> = working.into_values().collect();
        final_cluster.sort_by_key(Contact::election_key);
        if let Some(persisted) = final_cluster.iter().find(|contact| contact.id == primary.id) {
            primary = persisted.clone();
        }

        Ok(Consolidation {
            cluster: final_cluster,
            primary,
            relinked_ids,
            created_id,
        })
    }

    fn add_new_information(
        &self,
        working: &mut BTreeMap<ContactId, Contact>,
        primary: &Contact,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Option<ContactId>, IdentifyError> {
        let known_emails: HashSet<&str> = working
            .values()
            .filter_map(|contact| contact.email.as_deref())
            .collect();
        let known_phones: HashSet<&str> = working
            .values()
            .filter_map(|contact| contact.phone_number.as_deref())
            .collect();

        let needs_new_email = email.is_some_and(|value| !known_emails.contains(value));
        let needs_new_phone = phone_number.is_some_and(|value| !known_phones.contains(value));
        if !needs_new_email && !needs_new_phone {
            return Ok(None);
        }

        let pair_exists = working.values().any(|contact| {
            contact.email.as_deref() == email && contact.phone_number.as_deref() == phone_number
        });
        if pair_exists {
            return Ok(None);
        }

        let new_contact = NewContact::secondary(
            email.filter(|_| needs_new_email).map(str::to_string),
            phone_number.filter(|_| needs_new_phone).map(str::to_string),
            primary.id,
        );
        let created = self.repo.create_contact(&new_contact)?;
        debug!(
            "event=contact_create module=service status=ok precedence=secondary contact_id={} primary_id={} new_email={} new_phone={}",
            created.id, primary.id, needs_new_email, needs_new_phone
        );

        let created_id = created.id;
        working.insert(created_id, created);
        Ok(Some(created_id))
    }
}

/// Runs one identify request against `conn` inside a single
/// `BEGIN IMMEDIATE` transaction.
///
/// The immediate transaction takes the database write lock before cluster
/// traversal, so overlapping requests are serialized and cannot each create
/// a primary for the same cluster. Any error rolls back every write made by
/// this request.
///
/// # Errors
/// - `Validation` when both identifiers are blank; raised before the
///   transaction starts.
/// - `Storage` for connection, schema or query failures.
/// - `InvariantViolation` when persisted state has no primary to elect.
pub fn identify_contact(
    conn: &mut Connection,
    request: &IdentifyRequest,
) -> Result<IdentifyResponse, IdentifyError> {
    let started_at = Instant::now();
    let input = match normalize_input(request) {
        Ok(input) => input,
        Err(err) => {
            warn!(
                "event=identify module=service status=rejected error_code={}",
                err.code()
            );
            return Err(err);
        }
    };

    match identify_in_transaction(conn, &input) {
        Ok(response) => {
            info!(
                "event=identify module=service status=ok primary_id={} emails={} phones={} secondaries={} duration_ms={}",
                response.contact.primary_contact_id,
                response.contact.emails.len(),
                response.contact.phone_numbers.len(),
                response.contact.secondary_contact_ids.len(),
                started_at.elapsed().as_millis()
            );
            Ok(response)
        }
        Err(err) => {
            error!(
                "event=identify module=service status=error duration_ms={} error_code={} error={}",
                started_at.elapsed().as_millis(),
                err.code(),
                err
            );
            Err(err)
        }
    }
}

fn identify_in_transaction(
    conn: &mut Connection,
    input: &NormalizedInput,
) -> Result<IdentifyResponse, IdentifyError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let response = {
        let repo = SqliteContactRepository::try_new(&tx)?;
        IdentifyService::new(repo).identify_normalized(input)?
    };
    tx.commit()?;
    Ok(response)
}
