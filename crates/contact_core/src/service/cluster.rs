//! Cluster discovery over shared contact attributes.
//!
//! # Responsibility
//! - Resolve the full set of contacts transitively connected to a seed email
//!   and/or phone number.
//!
//! # Invariants
//! - Traversal is an iterative breadth-first worklist, never recursive.
//! - Each attribute value is expanded at most once, so traversal terminates
//!   after at most one round per distinct value.
//! - Link edges are followed alongside attribute edges: an unvisited
//!   `linked_id` target is read by id, and each primary's secondaries are
//!   read once. A secondary that holds only a value its primary lacks still
//!   resolves to the whole cluster.
//! - Contacts already visited are never requested by id again.
//! - Output is ordered by `created_at ASC, id ASC`.

use crate::model::contact::{Contact, ContactId};
use crate::repo::contact_repo::{ContactRepository, RepoResult};
use log::debug;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

/// Unexpanded values for the next traversal round.
#[derive(Debug, Default)]
struct Frontier {
    emails: Vec<String>,
    phone_numbers: Vec<String>,
    /// Link targets not visited yet, read by id.
    link_targets: Vec<ContactId>,
    /// Primaries whose secondaries have not been read yet.
    primary_ids: Vec<ContactId>,
}

impl Frontier {
    fn is_empty(&self) -> bool {
        self.emails.is_empty()
            && self.phone_numbers.is_empty()
            && self.link_targets.is_empty()
            && self.primary_ids.is_empty()
    }
}

/// Values already enqueued at least once.
#[derive(Debug, Default)]
struct Seen {
    emails: HashSet<String>,
    phone_numbers: HashSet<String>,
    link_targets: HashSet<ContactId>,
    primary_ids: HashSet<ContactId>,
}

impl Seen {
    fn enqueue_contact(
        &mut self,
        contact: &Contact,
        visited: &HashMap<ContactId, Contact>,
        next: &mut Frontier,
    ) {
        if let Some(email) = contact.email.as_deref() {
            if self.emails.insert(email.to_string()) {
                next.emails.push(email.to_string());
            }
        }
        if let Some(phone_number) = contact.phone_number.as_deref() {
            if self.phone_numbers.insert(phone_number.to_string()) {
                next.phone_numbers.push(phone_number.to_string());
            }
        }
        if let Some(target) = contact.linked_id {
            if !visited.contains_key(&target) && self.link_targets.insert(target) {
                next.link_targets.push(target);
            }
        }
        if contact.is_primary() && self.primary_ids.insert(contact.id) {
            next.primary_ids.push(contact.id);
        }
    }
}

/// Finds every contact reachable from the seed values.
///
/// Returns an empty list when no contact matches either seed, without
/// touching the store when both seeds are `None`.
pub fn find_cluster<R: ContactRepository + ?Sized>(
    repo: &R,
    seed_email: Option<&str>,
    seed_phone: Option<&str>,
) -> RepoResult<Vec<Contact>> {
    let mut seen = Seen::default();
    let mut frontier = Frontier::default();

    if let Some(email) = seed_email {
        seen.emails.insert(email.to_string());
        frontier.emails.push(email.to_string());
    }
    if let Some(phone_number) = seed_phone {
        seen.phone_numbers.insert(phone_number.to_string());
        frontier.phone_numbers.push(phone_number.to_string());
    }

    let mut visited: HashMap<ContactId, Contact> = HashMap::new();
    let mut rounds = 0usize;

    while !frontier.is_empty() {
        rounds += 1;
        let current = std::mem::take(&mut frontier);

        let mut batch = repo.find_many(&current.emails, &current.phone_numbers)?;
        batch.extend(repo.find_by_ids(&current.link_targets)?);
        batch.extend(repo.find_linked(&current.primary_ids)?);

        let mut fresh = Vec::new();
        for contact in batch {
            if let Entry::Vacant(slot) = visited.entry(contact.id) {
                fresh.push(contact.id);
                slot.insert(contact);
            }
        }
        for id in &fresh {
            if let Some(contact) = visited.get(id) {
                seen.enqueue_contact(contact, &visited, &mut frontier);
            }
        }
    }

    let mut cluster: Vec<Contact> = visited.into_values().collect();
    cluster.sort_by_key(Contact::election_key);

    debug!(
        "event=cluster_fetch module=service status=ok rounds={} contacts={}",
        rounds,
        cluster.len()
    );

    Ok(cluster)
}

#[cfg(test)]
mod tests {
    use super::find_cluster;
    use crate::db::open_db_in_memory;
    use crate::model::contact::{Contact, ContactId, ContactLinkUpdate, NewContact};
    use crate::repo::contact_repo::{ContactRepository, RepoResult, SqliteContactRepository};
    use std::cell::RefCell;

    /// Records every id requested through `find_by_ids`.
    struct RecordingRepo<'conn> {
        inner: SqliteContactRepository<'conn>,
        by_id_requests: RefCell<Vec<ContactId>>,
    }

    impl ContactRepository for RecordingRepo<'_> {
        fn find_many(&self, emails: &[String], phones: &[String]) -> RepoResult<Vec<Contact>> {
            self.inner.find_many(emails, phones)
        }

        fn find_by_ids(&self, ids: &[ContactId]) -> RepoResult<Vec<Contact>> {
            self.by_id_requests.borrow_mut().extend_from_slice(ids);
            self.inner.find_by_ids(ids)
        }

        fn find_linked(&self, primary_ids: &[ContactId]) -> RepoResult<Vec<Contact>> {
            self.inner.find_linked(primary_ids)
        }

        fn create_contact(&self, contact: &NewContact) -> RepoResult<Contact> {
            self.inner.create_contact(contact)
        }

        fn update_many(&self, ids: &[ContactId], update: &ContactLinkUpdate) -> RepoResult<usize> {
            self.inner.update_many(ids, update)
        }

        fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>> {
            self.inner.get_contact(id)
        }
    }

    fn some(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    #[test]
    fn empty_seeds_return_empty_cluster() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteContactRepository::try_new(&conn).unwrap();
        repo.create_contact(&NewContact::primary(some("a@x.com"), None))
            .unwrap();

        assert!(find_cluster(&repo, None, None).unwrap().is_empty());
        assert!(find_cluster(&repo, Some("b@x.com"), Some("999"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn traversal_alternates_between_emails_and_phones() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteContactRepository::try_new(&conn).unwrap();
        let a = repo
            .create_contact(&NewContact::primary(some("e1@x.com"), some("p1")))
            .unwrap();
        let b = repo
            .create_contact(&NewContact::primary(some("e2@x.com"), some("p1")))
            .unwrap();
        let c = repo
            .create_contact(&NewContact::primary(some("e2@x.com"), some("p2")))
            .unwrap();
        let d = repo
            .create_contact(&NewContact::primary(None, some("p2")))
            .unwrap();
        let unrelated = repo
            .create_contact(&NewContact::primary(some("e9@x.com"), some("p9")))
            .unwrap();

        let cluster = find_cluster(&repo, Some("e1@x.com"), None).unwrap();
        let ids: Vec<_> = cluster.iter().map(|contact| contact.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id, d.id]);
        assert!(!ids.contains(&unrelated.id));
    }

    #[test]
    fn secondary_without_shared_attributes_is_reached_through_its_link() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteContactRepository::try_new(&conn).unwrap();
        let primary = repo
            .create_contact(&NewContact::primary(some("e1@x.com"), some("p1")))
            .unwrap();
        let phone_only = repo
            .create_contact(&NewContact::secondary(None, some("p2"), primary.id))
            .unwrap();
        let email_only = repo
            .create_contact(&NewContact::secondary(some("e3@x.com"), None, primary.id))
            .unwrap();

        let ids: Vec<_> = find_cluster(&repo, None, Some("p2"))
            .unwrap()
            .into_iter()
            .map(|contact| contact.id)
            .collect();
        assert_eq!(ids, vec![primary.id, phone_only.id, email_only.id]);
    }

    #[test]
    fn visited_contacts_are_not_requested_by_id() {
        let conn = open_db_in_memory().unwrap();
        let repo = RecordingRepo {
            inner: SqliteContactRepository::try_new(&conn).unwrap(),
            by_id_requests: RefCell::new(Vec::new()),
        };
        let primary = repo
            .create_contact(&NewContact::primary(some("e1@x.com"), some("p1")))
            .unwrap();
        let shared = repo
            .create_contact(&NewContact::secondary(some("e2@x.com"), some("p1"), primary.id))
            .unwrap();
        let phone_only = repo
            .create_contact(&NewContact::secondary(None, some("p2"), primary.id))
            .unwrap();

        let ids: Vec<_> = find_cluster(&repo, Some("e1@x.com"), None)
            .unwrap()
            .into_iter()
            .map(|contact| contact.id)
            .collect();
        assert_eq!(ids, vec![primary.id, shared.id, phone_only.id]);
        assert!(repo.by_id_requests.borrow().is_empty());

        repo.by_id_requests.borrow_mut().clear();
        let ids: Vec<_> = find_cluster(&repo, None, Some("p2"))
            .unwrap()
            .into_iter()
            .map(|contact| contact.id)
            .collect();
        assert_eq!(ids, vec![primary.id, shared.id, phone_only.id]);
        assert_eq!(*repo.by_id_requests.borrow(), vec![primary.id]);
    }
}
