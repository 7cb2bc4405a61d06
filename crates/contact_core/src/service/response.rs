//! Identify response assembly.
//!
//! # Invariants
//! - Emails and phone numbers are de-duplicated in first-seen order over
//!   members sorted by `created_at ASC, id ASC`.
//! - The primary's own email/phone, when present, sits at index 0.
//! - `secondary_contact_ids` is strictly ascending.

use crate::model::contact::{Contact, ContactId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Wire envelope returned to identify callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyResponse {
    pub contact: ContactSummary,
}

/// Consolidated view of one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSummary {
    /// Serialized with the `primaryContatctId` spelling existing clients expect.
    #[serde(rename = "primaryContatctId")]
    pub primary_contact_id: ContactId,
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub secondary_contact_ids: Vec<ContactId>,
}

/// Builds the response for `primary` over its consolidated `cluster`.
pub fn build_response(primary: &Contact, cluster: &[Contact]) -> IdentifyResponse {
    let mut members: Vec<&Contact> = cluster.iter().collect();
    members.sort_by_key(|contact| contact.election_key());

    let mut emails = unique_values(members.iter().map(|contact| contact.email.as_deref()));
    let mut phone_numbers =
        unique_values(members.iter().map(|contact| contact.phone_number.as_deref()));
    move_to_front(&mut emails, primary.email.as_deref());
    move_to_front(&mut phone_numbers, primary.phone_number.as_deref());

    let mut secondary_contact_ids: Vec<ContactId> = members
        .iter()
        .map(|contact| contact.id)
        .filter(|id| *id != primary.id)
        .collect();
    secondary_contact_ids.sort_unstable();
    secondary_contact_ids.dedup();

    IdentifyResponse {
        contact: ContactSummary {
            primary_contact_id: primary.id,
            emails,
            phone_numbers,
            secondary_contact_ids,
        },
    }
}

fn unique_values<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .flatten()
        .filter(|value| seen.insert(*value))
        .map(str::to_string)
        .collect()
}

fn move_to_front(values: &mut Vec<String>, head: Option<&str>) {
    let Some(head) = head else {
        return;
    };
    if let Some(position) = values.iter().position(|value| value == head) {
        let value = values.remove(position);
        values.insert(0, value);
    }
}

#[cfg(test)]
mod tests {
    use super::build_response;
    use crate::model::contact::{Contact, LinkPrecedence};

    fn contact(
        id: i64,
        created_at: i64,
        email: Option<&str>,
        phone: Option<&str>,
        linked_id: Option<i64>,
    ) -> Contact {
        Contact {
            id,
            email: email.map(str::to_string),
            phone_number: phone.map(str::to_string),
            link_precedence: if linked_id.is_some() {
                LinkPrecedence::Secondary
            } else {
                LinkPrecedence::Primary
            },
            linked_id,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn values_are_deduplicated_in_creation_order() {
        let primary = contact(1, 100, Some("a@x.com"), Some("111"), None);
        let cluster = vec![
            contact(7, 300, Some("c@x.com"), Some("111"), Some(1)),
            primary.clone(),
            contact(4, 200, Some("b@x.com"), Some("222"), Some(1)),
            contact(9, 400, Some("a@x.com"), None, Some(1)),
        ];

        let response = build_response(&primary, &cluster).contact;
        assert_eq!(response.primary_contact_id, 1);
        assert_eq!(response.emails, vec!["a@x.com", "b@x.com", "c@x.com"]);
        assert_eq!(response.phone_numbers, vec!["111", "222"]);
        assert_eq!(response.secondary_contact_ids, vec![4, 7, 9]);
    }

    #[test]
    fn primary_values_move_to_front_without_reordering_the_rest() {
        let primary = contact(2, 100, Some("p@x.com"), Some("333"), None);
        let cluster = vec![
            contact(1, 50, Some("a@x.com"), Some("111"), Some(2)),
            contact(3, 60, Some("b@x.com"), Some("222"), Some(2)),
            primary.clone(),
        ];

        let response = build_response(&primary, &cluster).contact;
        assert_eq!(response.emails, vec!["p@x.com", "a@x.com", "b@x.com"]);
        assert_eq!(response.phone_numbers, vec!["333", "111", "222"]);
        assert_eq!(response.secondary_contact_ids, vec![1, 3]);
    }

    #[test]
    fn primary_without_phone_keeps_creation_order_for_phones() {
        let primary = contact(1, 100, Some("a@x.com"), None, None);
        let cluster = vec![
            primary.clone(),
            contact(2, 200, None, Some("222"), Some(1)),
            contact(3, 300, None, Some("111"), Some(1)),
        ];

        let response = build_response(&primary, &cluster).contact;
        assert_eq!(response.phone_numbers, vec!["222", "111"]);
    }

    #[test]
    fn response_serializes_with_external_field_names() {
        let primary = contact(1, 100, Some("a@x.com"), None, None);
        let json = serde_json::to_value(build_response(&primary, &[primary.clone()])).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "contact": {
                    "primaryContatctId": 1,
                    "emails": ["a@x.com"],
                    "phoneNumbers": [],
                    "secondaryContactIds": []
                }
            })
        );
    }
}
