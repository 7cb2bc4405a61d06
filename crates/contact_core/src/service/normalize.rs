//! Input normalization for identify requests.
//!
//! # Invariants
//! - Emails are trimmed and lowercased; phones are stringified and trimmed.
//! - Blank values collapse to `None`.
//! - A request with neither value is rejected before any store access.

use crate::service::identify_service::IdentifyError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Raw phone value as callers send it: text or a bare number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PhoneInput {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl Display for PhoneInput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for PhoneInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PhoneInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for PhoneInput {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// Identify request body. Field names follow the external JSON contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<PhoneInput>,
}

impl IdentifyRequest {
    pub fn new(email: Option<&str>, phone_number: Option<PhoneInput>) -> Self {
        Self {
            email: email.map(str::to_string),
            phone_number,
        }
    }
}

/// Canonical identifiers used for store lookups and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedInput {
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

pub fn normalize_email(email: Option<&str>) -> Option<String> {
    let trimmed = email?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_lowercase())
}

pub fn normalize_phone(phone_number: Option<&PhoneInput>) -> Option<String> {
    let text = phone_number?.to_string();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

/// Normalizes both identifiers and rejects requests carrying neither.
pub fn normalize_input(request: &IdentifyRequest) -> Result<NormalizedInput, IdentifyError> {
    let email = normalize_email(request.email.as_deref());
    let phone_number = normalize_phone(request.phone_number.as_ref());

    if email.is_none() && phone_number.is_none() {
        return Err(IdentifyError::Validation(
            "at least one of email or phoneNumber is required".to_string(),
        ));
    }

    Ok(NormalizedInput {
        email,
        phone_number,
    })
}

#[cfg(test)]
mod tests {
    use super::{normalize_email, normalize_input, normalize_phone, IdentifyRequest, PhoneInput};
    use crate::service::identify_service::IdentifyError;

    #[test]
    fn email_is_trimmed_and_lowercased() {
        assert_eq!(
            normalize_email(Some("  Doc@HillValley.EDU ")).as_deref(),
            Some("doc@hillvalley.edu")
        );
        assert_eq!(normalize_email(Some("   ")), None);
        assert_eq!(normalize_email(None), None);
    }

    #[test]
    fn numeric_phone_is_stringified() {
        assert_eq!(
            normalize_phone(Some(&PhoneInput::Integer(123456))).as_deref(),
            Some("123456")
        );
        assert_eq!(
            normalize_phone(Some(&PhoneInput::Float(123456.0))).as_deref(),
            Some("123456")
        );
        assert_eq!(
            normalize_phone(Some(&PhoneInput::from(" 555-0101 "))).as_deref(),
            Some("555-0101")
        );
        assert_eq!(normalize_phone(Some(&PhoneInput::from(""))), None);
    }

    #[test]
    fn request_without_identifiers_is_rejected() {
        let err = normalize_input(&IdentifyRequest::default()).unwrap_err();
        assert!(matches!(err, IdentifyError::Validation(_)));

        let blank = IdentifyRequest::new(Some("  "), Some(PhoneInput::from(" ")));
        let err = normalize_input(&blank).unwrap_err();
        assert!(matches!(err, IdentifyError::Validation(_)));
    }

    #[test]
    fn request_with_one_identifier_is_accepted() {
        let input = normalize_input(&IdentifyRequest::new(None, Some(PhoneInput::from("42"))))
            .expect("phone-only request should normalize");
        assert_eq!(input.email, None);
        assert_eq!(input.phone_number.as_deref(), Some("42"));
    }
}
