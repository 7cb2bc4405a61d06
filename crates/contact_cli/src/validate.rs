//! Request-body validation ahead of the identify core.
//!
//! # Invariants
//! - `email`, when present, must look like an address.
//! - `phoneNumber` may be a string or a number; numbers become strings.
//! - Any other shape is rejected before the store is touched.

use contact_core::{IdentifyRequest, PhoneInput};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+'-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
        .expect("valid email regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Body is not JSON or has the wrong field types.
    MalformedBody(String),
    /// `email` is present but not an address.
    InvalidEmail,
}

impl Display for RequestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedBody(message) => write!(f, "malformed request body: {message}"),
            Self::InvalidEmail => write!(f, "email must be a valid email address"),
        }
    }
}

impl Error for RequestError {}

/// Parses and validates a JSON identify body.
pub fn parse_body(body: &str) -> Result<IdentifyRequest, RequestError> {
    let request: IdentifyRequest =
        serde_json::from_str(body).map_err(|err| RequestError::MalformedBody(err.to_string()))?;
    validate_request(request)
}

/// Builds a validated request from separate flag values.
pub fn from_flags(
    email: Option<&str>,
    phone: Option<&str>,
) -> Result<IdentifyRequest, RequestError> {
    validate_request(IdentifyRequest::new(email, phone.map(PhoneInput::from)))
}

/// Checks email syntax and coerces numeric phone numbers to text.
pub fn validate_request(request: IdentifyRequest) -> Result<IdentifyRequest, RequestError> {
    if let Some(email) = request.email.as_deref() {
        if !EMAIL_RE.is_match(email.trim()) {
            return Err(RequestError::InvalidEmail);
        }
    }

    Ok(IdentifyRequest {
        email: request.email,
        phone_number: request
            .phone_number
            .map(|phone| PhoneInput::Text(phone.to_string())),
    })
}
