//! Form state and validation for the service and profile editors.

pub mod profile;
pub mod service;

use std::fmt;
use thiserror::Error;

pub use profile::{ProfileEditor, ProfileForm};
pub use service::{ServiceDraft, ServiceEditor, ServiceForm};

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("rate must be a number")]
    InvalidRate,
    #[error("rate cannot be negative")]
    NegativeRate,
    #[error("currency must be a three-letter code")]
    InvalidCurrency,
    #[error("email address is not valid")]
    InvalidEmail,
    #[error("{0} is not one of the loaded options")]
    UnknownOption(&'static str),
}

/// Every field that failed validation, in form order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, error: &FieldError) -> bool {
        self.0.contains(error)
    }

    /// `Ok(())` when nothing was rejected.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

pub(crate) fn require(errors: &mut ValidationErrors, field: &'static str, value: &str) -> bool {
    if value.trim().is_empty() {
        errors.push(FieldError::Missing(field));
        false
    } else {
        true
    }
}
