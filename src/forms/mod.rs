//! Validation of submitted data before it reaches the repositories.
//!
//! Every form reports all of its failures at once as
//! [`crate::error::AccountError::Validation`], keyed by field.

mod change;
mod creation;
mod profile;

pub use change::*;
pub use creation::*;
pub use profile::*;

use std::borrow::Cow;

use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::{AccountError, Result};

/// Outcome of a single field rule.
type Checked<T> = std::result::Result<T, ValidationError>;

fn error(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}

/// Field-level rules, as a mutable error set.
fn field_rules(form: &impl Validate) -> ValidationErrors {
    form.validate().err().unwrap_or_default()
}

/// Whether `field` already failed.
fn failed(errors: &ValidationErrors, field: &str) -> bool {
    errors.field_errors().contains_key(field)
}

/// Record a failed check under `field`.
fn collect<T>(errors: &mut ValidationErrors, field: &'static str, checked: Checked<T>) -> Option<T> {
    match checked {
        Ok(value) => Some(value),
        Err(err) => {
            errors.add(field, err);
            None
        },
    }
}

/// Raise a single field error.
fn raise<T>(field: &'static str, checked: Checked<T>) -> Result<T> {
    checked.map_err(|err| {
        let mut errors = ValidationErrors::new();
        errors.add(field, err);
        AccountError::Validation(errors)
    })
}

/// `Ok` when nothing failed.
fn finish(errors: ValidationErrors) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AccountError::Validation(errors))
    }
}

#[cfg(test)]
pub(crate) fn messages(err: &AccountError, field: &str) -> Vec<String> {
    match err {
        AccountError::Validation(errors) => errors
            .field_errors()
            .get(field)
            .map(|issues| issues.iter().map(ToString::to_string).collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}
