//! Field rules shared by the request DTOs and the user service.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::Serialize;
use time::{macros::format_description, Date, Month, OffsetDateTime};
use validator::{ValidationError, ValidationErrors};

use super::repo_types::Gender;

pub const MAX_AGE_YEARS: i32 = 150;
pub const NAME_MAX_LEN: usize = 100;
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 100;
pub const PASSWORD_MIN_LEN: usize = 6;

/// Field name to message, one message per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    /// Keeps the first message recorded for a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|(field, msg)| format!("{field}: {msg}"))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut out = FieldErrors::default();
        for (field, errs) in errors.field_errors() {
            if let Some(err) = errs.first() {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid {field}"));
                out.add(field.to_string(), message);
            }
        }
        out
    }
}

/// Strict `YYYY-MM-DD`.
pub fn parse_iso_date(raw: &str) -> Option<Date> {
    Date::parse(raw, format_description!("[year]-[month]-[day]")).ok()
}

pub fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Oldest accepted birthdate for `today`. Feb 29 rolls over to Mar 1.
pub fn earliest_birthdate(today: Date) -> Date {
    let year = today.year() - MAX_AGE_YEARS;
    today.replace_year(year).unwrap_or_else(|_| {
        Date::from_calendar_date(year, Month::March, 1).unwrap_or(Date::MIN)
    })
}

/// Parses and range-checks a birthdate against `today`.
pub fn check_birthdate_on(raw: &str, today: Date) -> Result<Date, &'static str> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("Birthdate is required");
    }
    let date = parse_iso_date(raw).ok_or("Invalid birthdate (YYYY-MM-DD)")?;
    if date > today {
        return Err("Birthdate cannot be in the future");
    }
    if date < earliest_birthdate(today) {
        return Err("Birthdate cannot be more than 150 years ago");
    }
    Ok(date)
}

pub fn check_birthdate(raw: &str) -> Result<Date, &'static str> {
    check_birthdate_on(raw, today_utc())
}

pub fn check_username(raw: &str) -> Result<(), &'static str> {
    let len = raw.trim().chars().count();
    if len == 0 {
        return Err("Username is required");
    }
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err("Username length must be 3–100 characters");
    }
    Ok(())
}

pub fn check_name(raw: &str, required: &'static str, too_long: &'static str) -> Result<(), &'static str> {
    let len = raw.trim().chars().count();
    if len == 0 {
        return Err(required);
    }
    if len > NAME_MAX_LEN {
        return Err(too_long);
    }
    Ok(())
}

fn to_validation_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

// `validator` custom hooks

pub fn validate_username(value: &str) -> Result<(), ValidationError> {
    check_username(value).map_err(|m| to_validation_error("username", m))
}

pub fn validate_first_name(value: &str) -> Result<(), ValidationError> {
    check_name(value, "First name is required", "Max first name length is 100 characters")
        .map_err(|m| to_validation_error("first_name", m))
}

pub fn validate_last_name(value: &str) -> Result<(), ValidationError> {
    check_name(value, "Last name is required", "Max last name length is 100 characters")
        .map_err(|m| to_validation_error("last_name", m))
}

pub fn validate_gender(value: &str) -> Result<(), ValidationError> {
    Gender::parse(value)
        .map(|_| ())
        .ok_or_else(|| to_validation_error("gender", "Invalid gender value"))
}

pub fn validate_birthdate(value: &str) -> Result<(), ValidationError> {
    check_birthdate(value)
        .map(|_| ())
        .map_err(|m| to_validation_error("birthdate", m))
}

/// Empty means "keep the current password".
pub fn validate_optional_password(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || value.chars().count() >= PASSWORD_MIN_LEN {
        Ok(())
    } else {
        Err(to_validation_error(
            "password",
            "Password must be at least 6 characters",
        ))
    }
}

/// Empty means "keep the current birthdate".
pub fn validate_optional_birthdate(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Ok(());
    }
    validate_birthdate(value)
}
