//! Wire payloads exchanged with the scheduling service.
//!
//! Deserialization is the first validation step; `validate()` adds the
//! checks a type system alone cannot express (non-empty token, server
//! assigned id on persisted activities).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Schema validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("{model}: field '{field}' {reason}")]
    Invalid {
        model: &'static str,
        field: &'static str,
        reason: &'static str,
    },
}

/// A typed response payload that can be checked after deserialization.
pub trait Validate {
    fn validate(&self) -> Result<(), SchemaError>;
}

/// Credentials used once for registration and once for login.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub email: String,
    pub password: String,
}

impl Account {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl Validate for Account {
    fn validate(&self) -> Result<(), SchemaError> {
        if self.email.is_empty() {
            return Err(SchemaError::Invalid {
                model: "Account",
                field: "email",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

/// Successful login body.
#[derive(Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

impl std::fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginResponse")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl Validate for LoginResponse {
    fn validate(&self) -> Result<(), SchemaError> {
        if self.token.is_empty() {
            return Err(SchemaError::Invalid {
                model: "LoginResponse",
                field: "token",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

/// A schedulable unit of work.
///
/// `id` is absent on creation requests and server-assigned on responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityType {
    pub title: String,
    pub content: String,
    pub time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl ActivityType {
    /// Server-assigned id of a persisted activity.
    pub fn persisted_id(&self) -> Result<i64, SchemaError> {
        self.id.ok_or(SchemaError::Invalid {
            model: "ActivityType",
            field: "id",
            reason: "missing on a persisted activity",
        })
    }
}

impl Validate for ActivityType {
    fn validate(&self) -> Result<(), SchemaError> {
        self.persisted_id().map(|_| ())
    }
}

impl<T: Validate> Validate for Vec<T> {
    fn validate(&self) -> Result<(), SchemaError> {
        self.iter().try_for_each(Validate::validate)
    }
}

/// Requested activity fields.
///
/// Any field left as `None` is filled by the activity client, either with a
/// random value or, for merges, with the existing record's value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityFields {
    pub title: Option<String>,
    pub content: Option<String>,
    pub time: Option<i64>,
}

impl ActivityFields {
    /// Explicit values for every field.
    pub fn new(title: impl Into<String>, content: impl Into<String>, time: i64) -> Self {
        Self {
            title: Some(title.into()),
            content: Some(content.into()),
            time: Some(time),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_time(mut self, time: i64) -> Self {
        self.time = Some(time);
        self
    }
}

/// Pagination window for listing activities, `[start, end)`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ListParams {
    pub start: usize,
    pub end: usize,
}
