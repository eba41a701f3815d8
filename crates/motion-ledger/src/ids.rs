//! Identifiers
//!
//! Both identifiers end up as path components (the job workspace directory,
//! the storage key `<owner_id>/<job_id>/<file>`), so they are restricted to
//! ASCII alphanumerics, `-` and `_`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Length of generated job ids (hex characters)
const GENERATED_JOB_ID_LEN: usize = 12;
const MAX_ID_LEN: usize = 128;

/// Identifier validation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("identifier must not be empty")]
    Empty,
    #[error("identifier exceeds {MAX_ID_LEN} characters")]
    TooLong,
    #[error("identifier contains forbidden character {0:?}")]
    ForbiddenChar(char),
}

fn validate_component(raw: &str) -> Result<(), IdError> {
    if raw.is_empty() {
        return Err(IdError::Empty);
    }
    if raw.len() > MAX_ID_LEN {
        return Err(IdError::TooLong);
    }
    if let Some(c) = raw
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(IdError::ForbiddenChar(c));
    }
    Ok(())
}

/// Opaque short job identifier, immutable once assigned
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Allocate a fresh identifier
    #[must_use]
    pub fn generate() -> Self {
        let mut hex = Uuid::new_v4().simple().to_string();
        hex.truncate(GENERATED_JOB_ID_LEN);
        Self(hex)
    }

    /// Validate an externally supplied identifier
    ///
    /// # Errors
    /// Returns [`IdError`] for empty, oversized or non path-safe input.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let raw = raw.trim();
        validate_component(raw)?;
        Ok(Self(raw.to_string()))
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for JobId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

/// Stable identifier of an authenticated user
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    /// Validate an owner identifier
    ///
    /// # Errors
    /// Returns [`IdError`] for empty, oversized or non path-safe input.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let raw = raw.trim();
        validate_component(raw)?;
        Ok(Self(raw.to_string()))
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OwnerId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OwnerId> for String {
    fn from(id: OwnerId) -> Self {
        id.0
    }
}
