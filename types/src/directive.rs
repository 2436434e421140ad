use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of a render directive (a script bundle kept on disk).
///
/// The name doubles as a file stem inside the directive directory, so it is
/// restricted to a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DirectiveName(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveNameError {
    #[error("directive name must not be empty")]
    Empty,
    #[error("directive name must be a single path component (got {0:?})")]
    NotAComponent(String),
}

impl DirectiveName {
    pub fn new(value: impl Into<String>) -> Result<Self, DirectiveNameError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DirectiveNameError::Empty);
        }
        if trimmed == "."
            || trimmed == ".."
            || trimmed.contains(['/', '\\'])
            || trimmed.contains('\0')
        {
            return Err(DirectiveNameError::NotAComponent(value));
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DirectiveName {
    type Error = DirectiveNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for DirectiveName {
    type Error = DirectiveNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DirectiveName> for String {
    fn from(value: DirectiveName) -> Self {
        value.0
    }
}

impl AsRef<str> for DirectiveName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for DirectiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
