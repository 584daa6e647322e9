// ABOUTME: Validated deployment group names.
// ABOUTME: Group names key the deploy lock, so they must be filesystem-safe.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

const MAX_LEN: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupNameError {
    #[error("group name cannot be empty")]
    Empty,

    #[error("group name exceeds maximum length of {MAX_LEN} characters")]
    TooLong,

    #[error("group name cannot start with '.'")]
    LeadingDot,

    #[error("invalid character in group name: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct GroupName(String);

impl GroupName {
    pub fn new(value: &str) -> Result<Self, GroupNameError> {
        if value.is_empty() {
            return Err(GroupNameError::Empty);
        }
        if value.len() > MAX_LEN {
            return Err(GroupNameError::TooLong);
        }
        if value.starts_with('.') {
            return Err(GroupNameError::LeadingDot);
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(GroupNameError::InvalidChar(c));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for GroupName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        GroupName::new(&s).map_err(serde::de::Error::custom)
    }
}
