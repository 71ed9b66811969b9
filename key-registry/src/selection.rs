//! Policies for picking one healthy credential per call.

use std::fmt;
use std::str::FromStr;

use crate::credential::{CredentialId, CredentialRecord};

/// How a credential is chosen among the healthy set.
///
/// Every policy skips inactive credentials and credentials at or above the
/// failure threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// First healthy credential in insertion order.
    #[default]
    FirstHealthy,
    /// Healthy credentials in turn, starting after the last one handed out.
    RoundRobin,
    /// Healthy credential with the oldest `last_used`; never-used credentials first.
    LeastRecentlyUsed,
}

#[derive(Debug, PartialEq, Eq)]
pub struct SelectionPolicyParseError(pub String);

impl fmt::Display for SelectionPolicyParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unknown credential selection policy: {}", self.0)
    }
}

impl std::error::Error for SelectionPolicyParseError {}

impl FromStr for SelectionPolicy {
    type Err = SelectionPolicyParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "first-healthy" => Ok(SelectionPolicy::FirstHealthy),
            "round-robin" => Ok(SelectionPolicy::RoundRobin),
            "least-recently-used" => Ok(SelectionPolicy::LeastRecentlyUsed),
            _ => Err(SelectionPolicyParseError(value.to_string())),
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SelectionPolicy::FirstHealthy => write!(f, "first-healthy"),
            SelectionPolicy::RoundRobin => write!(f, "round-robin"),
            SelectionPolicy::LeastRecentlyUsed => write!(f, "least-recently-used"),
        }
    }
}

impl SelectionPolicy {
    /// Returns the index of the credential to use, advancing `cursor` for round-robin.
    /// Credentials listed in `exclude` are treated as unhealthy.
    pub(crate) fn select(
        &self,
        credentials: &[CredentialRecord],
        failure_threshold: u32,
        exclude: &[CredentialId],
        cursor: &mut usize,
    ) -> Option<usize> {
        let healthy =
            |c: &CredentialRecord| c.is_healthy(failure_threshold) && !exclude.contains(&c.id());
        match self {
            SelectionPolicy::FirstHealthy => credentials.iter().position(healthy),
            SelectionPolicy::RoundRobin => {
                let len = credentials.len();
                let start = if len == 0 { 0 } else { *cursor % len };
                let index = (0..len)
                    .map(|offset| (start + offset) % len)
                    .find(|&i| healthy(&credentials[i]))?;
                *cursor = index + 1;
                Some(index)
            }
            SelectionPolicy::LeastRecentlyUsed => credentials
                .iter()
                .enumerate()
                .filter(|(_, c)| healthy(c))
                .min_by_key(|(_, c)| c.usage().last_used)
                .map(|(i, _)| i),
        }
    }
}
