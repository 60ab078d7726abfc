//! Claims normalization.
//!
//! [`ClaimMapping`] turns a raw [`ClaimSet`] into a [`UserInfoRecord`]. The
//! subject claim is mandatory; every other claim is best-effort.
//!
//! ## Rules
//!
//! - `subject`: the string value of the configured subject claim (`sub` by
//!   default). Missing, empty or non-string values fail with
//!   [`Error::Unauthenticated`].
//! - `name`: the `name` claim, or `given_name` and `family_name` joined by a
//!   space when `name` is absent.
//! - `email`, `preferred_username`, `given_name`, `family_name`, `picture`:
//!   same-named string claims.
//! - `groups`: the configured groups claim (`groups` by default), either an
//!   array of strings or a single string separated by commas or whitespace.

use crate::{
    error::{Error, Result},
    types::{ClaimSet, UserInfoRecord},
};
use serde_json::Value;

pub const DEFAULT_SUBJECT_CLAIM: &str = "sub";
pub const DEFAULT_GROUPS_CLAIM: &str = "groups";

/// Names of the claims that carry the subject and the group memberships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimMapping {
    subject_claim: String,
    groups_claim: String,
}

impl Default for ClaimMapping {
    fn default() -> Self {
        Self::new(DEFAULT_SUBJECT_CLAIM, DEFAULT_GROUPS_CLAIM)
    }
}

impl ClaimMapping {
    pub fn new(subject_claim: impl Into<String>, groups_claim: impl Into<String>) -> Self {
        Self {
            subject_claim: subject_claim.into(),
            groups_claim: groups_claim.into(),
        }
    }

    /// Normalizes `claims` into a record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthenticated`] when the subject claim is missing or
    /// not a non-empty string.
    pub fn map(&self, claims: &ClaimSet) -> Result<UserInfoRecord> {
        let subject = claims.get_str(&self.subject_claim).ok_or_else(|| {
            Error::unauthenticated(format!(
                "principal has no `{}` claim",
                self.subject_claim
            ))
        })?;

        let given_name = claims.get_str("given_name");
        let family_name = claims.get_str("family_name");
        let name = claims.get_str("name").map(str::to_owned).or_else(|| {
            match (given_name, family_name) {
                (Some(given), Some(family)) => Some(format!("{given} {family}")),
                (Some(only), None) | (None, Some(only)) => Some(only.to_owned()),
                (None, None) => None,
            }
        });

        let record = UserInfoRecord::new(subject)?
            .with_name(name)
            .with_preferred_username(owned(claims.get_str("preferred_username")))
            .with_given_name(owned(given_name))
            .with_family_name(owned(family_name))
            .with_email(owned(claims.get_str("email")))
            .with_picture(owned(claims.get_str("picture")))
            .with_groups(groups(claims.get(&self.groups_claim)));

        Ok(record)
    }
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_owned)
}

fn groups(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
        Some(Value::String(joined)) => joined
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}
