//! # Identity Types
//!
//! Shared data model for identity resolution.
//!
//! - [`IdentityContext`] - What the transport/auth layer knows about the
//!   caller of a single call. Created per call, borrowed by the resolver,
//!   dropped when the call completes.
//! - [`ClaimSet`] - A JSON object of claims asserted about a principal.
//! - [`UserInfoRecord`] - The normalized, immutable result of a successful
//!   resolution. Its subject is never empty.
//!
//! Conversions to and from the generated [`UserInfoResponse`] live here so the
//! server and clients agree on the mapping.

use crate::{
    error::{Error, Result},
    proto::UserInfoResponse,
};
use core::fmt;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Authentication context of one inbound call.
#[derive(Clone, Default, PartialEq)]
pub enum IdentityContext {
    /// No credential was presented.
    #[default]
    Anonymous,
    /// Raw bearer credential, to be introspected by an identity provider.
    Bearer(String),
    /// Claims already validated by the transport/auth layer.
    Claims(ClaimSet),
}

impl IdentityContext {
    /// Returns the raw bearer credential, if any.
    pub fn credential(&self) -> Option<&str> {
        match self {
            Self::Bearer(token) => Some(token),
            _ => None,
        }
    }
}

// Credentials must never end up in logs.
impl fmt::Debug for IdentityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"<redacted>").finish(),
            Self::Claims(claims) => f.debug_tuple("Claims").field(claims).finish(),
        }
    }
}

/// A set of claims about a principal, as found in a token payload or a
/// userinfo document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet(Map<String, Value>);

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a claim set from a JSON value. Returns `None` unless the value
    /// is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns the claim as a string, treating empty strings as absent.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

/// Normalized user info of an authenticated principal.
///
/// Built once with [`UserInfoRecord::new`] and the `with_*` methods, then only
/// read. Groups behave as a set: duplicates are dropped and the first
/// occurrence decides the position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfoRecord {
    subject: String,
    name: Option<String>,
    preferred_username: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    email: Option<String>,
    picture: Option<String>,
    groups: Vec<String>,
}

impl UserInfoRecord {
    /// Creates a record for `subject`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthenticated`] if the subject is empty: a record
    /// without a principal identifier cannot exist.
    pub fn new(subject: impl Into<String>) -> Result<Self> {
        let subject = subject.into();
        if subject.is_empty() {
            return Err(Error::unauthenticated("principal has no subject"));
        }
        Ok(Self {
            subject,
            name: None,
            preferred_username: None,
            given_name: None,
            family_name: None,
            email: None,
            picture: None,
            groups: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = non_empty(name);
        self
    }

    #[must_use]
    pub fn with_preferred_username(mut self, preferred_username: Option<String>) -> Self {
        self.preferred_username = non_empty(preferred_username);
        self
    }

    #[must_use]
    pub fn with_given_name(mut self, given_name: Option<String>) -> Self {
        self.given_name = non_empty(given_name);
        self
    }

    #[must_use]
    pub fn with_family_name(mut self, family_name: Option<String>) -> Self {
        self.family_name = non_empty(family_name);
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = non_empty(email);
        self
    }

    #[must_use]
    pub fn with_picture(mut self, picture: Option<String>) -> Self {
        self.picture = non_empty(picture);
        self
    }

    #[must_use]
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.clear();
        for group in groups {
            let group = group.into();
            if !group.is_empty() && !self.groups.contains(&group) {
                self.groups.push(group);
            }
        }
        self
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn preferred_username(&self) -> Option<&str> {
        self.preferred_username.as_deref()
    }

    pub fn given_name(&self) -> Option<&str> {
        self.given_name.as_deref()
    }

    pub fn family_name(&self) -> Option<&str> {
        self.family_name.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn picture(&self) -> Option<&str> {
        self.picture.as_deref()
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

impl From<UserInfoRecord> for UserInfoResponse {
    fn from(record: UserInfoRecord) -> Self {
        Self {
            subject: record.subject,
            name: record.name,
            preferred_username: record.preferred_username,
            given_name: record.given_name,
            family_name: record.family_name,
            email: record.email,
            picture: record.picture,
            groups: record.groups,
        }
    }
}

impl TryFrom<UserInfoResponse> for UserInfoRecord {
    type Error = Error;

    fn try_from(resp: UserInfoResponse) -> Result<Self> {
        Ok(Self::new(resp.subject)?
            .with_name(resp.name)
            .with_preferred_username(resp.preferred_username)
            .with_given_name(resp.given_name)
            .with_family_name(resp.family_name)
            .with_email(resp.email)
            .with_picture(resp.picture)
            .with_groups(resp.groups))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_requires_subject() {
        assert!(matches!(
            UserInfoRecord::new(""),
            Err(Error::Unauthenticated { .. })
        ));
        assert_eq!(
            UserInfoRecord::new("alice@example.com").unwrap().subject(),
            "alice@example.com"
        );
    }

    #[test]
    fn groups_behave_as_a_set() {
        let record = UserInfoRecord::new("alice")
            .unwrap()
            .with_groups(["eng", "admin", "eng", "", "ops", "admin"]);
        assert_eq!(record.groups(), ["eng", "admin", "ops"]);
    }

    #[test]
    fn empty_optional_fields_are_absent() {
        let record = UserInfoRecord::new("alice")
            .unwrap()
            .with_name(Some(String::new()))
            .with_email(Some("alice@example.com".to_string()));
        assert_eq!(record.name(), None);
        assert_eq!(record.email(), Some("alice@example.com"));
    }

    #[test]
    fn response_carries_every_field() {
        let record = UserInfoRecord::new("alice@example.com")
            .unwrap()
            .with_name(Some("Alice Liddell".to_string()))
            .with_preferred_username(Some("alice".to_string()))
            .with_picture(Some("https://example.com/alice.png".to_string()))
            .with_groups(["eng", "admin"]);

        let resp = UserInfoResponse::from(record.clone());
        assert_eq!(resp.subject, "alice@example.com");
        assert_eq!(resp.name.as_deref(), Some("Alice Liddell"));
        assert_eq!(resp.email, None);
        assert_eq!(resp.groups, vec!["eng", "admin"]);

        assert_eq!(UserInfoRecord::try_from(resp).unwrap(), record);
    }

    #[test]
    fn response_without_subject_is_rejected() {
        let resp = UserInfoResponse {
            name: Some("Nobody".to_string()),
            ..Default::default()
        };
        assert!(UserInfoRecord::try_from(resp).is_err());
    }

    #[test]
    fn debug_output_redacts_bearer_tokens() {
        let ctx = IdentityContext::Bearer("secret-token".to_string());
        let out = format!("{ctx:?}");
        assert!(!out.contains("secret-token"));
        assert_eq!(ctx.credential(), Some("secret-token"));
    }

    #[test]
    fn claim_set_only_accepts_objects() {
        assert!(ClaimSet::from_value(json!(["sub"])).is_none());
        let claims = ClaimSet::from_value(json!({ "sub": "alice", "email": "" })).unwrap();
        assert_eq!(claims.get_str("sub"), Some("alice"));
        assert_eq!(claims.get_str("email"), None);
        assert_eq!(claims.get("email"), Some(&json!("")));
    }
}
