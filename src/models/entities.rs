//! User and Auth entities.
//!
//! These are the two logical entities served by every backend. Password
//! hashing, id generation and timestamps are external collaborators'
//! responsibilities; this layer stores their outputs verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// External-billing subscription details, optional as a whole group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Stripe-style external billing identifier.
    pub stripe_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Metered-usage counters, optional as a whole group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

/// A user record. `subscription` and `usage` are absent until explicitly set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl User {
    /// Create a user with no subscription or usage groups.
    pub fn new(
        id: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: name.into(),
            created_at,
            subscription: None,
            usage: None,
        }
    }
}

/// An authentication credential, keyed by email.
///
/// `password` is an opaque pre-hashed value; `user_id` references an existing
/// [`User::id`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auth {
    pub email: String,
    pub password: String,
    pub user_id: String,
}

/// Lookup key for `find_user`: exactly one of id/email is expected.
///
/// When neither is set, providers return "not found" without issuing a query;
/// when both are set, id wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserLookup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Resolved lookup key.
#[derive(Debug, Clone, PartialEq)]
pub enum UserKey<'a> {
    Id(&'a str),
    Email(&'a str),
}

impl UserLookup {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            email: None,
        }
    }

    pub fn by_email(email: impl Into<String>) -> Self {
        Self {
            id: None,
            email: Some(email.into()),
        }
    }

    /// Resolve to a key, or `None` when neither field is set.
    pub fn key(&self) -> Option<UserKey<'_>> {
        if let Some(id) = self.id.as_deref() {
            Some(UserKey::Id(id))
        } else {
            self.email.as_deref().map(UserKey::Email)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_prefers_id() {
        let lookup = UserLookup {
            id: Some("u1".into()),
            email: Some("a@b.c".into()),
        };
        assert_eq!(lookup.key(), Some(UserKey::Id("u1")));
    }

    #[test]
    fn test_lookup_empty_yields_no_key() {
        assert!(UserLookup::default().key().is_none());
    }

    #[test]
    fn test_user_serializes_without_absent_groups() {
        let user = User::new("u1", "a@b.c", "Alice", Utc::now());
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("subscription").is_none());
        assert!(json.get("usage").is_none());
    }
}
