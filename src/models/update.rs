//! Update descriptors for `update_user`.
//!
//! Updates are a closed set of tagged operations rather than free-form
//! documents: the allow-list of mutable fields is encoded in the type system
//! and validated at construction, so a column or operator injection can never
//! reach a backend. Callers holding loosely-typed input (e.g. a webhook
//! payload) go through [`UserUpdate::set_from_json`], which silently drops
//! anything outside the allow-list.

use crate::models::entities::{Subscription, Usage};
use serde_json::Value as JsonValue;

/// Numeric fields eligible for atomic increments.
///
/// This is the complete allow-list; extending it means adding a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterField {
    UsageCount,
}

impl CounterField {
    /// Parse a logical dotted name. Returns `None` for anything not
    /// allow-listed.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "usage.count" => Some(Self::UsageCount),
            _ => None,
        }
    }

    /// Logical dotted name (the document-store path).
    pub fn logical(&self) -> &'static str {
        match self {
            Self::UsageCount => "usage.count",
        }
    }

    /// Physical column on flattening backends.
    pub fn column(&self) -> &'static str {
        match self {
            Self::UsageCount => "usage_count",
        }
    }
}

/// A single allow-listed field assignment. Nested groups are set or cleared
/// as a whole; flattening backends turn each group into one atomic
/// multi-column assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Name(String),
    Subscription(Option<Subscription>),
    Usage(Option<Usage>),
}

/// A tagged update operation.
#[derive(Debug, Clone, PartialEq)]
pub enum UserUpdate {
    /// Atomically add `amount` to one allow-listed numeric field, treating an
    /// absent prior value as zero.
    Increment { field: CounterField, amount: i64 },
    /// Replace one or more allow-listed fields. An empty set is valid and
    /// yields a zero-modified-count result.
    SetFields(Vec<FieldUpdate>),
}

impl UserUpdate {
    /// Increment a counter by logical dotted name.
    ///
    /// Fails when the name is not in the numeric allow-list.
    pub fn increment(field: &str, amount: i64) -> Result<Self, crate::error::StoreError> {
        CounterField::parse(field)
            .map(|field| Self::Increment { field, amount })
            .ok_or_else(|| {
                crate::error::StoreError::unsupported_operation(format!(
                    "increment of non-counter field '{field}'"
                ))
            })
    }

    /// Build a `SetFields` update from a JSON object, dropping any key that
    /// is not allow-listed and any value that does not deserialize to the
    /// field's shape. A `null` for a nested group clears the whole group.
    pub fn set_from_json(fields: &serde_json::Map<String, JsonValue>) -> Self {
        let mut updates = Vec::new();
        for (key, value) in fields {
            match key.as_str() {
                "name" => {
                    if let JsonValue::String(name) = value {
                        updates.push(FieldUpdate::Name(name.clone()));
                    }
                }
                "subscription" => match value {
                    JsonValue::Null => updates.push(FieldUpdate::Subscription(None)),
                    other => {
                        if let Ok(sub) = serde_json::from_value::<Subscription>(other.clone()) {
                            updates.push(FieldUpdate::Subscription(Some(sub)));
                        }
                    }
                },
                "usage" => match value {
                    JsonValue::Null => updates.push(FieldUpdate::Usage(None)),
                    other => {
                        if let Ok(usage) = serde_json::from_value::<Usage>(other.clone()) {
                            updates.push(FieldUpdate::Usage(Some(usage)));
                        }
                    }
                },
                // Not allow-listed: dropped without error.
                _ => {}
            }
        }
        Self::SetFields(updates)
    }

    /// True when applying this update cannot modify anything.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::SetFields(fields) if fields.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counter_field_allow_list() {
        assert_eq!(CounterField::parse("usage.count"), Some(CounterField::UsageCount));
        assert_eq!(CounterField::parse("usage.reset_at"), None);
        assert_eq!(CounterField::parse("subscription.status"), None);
        assert_eq!(CounterField::parse("password"), None);
    }

    #[test]
    fn test_counter_field_mapping() {
        let field = CounterField::UsageCount;
        assert_eq!(field.logical(), "usage.count");
        assert_eq!(field.column(), "usage_count");
    }

    #[test]
    fn test_increment_rejects_non_counter() {
        assert!(UserUpdate::increment("usage.count", 3).is_ok());
        assert!(UserUpdate::increment("email", 1).is_err());
    }

    #[test]
    fn test_set_from_json_drops_unknown_keys() {
        let map = json!({
            "name": "Bob",
            "email": "evil@example.com",
            "is_admin": true,
            "usage_count; DROP TABLE users": 1
        });
        let JsonValue::Object(map) = map else { unreachable!() };
        let update = UserUpdate::set_from_json(&map);
        let UserUpdate::SetFields(fields) = update else {
            panic!("expected SetFields")
        };
        assert_eq!(fields, vec![FieldUpdate::Name("Bob".into())]);
    }

    #[test]
    fn test_set_from_json_all_unknown_is_empty() {
        let map = json!({ "role": "admin", "email": "x@y.z" });
        let JsonValue::Object(map) = map else { unreachable!() };
        let update = UserUpdate::set_from_json(&map);
        assert!(update.is_empty());
    }

    #[test]
    fn test_set_from_json_nested_groups() {
        let map = json!({
            "subscription": { "stripe_id": "sub_123", "status": "active" },
            "usage": null
        });
        let JsonValue::Object(map) = map else { unreachable!() };
        let UserUpdate::SetFields(fields) = UserUpdate::set_from_json(&map) else {
            panic!("expected SetFields")
        };
        assert!(fields.contains(&FieldUpdate::Usage(None)));
        assert!(fields.iter().any(|f| matches!(
            f,
            FieldUpdate::Subscription(Some(s)) if s.stripe_id == "sub_123"
        )));
    }
}
