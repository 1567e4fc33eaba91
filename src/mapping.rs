//! Logical-field to physical-column mapping for flattening backends.
//!
//! MongoDB stores the `subscription` and `usage` groups as nested documents;
//! the relational and embedded backends flatten them into prefixed columns.
//! This module is the single source of truth for that mapping so both
//! flattening backends agree on the physical schema.
//!
//! Identifiers are lowercase snake_case on both relational dialects. SQLite is
//! case-insensitive anyway; PostgreSQL folds unquoted identifiers to
//! lowercase, and the DDL never quotes them, so the stored and queried casing
//! match by construction.

/// Fixed mapping table: (logical dotted name, physical column).
const USER_FIELD_MAP: &[(&str, &str)] = &[
    ("id", "id"),
    ("email", "email"),
    ("name", "name"),
    ("created_at", "created_at"),
    ("subscription.stripe_id", "subscription_stripe_id"),
    ("subscription.expires_at", "subscription_expires_at"),
    ("subscription.status", "subscription_status"),
    ("usage.count", "usage_count"),
    ("usage.reset_at", "usage_reset_at"),
];

/// Columns making up the flattened `subscription` group, in schema order.
pub const SUBSCRIPTION_COLUMNS: &[&str] = &[
    "subscription_stripe_id",
    "subscription_expires_at",
    "subscription_status",
];

/// Columns making up the flattened `usage` group, in schema order.
pub const USAGE_COLUMNS: &[&str] = &["usage_count", "usage_reset_at"];

/// Map a logical dotted field name to its physical column.
///
/// Returns `None` for anything outside the fixed table; callers treat that as
/// "not an allow-listed field".
pub fn column_for(logical: &str) -> Option<&'static str> {
    USER_FIELD_MAP
        .iter()
        .find(|(l, _)| *l == logical)
        .map(|(_, c)| *c)
}

/// Map a physical column back to its logical dotted field name.
pub fn logical_for(column: &str) -> Option<&'static str> {
    USER_FIELD_MAP
        .iter()
        .find(|(_, c)| *c == column)
        .map(|(l, _)| *l)
}

/// All physical user columns in schema order.
pub fn user_columns() -> impl Iterator<Item = &'static str> {
    USER_FIELD_MAP.iter().map(|(_, c)| *c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_fields_map_to_themselves() {
        assert_eq!(column_for("id"), Some("id"));
        assert_eq!(column_for("email"), Some("email"));
        assert_eq!(column_for("name"), Some("name"));
        assert_eq!(column_for("created_at"), Some("created_at"));
    }

    #[test]
    fn test_nested_fields_flatten_with_prefix() {
        assert_eq!(
            column_for("subscription.stripe_id"),
            Some("subscription_stripe_id")
        );
        assert_eq!(column_for("usage.count"), Some("usage_count"));
        assert_eq!(column_for("usage.reset_at"), Some("usage_reset_at"));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert_eq!(column_for("password"), None);
        assert_eq!(column_for("usage.limit"), None);
        assert_eq!(column_for("subscription"), None);
        assert_eq!(logical_for("not_a_column"), None);
    }

    #[test]
    fn test_mapping_is_bidirectional() {
        for column in user_columns() {
            let logical = logical_for(column).expect("every column has a logical name");
            assert_eq!(column_for(logical), Some(column));
        }
    }

    #[test]
    fn test_group_columns_covered_by_map() {
        for column in SUBSCRIPTION_COLUMNS.iter().chain(USAGE_COLUMNS) {
            assert!(logical_for(column).is_some(), "unmapped column {column}");
        }
    }
}
