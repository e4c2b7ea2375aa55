//! Column metadata: the storage contract a declared field carries.

use crate::value::Value;

/// Referential action for foreign key constraints (ON DELETE / ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferentialAction {
    /// No action - raise error if any references exist.
    #[default]
    NoAction,
    /// Restrict - same as NO ACTION (alias for compatibility).
    Restrict,
    /// Cascade - automatically delete/update referencing rows.
    Cascade,
    /// Set null - set referencing columns to NULL.
    SetNull,
    /// Set default - set referencing columns to their default values.
    SetDefault,
}

impl ReferentialAction {
    /// Get the SQL representation of this action.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }

    /// Parse a referential action from a string (case-insensitive).
    ///
    /// Returns `None` if the string is not a recognized action.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NO ACTION" | "NOACTION" | "NO_ACTION" => Some(ReferentialAction::NoAction),
            "RESTRICT" => Some(ReferentialAction::Restrict),
            "CASCADE" => Some(ReferentialAction::Cascade),
            "SET NULL" | "SETNULL" | "SET_NULL" => Some(ReferentialAction::SetNull),
            "SET DEFAULT" | "SETDEFAULT" | "SET_DEFAULT" => Some(ReferentialAction::SetDefault),
            _ => None,
        }
    }
}

/// Per-field storage metadata.
///
/// A `Column` records everything the schema layer needs to know about a
/// declared field: default handling, nullability, constraints, and foreign
/// key behavior. Columns are registered on a [`crate::TableInfo`] in
/// declaration order.
#[derive(Debug, Clone)]
pub struct Column {
    /// Static default value, bound when the column is omitted on insert.
    pub default: Option<Value>,
    /// Default produced per-row at insert time. Mutually exclusive with
    /// `default`.
    pub default_factory: Option<fn() -> Value>,
    /// Whether NULL is an accepted stored value. Defaults to true.
    pub nullable: bool,
    /// Whether the column carries a UNIQUE constraint.
    pub unique: bool,
    /// Whether the column is indexed.
    pub index: bool,
    /// Whether the column is the primary key.
    pub primary_key: bool,
    /// Foreign key reference: `"table.column"` or `"table"`.
    pub foreign_key: Option<&'static str>,
    /// Referential action for ON DELETE (only meaningful with `foreign_key`).
    pub on_delete: Option<ReferentialAction>,
    /// Referential action for ON UPDATE (only meaningful with `foreign_key`).
    pub on_update: Option<ReferentialAction>,
    /// Human-readable description.
    pub description: Option<&'static str>,
}

impl Column {
    /// Create a column with the default contract: nullable, no constraints.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            default: None,
            default_factory: None,
            nullable: true,
            unique: false,
            index: false,
            primary_key: false,
            foreign_key: None,
            on_delete: None,
            on_update: None,
            description: None,
        }
    }

    /// Set the static default value.
    ///
    /// # Panics
    ///
    /// Panics if a `default_factory` was already set; the two are mutually
    /// exclusive.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        assert!(
            self.default_factory.is_none(),
            "column declares both `default` and `default_factory`"
        );
        self.default = Some(value.into());
        self
    }

    /// Set a per-row default factory.
    ///
    /// # Panics
    ///
    /// Panics if a static `default` was already set; the two are mutually
    /// exclusive.
    #[must_use]
    pub fn default_factory(mut self, f: fn() -> Value) -> Self {
        assert!(
            self.default.is_none(),
            "column declares both `default` and `default_factory`"
        );
        self.default_factory = Some(f);
        self
    }

    /// Set nullable flag.
    #[must_use]
    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Set unique flag.
    #[must_use]
    pub const fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    /// Set index flag.
    #[must_use]
    pub const fn index(mut self, value: bool) -> Self {
        self.index = value;
        self
    }

    /// Set primary key flag. Primary key columns are implicitly NOT NULL.
    #[must_use]
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        if value {
            self.nullable = false;
        }
        self
    }

    /// Set foreign key reference (`"table.column"` or `"table"`).
    #[must_use]
    pub const fn foreign_key(mut self, reference: &'static str) -> Self {
        self.foreign_key = Some(reference);
        self
    }

    /// Set ON DELETE action for the foreign key.
    #[must_use]
    pub const fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Set ON UPDATE action for the foreign key.
    #[must_use]
    pub const fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }

    /// Set the description.
    #[must_use]
    pub const fn description(mut self, text: &'static str) -> Self {
        self.description = Some(text);
        self
    }

    /// Table half of the foreign key reference, if any.
    #[must_use]
    pub fn foreign_key_table(&self) -> Option<&'static str> {
        self.foreign_key
            .map(|fk| fk.split_once('.').map_or(fk, |(table, _)| table))
    }

    /// Column half of the foreign key reference. The bare-table form
    /// references the target's `id` column.
    #[must_use]
    pub fn foreign_key_column(&self) -> Option<&'static str> {
        self.foreign_key
            .map(|fk| fk.split_once('.').map_or("id", |(_, column)| column))
    }

    /// Resolve the effective default: the static value first, otherwise the
    /// factory's output.
    #[must_use]
    pub fn effective_default(&self) -> Option<Value> {
        if let Some(v) = &self.default {
            return Some(v.clone());
        }
        self.default_factory.map(|f| f())
    }
}

impl Default for Column {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let col = Column::new();
        assert!(col.nullable);
        assert!(!col.unique);
        assert!(!col.index);
        assert!(!col.primary_key);
        assert!(col.default.is_none());
        assert!(col.foreign_key.is_none());
    }

    #[test]
    fn test_primary_key_implies_not_null() {
        let col = Column::new().primary_key(true);
        assert!(!col.nullable);
    }

    #[test]
    fn test_static_default() {
        let col = Column::new().default_value("pending");
        assert_eq!(col.effective_default(), Some(Value::Text("pending".into())));
    }

    #[test]
    fn test_default_factory() {
        fn make_zero() -> Value {
            Value::Int(0)
        }
        let col = Column::new().default_factory(make_zero);
        assert_eq!(col.effective_default(), Some(Value::Int(0)));
    }

    #[test]
    #[should_panic(expected = "both `default` and `default_factory`")]
    fn test_default_and_factory_are_exclusive() {
        fn make_zero() -> Value {
            Value::Int(0)
        }
        let _ = Column::new().default_value(1i64).default_factory(make_zero);
    }

    #[test]
    fn test_foreign_key_qualified() {
        let col = Column::new().foreign_key("teams.id");
        assert_eq!(col.foreign_key_table(), Some("teams"));
        assert_eq!(col.foreign_key_column(), Some("id"));
    }

    #[test]
    fn test_foreign_key_bare_table_defaults_to_id() {
        let col = Column::new().foreign_key("teams");
        assert_eq!(col.foreign_key_table(), Some("teams"));
        assert_eq!(col.foreign_key_column(), Some("id"));
    }

    #[test]
    fn test_on_delete_and_on_update_independent() {
        let col = Column::new()
            .foreign_key("teams.id")
            .on_delete(ReferentialAction::Cascade)
            .on_update(ReferentialAction::SetNull);
        assert_eq!(col.on_delete, Some(ReferentialAction::Cascade));
        assert_eq!(col.on_update, Some(ReferentialAction::SetNull));
    }

    #[test]
    fn test_referential_action_sql() {
        assert_eq!(ReferentialAction::Cascade.as_sql(), "CASCADE");
        assert_eq!(ReferentialAction::SetNull.as_sql(), "SET NULL");
        assert_eq!(ReferentialAction::SetDefault.as_sql(), "SET DEFAULT");
        assert_eq!(ReferentialAction::NoAction.as_sql(), "NO ACTION");
        assert_eq!(ReferentialAction::Restrict.as_sql(), "RESTRICT");
    }

    #[test]
    fn test_referential_action_parse() {
        assert_eq!(
            ReferentialAction::parse("cascade"),
            Some(ReferentialAction::Cascade)
        );
        assert_eq!(
            ReferentialAction::parse("SET NULL"),
            Some(ReferentialAction::SetNull)
        );
        assert_eq!(
            ReferentialAction::parse("set_default"),
            Some(ReferentialAction::SetDefault)
        );
        assert_eq!(ReferentialAction::parse("bogus"), None);
    }
}
