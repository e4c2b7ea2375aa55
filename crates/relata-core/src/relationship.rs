//! Relationship descriptors.
//!
//! A relationship is declared once per table type and stored on its
//! [`crate::TableInfo`]. The descriptor is pure metadata: the lazy-loading
//! handle that consumes it lives in the session layer, which owns the
//! identity map the loaded rows are deduplicated through.

/// Lazy loading strategy for a relationship.
///
/// Controls how and when the related row is fetched. Only `Select`,
/// `NoLoad`, and `Raise` change this core's own behavior; the eager
/// strategies (`Joined`, `Subquery`, `SelectIn`) are declaration-time tags
/// consumed by an external batching layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadStrategy {
    /// Load on first access via a separate SELECT (default).
    #[default]
    Select,
    /// Eager load via JOIN in the parent query.
    Joined,
    /// Eager load via a correlated subquery.
    Subquery,
    /// Eager load via a separate SELECT using an IN clause.
    SelectIn,
    /// Never load - always resolves to no related row, without querying.
    NoLoad,
    /// Forbid lazy access - loading raises an error naming the relationship.
    Raise,
}

impl LoadStrategy {
    /// Get the declaration-surface name of this strategy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LoadStrategy::Select => "select",
            LoadStrategy::Joined => "joined",
            LoadStrategy::Subquery => "subquery",
            LoadStrategy::SelectIn => "selectin",
            LoadStrategy::NoLoad => "noload",
            LoadStrategy::Raise => "raise",
        }
    }

    /// Parse a strategy from its declaration-surface name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "select" => Some(LoadStrategy::Select),
            "joined" => Some(LoadStrategy::Joined),
            "subquery" => Some(LoadStrategy::Subquery),
            "selectin" => Some(LoadStrategy::SelectIn),
            "noload" => Some(LoadStrategy::NoLoad),
            "raise" => Some(LoadStrategy::Raise),
            _ => None,
        }
    }
}

/// Metadata about a foreign-key association between two tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relationship {
    /// Name of the relationship field.
    pub name: &'static str,

    /// The related table's name.
    pub target_table: &'static str,

    /// Foreign key column on the owning table.
    pub foreign_key_column: &'static str,

    /// Loading strategy for this relationship.
    pub lazy: LoadStrategy,

    /// The field on the related type that points back, if bidirectional.
    pub back_populates: Option<&'static str>,

    /// One-to-many (true) vs. many-to-one (false, the default).
    pub uselist: bool,
}

impl Relationship {
    /// Set the loading strategy.
    #[must_use]
    pub const fn lazy(mut self, strategy: LoadStrategy) -> Self {
        self.lazy = strategy;
        self
    }

    /// Set the back-populates field name (bidirectional relationships).
    #[must_use]
    pub const fn back_populates(mut self, field: &'static str) -> Self {
        self.back_populates = Some(field);
        self
    }

    /// Force list semantics (one-to-many).
    #[must_use]
    pub const fn uselist(mut self, value: bool) -> Self {
        self.uselist = value;
        self
    }
}

/// Declare a relationship.
///
/// # Example
///
/// ```
/// use relata_core::{relationship, LoadStrategy};
///
/// let rel = relationship("team", "teams", "team_id")
///     .lazy(LoadStrategy::SelectIn)
///     .back_populates("heroes");
/// assert_eq!(rel.target_table, "teams");
/// assert!(!rel.uselist);
/// ```
#[must_use]
pub const fn relationship(
    name: &'static str,
    target_table: &'static str,
    foreign_key_column: &'static str,
) -> Relationship {
    Relationship {
        name,
        target_table,
        foreign_key_column,
        lazy: LoadStrategy::Select,
        back_populates: None,
        uselist: false,
    }
}
