//! Placeholder renumbering for raw SQL fragments.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\d+)").expect("placeholder regex is valid"));

/// Shift every `$n` placeholder in a raw fragment by `offset`.
///
/// Raw subquery and CTE SQL is written with placeholders numbered from `$1`;
/// when spliced into an outer statement that already bound parameters, its
/// numbering has to continue where the outer statement left off.
///
/// ```
/// use relata_query::shift_placeholders;
///
/// assert_eq!(
///     shift_placeholders("SELECT id FROM orders WHERE total > $1 AND region = $2", 3),
///     "SELECT id FROM orders WHERE total > $4 AND region = $5"
/// );
/// ```
#[must_use]
pub fn shift_placeholders(sql: &str, offset: usize) -> String {
    if offset == 0 {
        return sql.to_string();
    }
    PLACEHOLDER
        .replace_all(sql, |caps: &Captures<'_>| {
            let n: usize = caps[1].parse().unwrap_or(0);
            format!("${}", n + offset)
        })
        .into_owned()
}
