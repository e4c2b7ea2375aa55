//! SQL identifier quoting and sanitization utilities.

/// Quote a SQL identifier using ANSI double-quoting.
///
/// Embedded double-quotes are escaped by doubling them (`"` -> `""`), so the
/// result is safe against injection for any input string.
///
/// # Examples
///
/// ```
/// use relata_core::quote_ident;
///
/// assert_eq!(quote_ident("users"), "\"users\"");
/// assert_eq!(quote_ident("user\"name"), "\"user\"\"name\"");
/// assert_eq!(quote_ident("select"), "\"select\""); // SQL keyword
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Sanitize a SQL identifier by removing everything but ASCII alphanumerics
/// and underscores.
///
/// Used for identifiers spliced into positions where quoting is not
/// possible. Characters are stripped rather than rejected; an input of only
/// invalid characters yields an empty string.
///
/// # Examples
///
/// ```
/// use relata_core::sanitize_ident;
///
/// assert_eq!(sanitize_ident("user_name"), "user_name");
/// assert_eq!(sanitize_ident("user;DROP TABLE--"), "userDROPTABLE");
/// ```
#[inline]
pub fn sanitize_ident(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}
