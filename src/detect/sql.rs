//! Schema-qualified SQL rendering
//!
//! Detection templates name their tables as `{schema}.TABLE`. The schema
//! cannot be a bind parameter, so it is spliced into the text, and only
//! after passing an allow-list check.

use crate::error::{DbError, DbResult};

/// Placeholder replaced by the quoted schema name
pub const SCHEMA_PLACEHOLDER: &str = "{schema}";

/// PostgreSQL truncates identifiers beyond this many bytes
const MAX_IDENTIFIER_LEN: usize = 63;

/// Accept `[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes.
///
/// # Errors
/// Returns `DbError::InvalidIdentifier` for anything else
pub fn validate_identifier(name: &str) -> DbResult<&str> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid_start && valid_rest && name.len() <= MAX_IDENTIFIER_LEN {
        Ok(name)
    } else {
        Err(DbError::InvalidIdentifier(name.to_string()))
    }
}

/// Double-quote a validated identifier
pub fn quote_identifier(name: &str) -> DbResult<String> {
    validate_identifier(name).map(|n| format!("\"{}\"", n))
}

/// Substitute every `{schema}` in `template` with the quoted schema name
pub fn render(template: &str, schema: &str) -> DbResult<String> {
    let quoted = quote_identifier(schema)?;
    Ok(template.replace(SCHEMA_PLACEHOLDER, &quoted))
}
