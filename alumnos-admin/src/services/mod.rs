//! Entity services
//!
//! Free functions over a `SqlitePool`, one module per table group. Reads
//! return `Option` for a missing id; writes that touch more than one table
//! run inside a single transaction.

pub mod alumnos;
pub mod familiares;
pub mod grados;
pub mod report;
pub mod stats;

use alumnos_common::Error;
use serde::Deserialize;
use tracing::{error, warn};

/// Sort direction for list queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Log a backend failure with its operation name and pass it on
///
/// Constraint violations are the caller's mistake and log at `warn`.
pub(crate) fn backend_error(operation: &'static str) -> impl Fn(sqlx::Error) -> Error {
    move |e| {
        let err = Error::Database(e);
        if err.is_foreign_key_violation() || err.is_unique_violation() {
            warn!("{} rejected: {}", operation, err);
        } else {
            error!("{} failed: {}", operation, err);
        }
        err
    }
}

/// Qualify a comma-separated column list with a table alias
pub(crate) fn qualified(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Escape clause to append after every `LIKE` bound with [`like_pattern`]
pub(crate) const LIKE_ESCAPE: &str = " ESCAPE '\\'";

/// `%term%` pattern for LIKE searches, or `None` for a blank term
///
/// `%`, `_` and `\` in the term match literally.
pub(crate) fn like_pattern(term: Option<&str>) -> Option<String> {
    term.map(str::trim).filter(|t| !t.is_empty()).map(|t| {
        let mut pattern = String::with_capacity(t.len() + 2);
        pattern.push('%');
        for c in t.chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        pattern
    })
}

/// Trimmed text, `None` when blank
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn require_name(field: &str, value: &str) -> alumnos_common::Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

pub(crate) fn require_amount(field: &str, value: f64) -> alumnos_common::Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::InvalidInput(format!(
            "{} must be a non-negative number",
            field
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_columns() {
        assert_eq!(qualified("id, nombre,created_at", "g"), "g.id, g.nombre, g.created_at");
    }

    #[test]
    fn test_like_pattern_blank() {
        assert_eq!(like_pattern(Some("  ")), None);
        assert_eq!(like_pattern(Some(" Ju ")), Some("%Ju%".to_string()));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(Some("50%")), Some(r"%50\%%".to_string()));
        assert_eq!(like_pattern(Some("a_b")), Some(r"%a\_b%".to_string()));
        assert_eq!(like_pattern(Some(r"c:\x")), Some(r"%c:\\x%".to_string()));
    }

    #[test]
    fn test_require_amount() {
        assert!(require_amount("monto", -1.0).is_err());
        assert!(require_amount("monto", f64::NAN).is_err());
        assert_eq!(require_amount("monto", 0.0).unwrap(), 0.0);
    }
}
