//! UUID utilities

use crate::{Error, Result};
use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse a UUID stored as TEXT in the database
pub fn parse_column(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid UUID in column {}: {} ({})", column, value, e)))
}

/// Parse an optional UUID column
pub fn parse_optional_column(column: &str, value: Option<String>) -> Result<Option<Uuid>> {
    value.map(|v| parse_column(column, &v)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_column_valid() {
        let id = generate();
        assert_eq!(parse_column("id", &id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_parse_column_invalid_names_column() {
        let err = parse_column("id_grado", "not-a-uuid").unwrap_err();
        assert!(err.to_string().contains("id_grado"));
    }

    #[test]
    fn test_parse_optional_column_none() {
        assert_eq!(parse_optional_column("id", None).unwrap(), None);
    }
}
