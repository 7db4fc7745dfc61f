use crate::error::StoreError;

/// Quote a SQL identifier (table, column, or index name) with double quotes.
///
/// Collection and index names may contain arbitrary characters — `-`, `%`,
/// `.`, even a leading digit — so every identifier is always quoted rather
/// than validated against an allowlist. A literal `"` cannot be escaped
/// inside a quoted identifier without risking ambiguity with the rest of the
/// generated SQL, so it is rejected outright.
pub fn quote_identifier(name: &str) -> Result<String, StoreError> {
    if name.contains('"') {
        return Err(StoreError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_plain_name() {
        assert_eq!(quote_identifier("people").unwrap(), "\"people\"");
    }

    #[test]
    fn quotes_hostile_name() {
        assert_eq!(quote_identifier("my-coll.v2").unwrap(), "\"my-coll.v2\"");
    }

    #[test]
    fn rejects_embedded_quote() {
        assert!(quote_identifier("evil\"; DROP TABLE x; --").is_err());
    }
}
