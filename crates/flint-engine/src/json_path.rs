use crate::error::EngineError;

/// Convert a dot-path like `addr.city` into a SQLite JSON path like `$.addr.city`.
///
/// Dot-paths are the only path syntax the rest of the crate understands;
/// an empty path or one with an empty segment (`a..b`) cannot be expressed
/// as a JSON path and is rejected here rather than downstream as bad SQL.
pub fn to_json_path(dot_path: &str) -> Result<String, EngineError> {
    if dot_path.is_empty() || dot_path.split('.').any(str::is_empty) {
        return Err(EngineError::InvalidPath(dot_path.to_string()));
    }
    Ok(format!("$.{dot_path}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_segment() {
        assert_eq!(to_json_path("name").unwrap(), "$.name");
    }

    #[test]
    fn nested_segment() {
        assert_eq!(to_json_path("addr.city").unwrap(), "$.addr.city");
    }

    #[test]
    fn rejects_empty_path() {
        assert!(to_json_path("").is_err());
    }

    #[test]
    fn rejects_empty_segment() {
        assert!(to_json_path("a..b").is_err());
    }
}
