//! Database location configuration.

use crate::errors::Result;

/// Default on-disk location when no environment override is set.
const DEFAULT_DATABASE_PATH: &str = "data/rethrive.sqlite";

/// Resolves the SQLite database path from `RETHRIVE_DATABASE_PATH`,
/// falling back to a local file.
pub fn get_database_path() -> Result<String> {
    Ok(std::env::var("RETHRIVE_DATABASE_PATH")
        .unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_path_used_without_env() {
        std::env::remove_var("RETHRIVE_DATABASE_PATH");
        assert_eq!(get_database_path().unwrap(), DEFAULT_DATABASE_PATH);
    }
}
