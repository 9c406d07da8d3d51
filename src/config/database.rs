//! Database configuration.

use super::error::ValidationError;

/// PostgreSQL connection configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Connection URL, from `DATABASE_URL`.
    pub url: String,

    /// Pool size per process.
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection.
    pub acquire_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.url.starts_with("postgres://") && !self.url.starts_with("postgresql://") {
            return Err(ValidationError::InvalidDatabaseUrl);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_postgres_urls() {
        let config = DatabaseConfig {
            url: "postgresql://user@localhost/protectogram".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 5,
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_other_schemes() {
        let config = DatabaseConfig {
            url: "mysql://localhost/db".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 5,
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidDatabaseUrl));
    }
}
