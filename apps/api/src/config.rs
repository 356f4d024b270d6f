use anyhow::{ensure, Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. When unset the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// HS256 secret shared with the identity provider that signs bearer tokens.
    pub jwt_secret: String,
    pub jwt_audience: Option<String>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: optional_env("DATABASE_URL"),
            db_max_connections: parse_max_connections(
                &std::env::var("DB_MAX_CONNECTIONS").unwrap_or_else(|_| "10".to_string()),
            )?,
            jwt_secret: require_env("JWT_SECRET")?,
            jwt_audience: optional_env("JWT_AUDIENCE"),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_max_connections(raw: &str) -> Result<u32> {
    let max = raw
        .trim()
        .parse::<u32>()
        .context("DB_MAX_CONNECTIONS must be a positive integer")?;
    ensure!(max > 0, "DB_MAX_CONNECTIONS must be a positive integer, got 0");
    Ok(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_connections_must_be_positive() {
        assert_eq!(parse_max_connections("10").unwrap(), 10);
        assert!(parse_max_connections("0").is_err());
        assert!(parse_max_connections("-3").is_err());
        assert!(parse_max_connections("lots").is_err());
    }
}
