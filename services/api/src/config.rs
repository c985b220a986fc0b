//! services/api/src/config.rs
//!
//! Service settings read from the process environment, with a `.env` file honoured for
//! local runs. Only `DATABASE_URL` and `PAYHERE_MERCHANT_ID` have no default.

use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

const DEFAULT_MAX_NOTE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    MissingVar(String),
    #[error("{0} has an invalid value: {1}")]
    InvalidValue(String, String),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// PostgreSQL URL, or `memory://` to run against the in-process store.
    pub database_url: String,
    pub log_level: Level,
    /// Base of the links placed in emails and payment return URLs. Always ends with `/`.
    pub frontend_url: String,
    pub payhere_merchant_id: String,
    pub cors_allowed_origins: Vec<String>,
    pub meeting_base_url: String,
    pub session_fee: String,
    pub session_currency: String,
    pub max_note_bytes: usize,
}

impl Config {
    /// Reads every setting, failing on the first missing or malformed one.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        Ok(Self {
            bind_address: parsed("BIND_ADDRESS", "0.0.0.0:3000")?,
            database_url: mandatory("DATABASE_URL")?,
            log_level: parsed("RUST_LOG", "INFO")?,
            frontend_url: with_trailing_slash(or_default("FRONTEND_URL", "http://localhost:5173/")),
            payhere_merchant_id: mandatory("PAYHERE_MERCHANT_ID")?,
            cors_allowed_origins: parse_origins(&or_default(
                "CORS_ALLOWED_ORIGINS",
                "http://localhost:5173",
            )),
            meeting_base_url: or_default("MEETING_BASE_URL", "https://meet.jit.si"),
            session_fee: or_default("SESSION_FEE", "1000.00"),
            session_currency: or_default("SESSION_CURRENCY", "LKR"),
            max_note_bytes: parsed("MAX_NOTE_BYTES", &DEFAULT_MAX_NOTE_BYTES.to_string())?,
        })
    }

    /// Configuration for in-process tests.
    pub fn for_tests() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: "memory://".to_string(),
            log_level: Level::DEBUG,
            frontend_url: "http://localhost:5173/".to_string(),
            payhere_merchant_id: "1221149".to_string(),
            cors_allowed_origins: vec!["http://localhost:5173".to_string()],
            meeting_base_url: "https://meet.jit.si".to_string(),
            session_fee: "1000.00".to_string(),
            session_currency: "LKR".to_string(),
            max_note_bytes: DEFAULT_MAX_NOTE_BYTES,
        }
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url.starts_with("memory:")
    }
}

fn or_default(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn mandatory(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn parsed<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = or_default(name, default);
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("'{raw}': {e}")))
}

fn with_trailing_slash(url: String) -> String {
    if url.ends_with('/') {
        url
    } else {
        format!("{url}/")
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_split_and_trimmed() {
        assert_eq!(
            parse_origins("http://localhost:5173, https://tuteskillz.app ,"),
            vec!["http://localhost:5173", "https://tuteskillz.app"]
        );
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = "not-a-socket".parse::<SocketAddr>().map(|_| ()).unwrap_err().to_string();
        let wrapped = ConfigError::InvalidValue("BIND_ADDRESS".to_string(), err);
        assert!(wrapped.to_string().starts_with("BIND_ADDRESS has an invalid value"));
        assert_eq!(ConfigError::MissingVar("DATABASE_URL".into()).to_string(), "DATABASE_URL must be set");
    }

    #[test]
    fn frontend_url_gains_trailing_slash() {
        assert_eq!(with_trailing_slash("https://tuteskillz.app".into()), "https://tuteskillz.app/");
        assert_eq!(with_trailing_slash("https://tuteskillz.app/".into()), "https://tuteskillz.app/");
    }
}
