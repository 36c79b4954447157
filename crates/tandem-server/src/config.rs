use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub db_readers: usize,
    pub jwt_secret: String,
}

impl Config {
    /// Read `TANDEM_*` variables (after `.env` has been loaded).
    pub fn from_env() -> Result<Self> {
        let jwt_secret = std::env::var("TANDEM_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("TANDEM_JWT_SECRET is unset or still a placeholder; set it in .env");
        }

        let host = std::env::var("TANDEM_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("TANDEM_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .context("TANDEM_PORT must be a port number")?;
        let db_path: PathBuf = std::env::var("TANDEM_DB_PATH")
            .unwrap_or_else(|_| "tandem.db".into())
            .into();
        let db_readers = std::env::var("TANDEM_DB_READERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(tandem_db::DEFAULT_READERS);

        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .context("TANDEM_HOST/TANDEM_PORT do not form a socket address")?;

        Ok(Self {
            addr,
            db_path,
            db_readers,
            jwt_secret,
        })
    }
}
