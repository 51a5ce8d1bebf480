use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub upload_dir: PathBuf,
    pub public_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = var("COSNAP_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("COSNAP_JWT_SECRET is unset or still a placeholder; it must match the identity provider's signing secret");
        }

        let host = var("COSNAP_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = var("COSNAP_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("COSNAP_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let public_url = var("COSNAP_PUBLIC_URL")
            .unwrap_or_else(|| "http://localhost:3000".into())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            jwt_secret,
            db_path: var("COSNAP_DB_PATH").unwrap_or_else(|| "cosnap.db".into()).into(),
            addr,
            upload_dir: var("COSNAP_UPLOAD_DIR").unwrap_or_else(|| "./uploads".into()).into(),
            public_url,
        })
    }
}
