use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use crate::issuance::DuplicatePolicy;
use crate::token::MIN_SECRET_LEN;

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// Server configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// `None` means a fresh secret per process.
    pub secret: Option<Vec<u8>>,
    pub snapshot: Option<PathBuf>,
    pub duplicates: DuplicatePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            secret: None,
            snapshot: None,
            duplicates: DuplicatePolicy::Allow,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_addr = lookup("PERMITS_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse()
            .with_context(|| "parse PERMITS_BIND")?;

        let secret = match lookup("PERMITS_SECRET").filter(|value| !value.trim().is_empty()) {
            Some(value) => {
                let bytes = hex::decode(value.trim()).with_context(|| "decode PERMITS_SECRET")?;
                if bytes.len() < MIN_SECRET_LEN {
                    return Err(anyhow!(
                        "PERMITS_SECRET must hold at least {} bytes",
                        MIN_SECRET_LEN
                    ));
                }
                Some(bytes)
            }
            None => None,
        };

        let snapshot = lookup("PERMITS_SNAPSHOT")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let duplicates = match lookup("PERMITS_DUPLICATE_POLICY") {
            Some(value) => value
                .parse()
                .with_context(|| "parse PERMITS_DUPLICATE_POLICY")?,
            None => DuplicatePolicy::default(),
        };

        Ok(Self {
            bind_addr,
            secret,
            snapshot,
            duplicates,
        })
    }
}
