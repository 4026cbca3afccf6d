use std::time::Duration;

use log::warn;

use crate::error::RelayError;

pub const DEFAULT_API_ROOT: &str = "https://eitaayar.ir/api";
pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Where messages are delivered. Either half may be missing; that is reported
/// per request rather than at startup.
#[derive(Debug, Clone, Default)]
pub struct Destination {
    pub token: Option<String>,
    pub chat_id: Option<String>,
}

impl Destination {
    #[cfg(test)]
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            chat_id: Some(chat_id.into()),
        }
    }

    /// Returns `(token, chat_id)` or `NotConfigured` when either is absent.
    pub fn resolve(&self) -> Result<(&str, &str), RelayError> {
        match (self.token.as_deref(), self.chat_id.as_deref()) {
            (Some(token), Some(chat_id)) => Ok((token, chat_id)),
            _ => Err(RelayError::NotConfigured),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.resolve().is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub destination: Destination,
    pub api_root: String,
    pub upstream_timeout: Duration,
    pub port: u16,
    pub api_key: Option<String>,
}

impl RelayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let upstream_timeout = match var("RELAY_UPSTREAM_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    warn!("Ignoring invalid RELAY_UPSTREAM_TIMEOUT_SECS={:?}", raw);
                    DEFAULT_UPSTREAM_TIMEOUT
                }
            },
            None => DEFAULT_UPSTREAM_TIMEOUT,
        };

        let port = match var("RELAY_API_PORT") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("Ignoring invalid RELAY_API_PORT={:?}", raw);
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        Self {
            destination: Destination {
                token: var("EITAA_TOKEN"),
                chat_id: var("EITAA_CHAT_ID"),
            },
            api_root: var("EITAA_API_ROOT")
                .map(|root| root.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_ROOT.to_string()),
            upstream_timeout,
            port,
            api_key: var("RELAY_API_KEY"),
        }
    }
}
