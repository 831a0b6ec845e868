//! Server configuration loaded from the environment.
//!
//! `.env` in the working directory is loaded first and never overrides
//! variables that are already set.
//!
//! | Variable         | Default        |
//! |------------------|----------------|
//! | `TRELLIS_ADDR`   | `0.0.0.0:3000` |
//! | `TRELLIS_STRICT` | `false`        |

use std::net::SocketAddr;

use serde::Deserialize;

use crate::error::Error;
use crate::router::RouterOptions;

const ADDR: &str = "TRELLIS_ADDR";
const STRICT: &str = "TRELLIS_STRICT";

/// Where to listen, and the options for the root router.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    #[serde(flatten)]
    pub router: RouterOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            router: RouterOptions::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, Error> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();
        if let Some(addr) = lookup(ADDR) {
            config.addr = addr.trim().parse().map_err(|e| Error::InvalidConfig {
                key: ADDR,
                reason: format!("{addr:?}: {e}"),
            })?;
        }
        if let Some(strict) = lookup(STRICT) {
            config.router.strict = strict.trim().parse().map_err(|e| Error::InvalidConfig {
                key: STRICT,
                reason: format!("{strict:?}: {e}"),
            })?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, Error> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.addr.port(), 3000);
        assert!(!config.router.strict);
    }

    #[test]
    fn reads_variables() {
        let config = load(&[(ADDR, "127.0.0.1:8080"), (STRICT, "true")]).unwrap();
        assert_eq!(config.addr, "127.0.0.1:8080".parse().unwrap());
        assert!(config.router.strict);
    }

    #[test]
    fn rejects_bad_values() {
        let err = load(&[(ADDR, "localhost")]).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { key: "TRELLIS_ADDR", .. }));

        let err = load(&[(STRICT, "yes")]).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { key: "TRELLIS_STRICT", .. }));
    }

    #[test]
    fn deserializes_with_serde() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"addr": "10.0.0.1:9000", "strict": true}"#).unwrap();
        assert_eq!(config.addr.port(), 9000);
        assert!(config.router.strict);
    }
}
