//! Service configuration consumed by the render engine.
//!
//! Only the bind host and port matter here: they feed the default `host`
//! value injected into templates for self-referential resource URLs.

use crate::error::{Error, Result};
use log::debug;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::Path;

/// Bind configuration of the service hosting the engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Address the HTTP layer binds to.
    pub host: String,
    /// Port the HTTP layer listens on.
    pub port: u16,
    /// Shared secret for the HTTP layer; unused by the engine itself.
    pub key: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 39334,
            key: String::new(),
        }
    }
}

impl ServiceConfig {
    /// Loads the configuration from a TOML file.
    ///
    /// A missing file is not an error; the defaults apply on a fresh
    /// deployment. A file that exists but fails to parse is.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("config file {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(Error::Io(e)),
        };

        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Base URL templates use to reach back into the service.
    ///
    /// A wildcard bind address is not reachable as a URL host, so it is
    /// substituted with a loopback hostname.
    pub fn public_base_url(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" | "[::]" => "localhost",
            other => other,
        };
        format!("http://{}:{}", host, self.port)
    }
}
