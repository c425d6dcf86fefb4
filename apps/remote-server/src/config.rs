//! Server configuration
//!
//! Read from an optional TOML file; every field has a default. The
//! password may also come from the environment.

use std::path::{Path, PathBuf};

use anyhow::Context;
use crypto_session::KdfParams;
use net_transport::{DEFAULT_TCP_PORT, DEFAULT_WEBSOCKET_PORT};
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::SecretString;
use serde::Deserialize;

/// Overrides the configured password
pub const PASSWORD_ENV: &str = "STREAMING_REMOTE_PASSWORD";

#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Shared password; generated at startup when absent
    pub password: Option<String>,
    /// `0` disables the listener
    pub tcp_port: u16,
    /// `0` disables the listener
    pub websocket_port: u16,
    /// Unix socket path for local controllers
    pub local_socket: Option<PathBuf>,
    pub handshake_timeout_secs: u64,
    pub kdf: KdfConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            password: None,
            tcp_port: DEFAULT_TCP_PORT,
            websocket_port: DEFAULT_WEBSOCKET_PORT,
            local_socket: None,
            handshake_timeout_secs: 10,
            kdf: KdfConfig::default(),
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("tcp_port", &self.tcp_port)
            .field("websocket_port", &self.websocket_port)
            .field("local_socket", &self.local_socket)
            .field("handshake_timeout_secs", &self.handshake_timeout_secs)
            .field("kdf", &self.kdf)
            .finish()
    }
}

/// Argon2id cost; controllers must be configured with the same values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KdfConfig {
    pub memory_kib: u32,
    pub passes: u32,
    pub lanes: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        let params = KdfParams::interactive();
        Self {
            memory_kib: params.memory_kib,
            passes: params.passes,
            lanes: params.lanes,
        }
    }
}

impl From<KdfConfig> for KdfParams {
    fn from(config: KdfConfig) -> Self {
        Self {
            memory_kib: config.memory_kib,
            passes: config.passes,
            lanes: config.lanes,
        }
    }
}

impl ServerConfig {
    /// Load from `path` (if any), then apply the environment override.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                Self::from_toml(&text)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            config.password = Some(password);
        }
        Ok(config)
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// The password to use, and whether it had to be generated.
    pub fn resolve_password(&self) -> (SecretString, bool) {
        match &self.password {
            Some(password) if !password.is_empty() => (SecretString::from(password.as_str()), false),
            _ => (SecretString::from(generate_password()), true),
        }
    }
}

/// 8 random bytes as 16 lowercase hex characters.
fn generate_password() -> String {
    let mut bytes = [0u8; 8];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
