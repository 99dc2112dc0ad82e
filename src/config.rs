//! JSON configuration for the client and server binaries.
//!
//! Every field is optional. The file is located through an environment
//! variable; when the variable is unset the defaults apply.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::constants::{
    CLIENT_CONFIG_ENV, CONNECT_TIMEOUT_MS, DEFAULT_LISTEN_ADDR, DEFAULT_TARGET, EXAMPLE_SCHEME,
    HANDLER_DELAY_MS, RETRY_DELAY_SECS, SERVER_CONFIG_ENV, TIMESTAMP_KEY,
};
use crate::error::Result;
use crate::resolver::StaticTable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTlsConfig {
    /// PEM file with the CA (or self-signed server) certificate.
    pub ca_cert: PathBuf,
    /// Overrides the name checked against the server certificate.
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub target: String,
    pub scheme: String,
    pub resolver_table: StaticTable,
    pub tls: Option<ClientTlsConfig>,
    pub cancel_after_ms: Option<u64>,
    pub deadline_ms: Option<u64>,
    pub connect_timeout_ms: u64,
    pub log_calls: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_owned(),
            scheme: EXAMPLE_SCHEME.to_owned(),
            resolver_table: StaticTable::example(),
            tls: None,
            cancel_after_ms: None,
            deadline_ms: None,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
            log_calls: false,
        }
    }
}

impl ClientConfig {
    pub fn load() -> Result<Self> {
        load_from_env(CLIENT_CONFIG_ENV)
    }

    pub fn cancel_after(&self) -> Option<Duration> {
        self.cancel_after_ms.map(Duration::from_millis)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    Greet,
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub tls: Option<ServerTlsConfig>,
    pub delay_ms: u64,
    pub mode: ReplyMode,
    pub retry_delay_secs: u64,
    pub echo_metadata: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_owned(),
            tls: None,
            delay_ms: HANDLER_DELAY_MS,
            mode: ReplyMode::Abort,
            retry_delay_secs: RETRY_DELAY_SECS,
            echo_metadata: vec![TIMESTAMP_KEY.to_owned()],
        }
    }
}

impl ServerConfig {
    pub fn load() -> Result<Self> {
        load_from_env(SERVER_CONFIG_ENV)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

fn load_from_env<T: DeserializeOwned + Default>(var: &str) -> Result<T> {
    match env::var_os(var) {
        Some(path) => load_file(Path::new(&path)),
        None => Ok(T::default()),
    }
}

pub fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
