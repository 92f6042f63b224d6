//! Runtime configuration.

use anyhow::{Context, Result};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};

/// Runtime configuration data.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The server's logging config, which uses Rust's `env_logger` directives.
    pub rust_log: String,
    /// The port which client gRPC traffic is to use.
    pub client_port: u16,
    /// The port which HTTP traffic (metrics & signed downloads) is to use.
    pub http_port: u16,

    /// The deployment-wide subject prefix under which all notifications are published.
    #[serde(default = "Config::default_subject_prefix")]
    pub subject_prefix: String,

    /// The path to the database on disk.
    #[serde(default = "crate::database::default_data_path")]
    pub storage_data_path: String,

    /// The shared HMAC key used for signing and verifying download URLs, base64 encoded.
    #[serde(deserialize_with = "Config::parse_signing_key")]
    pub url_signing_key: Vec<u8>,
    /// The shared API token which clients must present, if any.
    #[serde(default)]
    pub api_token: Option<String>,

    /// The maximum number of notifications packed into a single chunk.
    #[serde(default = "Config::default_chunk_max_size")]
    pub chunk_max_size: usize,
    /// The maximum number of milliseconds a chunk may accumulate before it is emitted.
    #[serde(default = "Config::default_chunk_timeout_millis")]
    pub chunk_timeout_millis: u64,
    /// The number of seconds after which an unacknowledged chunk is released for redelivery.
    #[serde(default = "Config::default_ack_timeout_seconds")]
    pub ack_timeout_seconds: u64,
    /// The bounded capacity of a session's broker delivery buffer.
    #[serde(default = "Config::default_session_buffer_size")]
    pub session_buffer_size: usize,
}

impl Config {
    /// Create a new config instance.
    ///
    /// Currently this routine just parses the runtime environment and builds the application
    /// config from that. In the future, this may take into account an optional config file as
    /// well.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Result<Self> {
        let config: Config = envy::from_env().context("error building config from env")?;
        Ok(config)
    }

    /// The maximum age of an open chunk as a duration.
    pub fn chunk_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.chunk_timeout_millis)
    }

    /// The unacknowledged chunk timeout as a duration.
    pub fn ack_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ack_timeout_seconds)
    }

    fn default_subject_prefix() -> String {
        "UPDATES".into()
    }

    fn default_chunk_max_size() -> usize {
        100
    }

    fn default_chunk_timeout_millis() -> u64 {
        100
    }

    fn default_ack_timeout_seconds() -> u64 {
        30
    }

    fn default_session_buffer_size() -> usize {
        1000
    }

    /// Parse the URL signing key from the config source.
    fn parse_signing_key<'de, D: Deserializer<'de>>(val: D) -> Result<Vec<u8>, D::Error> {
        let b64: String = Deserialize::deserialize(val)?;
        let bytes = base64::decode(&b64).map_err(|err| DeError::custom(err.to_string()))?;
        if bytes.is_empty() {
            return Err(DeError::custom("URL signing key may not be empty"));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
impl Config {
    /// Create a new config instance for testing, backed by a temp dir for storage.
    pub fn new_test() -> Result<(std::sync::Arc<Config>, tempfile::TempDir)> {
        let tmpdir = tempfile::tempdir().context("error creating tmp dir for config")?;
        let config = Config {
            rust_log: "".into(),
            client_port: 7000,
            http_port: 7002,
            subject_prefix: "UPDATES".into(),
            storage_data_path: tmpdir.path().to_string_lossy().to_string(),
            url_signing_key: b"test-signing-key".to_vec(),
            api_token: None,
            chunk_max_size: 100,
            chunk_timeout_millis: 100,
            ack_timeout_seconds: 30,
            session_buffer_size: 1000,
        };
        Ok((std::sync::Arc::new(config), tmpdir))
    }
}
