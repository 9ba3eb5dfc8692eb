use std::env;
use std::path::PathBuf;

use crate::auth::DEFAULT_AUTHORITY_HOST;
use crate::error::{ForwarderError, Result};

pub const DEFAULT_SCHEMA_HINT: &str = "any";
pub const DEFAULT_PORT: u16 = 3000;

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Target Eventstream custom endpoint. Required for delivery, not for startup.
    pub ingest_url: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Optional user-assigned managed identity client id.
    pub mi_client_id: Option<String>,
    pub schema_hint: String,
    pub port: u16,
    pub http_mode: bool,
    /// Optional path to an external transform plugin library.
    pub transform_path: Option<PathBuf>,
    pub token_cache: bool,
    pub authority_host: String,
    pub identity_endpoint: Option<String>,
    pub identity_header: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Empty values are treated the same as unset ones.
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = match var("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|e| ForwarderError::Config(format!("Invalid PORT '{}': {}", raw, e)))?,
            None => DEFAULT_PORT,
        };

        let token_cache = match var("FABRIC_TOKEN_CACHE") {
            Some(raw) => !matches!(raw.trim(), "0" | "false"),
            None => true,
        };

        let http_mode = match var("HTTP_MODE") {
            Some(raw) => !matches!(raw.trim(), "0" | "false"),
            None => false,
        };

        Ok(Config {
            ingest_url: var("EVENTSTREAM_INGEST_URL"),
            tenant_id: var("FABRIC_TENANT_ID"),
            client_id: var("FABRIC_CLIENT_ID"),
            client_secret: var("FABRIC_CLIENT_SECRET"),
            mi_client_id: var("FABRIC_MI_CLIENT_ID"),
            schema_hint: var("SCHEMA_HINT").unwrap_or_else(|| DEFAULT_SCHEMA_HINT.to_string()),
            port,
            http_mode,
            transform_path: var("MCP_CLIENT_PATH").map(PathBuf::from),
            token_cache,
            authority_host: var("AZURE_AUTHORITY_HOST")
                .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
            identity_endpoint: var("IDENTITY_ENDPOINT"),
            identity_header: var("IDENTITY_HEADER"),
        })
    }
}
