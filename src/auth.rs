use std::fmt::Debug;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Config;
use crate::error::{ForwarderError, Result};
use crate::metrics;

/// OAuth scope for the Fabric ingestion audience, fixed for every credential
/// strategy.
pub const FABRIC_SCOPE: &str = "https://analysis.windows.net/powerbi/api/.default";

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// TTL assumed when an identity endpoint does not report one.
const DEFAULT_AMBIENT_TTL_SECS: u64 = 300;

// Token response for the client-credentials flow.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

// Token response from the ambient identity endpoints. IMDS reports
// expires_in as a decimal string; the App Service endpoint omits it.
#[derive(Deserialize)]
struct AmbientTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

/// Credential strategy, selected once at startup from configuration
/// presence.
#[derive(Clone)]
pub enum Credential {
    /// OAuth2 client-credentials exchange against the tenant's authority.
    ClientSecret {
        authority_host: String,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    /// Ambient managed identity: the App Service identity endpoint when the
    /// environment provides one, IMDS otherwise.
    ManagedIdentity {
        /// Optional user-assigned identity override
        client_id: Option<String>,
        /// `(endpoint, header)` pair from IDENTITY_ENDPOINT / IDENTITY_HEADER
        identity_endpoint: Option<(String, String)>,
        imds_url: String,
    },
}

impl Credential {
    /// Picks the credential strategy: explicit client secret when tenant id,
    /// client id, and secret are all configured, ambient identity otherwise.
    pub fn from_config(config: &Config) -> Self {
        match (&config.tenant_id, &config.client_id, &config.client_secret) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => {
                debug!("using client secret credential for tenant {}", tenant_id);
                Credential::ClientSecret {
                    authority_host: config.authority_host.clone(),
                    tenant_id: tenant_id.clone(),
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                }
            }
            _ => {
                debug!("using managed identity credential");
                Credential::ManagedIdentity {
                    client_id: config.mi_client_id.clone(),
                    identity_endpoint: config
                        .identity_endpoint
                        .clone()
                        .zip(config.identity_header.clone()),
                    imds_url: IMDS_TOKEN_URL.to_string(),
                }
            }
        }
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::ClientSecret {
                authority_host,
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("authority_host", authority_host)
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            Credential::ManagedIdentity {
                client_id,
                identity_endpoint,
                ..
            } => f
                .debug_struct("ManagedIdentity")
                .field("client_id", client_id)
                .field("identity_endpoint", &identity_endpoint.is_some())
                .finish_non_exhaustive(),
        }
    }
}

/// Port for anything that can mint a bearer token for the ingestion API.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

// A resolved token plus the instant it stops being usable.
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Token provider for the Fabric ingestion audience. Holds at most one
/// cached token behind an async mutex; with the cache disabled every call
/// performs a fresh exchange.
pub struct AzureTokenProvider {
    credential: Credential,
    scope: String,
    http: reqwest::Client,
    cache: Option<Mutex<Option<CachedToken>>>,
}

impl AzureTokenProvider {
    pub fn new(credential: Credential, cache_enabled: bool) -> Self {
        Self::with_scope(credential, FABRIC_SCOPE, cache_enabled)
    }

    pub fn with_scope(credential: Credential, scope: &str, cache_enabled: bool) -> Self {
        AzureTokenProvider {
            credential,
            scope: scope.to_string(),
            http: reqwest::Client::new(),
            cache: if cache_enabled {
                Some(Mutex::new(None))
            } else {
                None
            },
        }
    }

    async fn request_token(&self) -> Result<CachedToken> {
        let result = match &self.credential {
            Credential::ClientSecret {
                authority_host,
                tenant_id,
                client_id,
                client_secret,
            } => {
                self.client_secret_token(authority_host, tenant_id, client_id, client_secret)
                    .await
            }
            Credential::ManagedIdentity {
                client_id,
                identity_endpoint,
                imds_url,
            } => {
                self.ambient_token(client_id.as_deref(), identity_endpoint.as_ref(), imds_url)
                    .await
            }
        };

        match &result {
            Ok(_) => metrics::auth::token_success(),
            Err(_) => metrics::auth::token_error(),
        }
        result
    }

    async fn client_secret_token(
        &self,
        authority_host: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<CachedToken> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            authority_host.trim_end_matches('/'),
            tenant_id
        );
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .http
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| ForwarderError::Credential(format!("Token request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ForwarderError::Credential(format!("Token response unreadable: {}", e)))?;

        if !status.is_success() {
            return Err(ForwarderError::Credential(format!(
                "Token endpoint returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ForwarderError::Credential(format!("Malformed token response: {}", e)))?;

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }

    async fn ambient_token(
        &self,
        client_id: Option<&str>,
        identity_endpoint: Option<&(String, String)>,
        imds_url: &str,
    ) -> Result<CachedToken> {
        // The identity endpoints take the bare resource, without "/.default".
        let resource = self.scope.trim_end_matches("/.default").to_string();

        let request = match identity_endpoint {
            Some((endpoint, header)) => self
                .http
                .get(endpoint)
                .header("X-IDENTITY-HEADER", header)
                .query(&[
                    ("api-version", APP_SERVICE_API_VERSION),
                    ("resource", resource.as_str()),
                ]),
            None => self
                .http
                .get(imds_url)
                .header("Metadata", "true")
                .query(&[
                    ("api-version", IMDS_API_VERSION),
                    ("resource", resource.as_str()),
                ]),
        };
        let request = match client_id {
            Some(id) => request.query(&[("client_id", id)]),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            ForwarderError::Credential(format!("Managed identity request failed: {}", e))
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ForwarderError::Credential(format!("Token response unreadable: {}", e)))?;

        if !status.is_success() {
            return Err(ForwarderError::Credential(format!(
                "Managed identity endpoint returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token: AmbientTokenResponse = serde_json::from_str(&body)
            .map_err(|e| ForwarderError::Credential(format!("Malformed token response: {}", e)))?;

        let ttl = token
            .expires_in
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_AMBIENT_TTL_SECS);

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(ttl),
        })
    }
}

#[async_trait]
impl TokenSource for AzureTokenProvider {
    async fn access_token(&self) -> Result<String> {
        match &self.cache {
            Some(cache) => {
                let mut slot = cache.lock().await;
                if let Some(token) = slot.as_ref() {
                    if token.expires_at > Instant::now() + EXPIRY_MARGIN {
                        metrics::auth::cache_hit();
                        return Ok(token.access_token.clone());
                    }
                }

                let token = self.request_token().await?;
                let access_token = token.access_token.clone();
                *slot = Some(token);
                Ok(access_token)
            }
            None => Ok(self.request_token().await?.access_token),
        }
    }
}
