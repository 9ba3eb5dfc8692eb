use crate::auth::{AzureTokenProvider, Credential, TokenSource};
use crate::config::Config;
use crate::deliver::EventstreamClient;
use crate::error::Result;
use crate::metrics;
use crate::record::Input;
use crate::transform::{load_transform, Transform};

/// Use case for forwarding one input to the ingestion endpoint:
/// normalize → resolve token → deliver.
pub struct Forwarder {
    transform: Box<dyn Transform>,
    tokens: Box<dyn TokenSource>,
    delivery: EventstreamClient,
    schema_hint: String,
}

impl Forwarder {
    pub fn new(
        transform: Box<dyn Transform>,
        tokens: Box<dyn TokenSource>,
        delivery: EventstreamClient,
        schema_hint: String,
    ) -> Self {
        Self {
            transform,
            tokens,
            delivery,
            schema_hint,
        }
    }

    /// Wire the pipeline from process configuration: the configured plugin
    /// (or built-in normalizer), the Azure token provider, and the
    /// Eventstream client.
    pub fn from_config(config: &Config) -> Self {
        let transform = load_transform(config.transform_path.as_deref());
        let credential = Credential::from_config(config);
        let tokens = Box::new(AzureTokenProvider::new(credential, config.token_cache));
        let delivery = EventstreamClient::new(config.ingest_url.clone());

        Self::new(transform, tokens, delivery, config.schema_hint.clone())
    }

    /// Forward a single input. Returns the upstream HTTP status on success.
    pub async fn forward(&self, input: Input) -> Result<u16> {
        let record = self.transform.apply(input, &self.schema_hint).await?;
        metrics::normalize::record_normalized(self.transform.name());

        let token = self.tokens.access_token().await?;
        let status = self.delivery.send(&record, &token).await?;

        Ok(status)
    }
}
