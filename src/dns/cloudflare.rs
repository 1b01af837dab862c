use super::{ARecord, DnsProvider};
use crate::{
    config::DnsCredentials,
    error::{Error, Result},
};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub const API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Cloudflare v4 API client
pub struct Cloudflare {
    client: Client,
    base: String,
    credentials: DnsCredentials,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiError>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Item {
    id: String,
}

impl Cloudflare {
    /// # Errors
    ///
    /// Returns [`Error::Dns`] if the HTTP client cannot be built
    pub fn new(credentials: DnsCredentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Dns(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, API_BASE, credentials))
    }

    #[must_use]
    pub fn with_client(client: Client, base: impl Into<String>, credentials: DnsCredentials) -> Self {
        Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            DnsCredentials::Token(token) => request.bearer_auth(token),
            DnsCredentials::Key { email, key } => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", key),
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| Error::Dns(format!("{what}: {e}")))?;
        let status = response.status();
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| Error::Dns(format!("{what}: HTTP {status}: {e}")))?;

        if !envelope.success {
            let errors = envelope
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::Dns(format!("{what}: HTTP {status}: {errors}")));
        }
        envelope
            .result
            .ok_or_else(|| Error::Dns(format!("{what}: empty result")))
    }
}

#[async_trait::async_trait]
impl DnsProvider for Cloudflare {
    async fn zone_id(&self, name: &str) -> Result<Option<String>> {
        debug!("looking up zone {name}");
        let request = self
            .client
            .get(format!("{}/zones", self.base))
            .query(&[("name", name)]);
        let zones: Vec<Item> = self.send(request, "zone lookup").await?;
        Ok(zones.into_iter().next().map(|z| z.id))
    }

    async fn record_id(&self, zone: &str, name: &str) -> Result<Option<String>> {
        debug!("looking up A record {name} in zone {zone}");
        let request = self
            .client
            .get(format!("{}/zones/{zone}/dns_records", self.base))
            .query(&[("type", "A"), ("name", name)]);
        let records: Vec<Item> = self.send(request, "record lookup").await?;
        Ok(records.into_iter().next().map(|r| r.id))
    }

    async fn update_a(&self, zone: &str, record: &str, update: &ARecord) -> Result<()> {
        let request = self
            .client
            .put(format!("{}/zones/{zone}/dns_records/{record}", self.base))
            .json(&json!({
                "type": "A",
                "name": update.name,
                "content": update.content.to_string(),
                "ttl": update.ttl,
                "proxied": update.proxied,
            }));
        let _: Item = self.send(request, "record update").await?;
        Ok(())
    }
}
