//! DNS cutover: point a domain's A record at its new host

pub mod cloudflare;
pub mod resolve;

pub use cloudflare::Cloudflare;

use crate::{
    config::DnsOptions,
    error::{Error, Result},
    gateway::Gateway,
};
use std::net::Ipv4Addr;
use tracing::{debug, info};

/// Contents written to an A record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ARecord {
    pub name: String,
    pub content: Ipv4Addr,
    pub ttl: u32,
    pub proxied: bool,
}

/// An authoritative DNS API
#[async_trait::async_trait]
pub trait DnsProvider: Send + Sync {
    /// Zone id for an exact zone name
    async fn zone_id(&self, name: &str) -> Result<Option<String>>;

    /// Id of the A record `name` in `zone`
    async fn record_id(&self, zone: &str, name: &str) -> Result<Option<String>>;

    async fn update_a(&self, zone: &str, record: &str, update: &ARecord) -> Result<()>;
}

/// Candidate zone names for `domain`, most specific first
///
/// `a.b.example.com` yields `a.b.example.com`, `b.example.com`, `example.com`.
#[must_use]
pub fn zone_candidates(domain: &str) -> Vec<&str> {
    let domain = domain.trim_end_matches('.');
    let mut candidates = Vec::new();
    let mut rest = domain;
    while rest.contains('.') {
        candidates.push(rest);
        match rest.split_once('.') {
            Some((_, parent)) => rest = parent,
            None => break,
        }
    }
    candidates
}

/// Find the zone hosting `domain` by walking up its labels
///
/// # Errors
///
/// Returns [`Error::Dns`] when no candidate is a zone or the API fails
pub async fn find_zone(provider: &dyn DnsProvider, domain: &str) -> Result<String> {
    for candidate in zone_candidates(domain) {
        if let Some(id) = provider.zone_id(candidate).await? {
            debug!("zone for {domain} is {candidate} ({id})");
            return Ok(id);
        }
    }
    Err(Error::Dns(format!("no zone found for {domain}")))
}

/// Resolve `host` and point the A record for `domain` at it
///
/// Returns the address written.
///
/// # Errors
///
/// Returns [`Error::Dns`] if the host does not resolve, no zone or record
/// exists, or the update is rejected
pub async fn cutover(
    provider: &dyn DnsProvider,
    gateway: &Gateway,
    domain: &str,
    host: &str,
    options: &DnsOptions,
) -> Result<Ipv4Addr> {
    let ip = resolve::resolve_ipv4(gateway, host).await?;
    let zone = find_zone(provider, domain).await?;
    let record = provider
        .record_id(&zone, domain)
        .await?
        .ok_or_else(|| Error::Dns(format!("no A record for {domain}")))?;

    let update = ARecord {
        name: domain.to_string(),
        content: ip,
        ttl: options.ttl,
        proxied: options.proxied,
    };
    provider.update_a(&zone, &record, &update).await?;
    info!(
        "pointed {domain} at {ip} (ttl {}, proxied {})",
        options.ttl, options.proxied
    );
    Ok(ip)
}
