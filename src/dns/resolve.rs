use crate::{
    endpoint,
    error::{Error, Result},
    gateway::{CommandSpec, Gateway},
    plan::LOCAL,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::debug;

/// IPv4 address of `host`
///
/// Literals are returned as is; otherwise the system resolver is asked, then
/// `dig` as a fallback.
///
/// # Errors
///
/// Returns [`Error::Dns`] if no IPv4 address can be found
pub async fn resolve_ipv4(gateway: &Gateway, host: &str) -> Result<Ipv4Addr> {
    let host = endpoint::host_only(host);
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }

    match tokio::net::lookup_host((host, 0)).await {
        Ok(addrs) => {
            if let Some(ip) = first_ipv4(addrs) {
                return Ok(ip);
            }
            debug!("{host} has no IPv4 address in the system resolver");
        }
        Err(e) => debug!("lookup of {host} failed: {e}"),
    }

    dig(gateway, host).await
}

/// Ask `dig` for the A record of `host`
///
/// # Errors
///
/// Returns [`Error::Dns`] if `dig` fails or prints no address
pub async fn dig(gateway: &Gateway, host: &str) -> Result<Ipv4Addr> {
    let session = gateway.open(LOCAL).await?;
    let output = gateway
        .run(&session, &CommandSpec::new("dig").args(["+short", host, "A"]))
        .await;
    gateway.close(session).await;

    let output = output?;
    if !output.success() {
        return Err(Error::Dns(format!(
            "cannot resolve {host}: {}",
            output.reason()
        )));
    }
    parse_dig(&output.stdout)
        .ok_or_else(|| Error::Dns(format!("cannot resolve {host} to an IPv4 address")))
}

fn first_ipv4(addrs: impl IntoIterator<Item = SocketAddr>) -> Option<Ipv4Addr> {
    addrs.into_iter().find_map(|addr| match addr.ip() {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(_) => None,
    })
}

// `dig +short` prints CNAME targets before the address
fn parse_dig(stdout: &str) -> Option<Ipv4Addr> {
    stdout.lines().find_map(|line| line.trim().parse().ok())
}
