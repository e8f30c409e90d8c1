//! Public IP discovery, used when a hoster announces its endpoint.

use std::time::Duration;

use futures::future::{select_ok, BoxFuture};
use futures::FutureExt;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

const IP_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum IpError {
    #[error("No IP lookup sources configured")]
    NoSources,

    #[error("IP lookup failed: {0}")]
    Lookup(String),
}

#[derive(Deserialize)]
struct Ipify {
    ip: String,
}

#[derive(Deserialize)]
struct IpApi {
    query: String,
}

/// Resolve to the first attempt that succeeds. The remaining attempts are
/// dropped, which cancels them.
pub async fn first_ok<T>(attempts: Vec<BoxFuture<'_, Result<T, IpError>>>) -> Result<T, IpError> {
    if attempts.is_empty() {
        return Err(IpError::NoSources);
    }
    let (value, rest) = select_ok(attempts).await?;
    debug!("IP lookup won, cancelling {} other lookup(s)", rest.len());
    Ok(value)
}

async fn lookup<T, F>(client: &reqwest::Client, url: &str, extract: F) -> Result<String, IpError>
where
    T: for<'de> Deserialize<'de>,
    F: FnOnce(T) -> String,
{
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| IpError::Lookup(format!("{url}: {e}")))?;
    let body: T = response
        .json()
        .await
        .map_err(|e| IpError::Lookup(format!("{url}: {e}")))?;
    Ok(extract(body))
}

/// Ask several public services for this machine's address at once.
pub async fn get_ip() -> Result<String, IpError> {
    let client = reqwest::Client::builder()
        .timeout(IP_LOOKUP_TIMEOUT)
        .build()
        .map_err(|e| IpError::Lookup(e.to_string()))?;

    let attempts = vec![
        lookup(&client, "https://api.ipify.org?format=json", |r: Ipify| r.ip).boxed(),
        lookup(&client, "http://ip-api.com/json", |r: IpApi| r.query).boxed(),
    ];
    let ip = first_ok(attempts).await?;
    info!("Discovered external IP {ip}");
    Ok(ip)
}
