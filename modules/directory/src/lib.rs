//! External lookups a census cycle depends on: the server directory listing
//! the population to poll, and our own public IP.

use anyhow::{Context, Result};
use census_core::Endpoint;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct DirectoryOptions {
    pub url: String,
    pub api_key: String,
    pub app_id: u32,
    pub limit: u32,
    pub timeout_ms: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct PublicIpOptions {
    pub url: String,
    pub timeout_ms: u64,
    pub user_agent: String,
}

#[derive(Debug, Deserialize)]
struct ServerListEnvelope {
    #[serde(default)]
    response: ServerListResponse,
}

#[derive(Debug, Default, Deserialize)]
struct ServerListResponse {
    #[serde(default)]
    servers: Vec<ServerListEntry>,
}

#[derive(Debug, Deserialize)]
struct ServerListEntry {
    addr: String,
}

pub fn request_url(opts: &DirectoryOptions) -> Result<Url> {
    let filter = format!("\\appid\\{}", opts.app_id);
    let limit = opts.limit.to_string();
    Url::parse_with_params(
        &opts.url,
        &[("key", opts.api_key.as_str()), ("limit", limit.as_str()), ("filter", filter.as_str())],
    )
    .with_context(|| format!("invalid directory url {:?}", opts.url))
}

/// Decode a server-list body into unique endpoints. Entries that are not
/// `ip:port` are skipped.
pub fn parse_server_list(body: &str) -> Result<Vec<Endpoint>> {
    let envelope: ServerListEnvelope = serde_json::from_str(body).context("decoding server list")?;
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(envelope.response.servers.len());
    for entry in envelope.response.servers {
        match entry.addr.parse::<Endpoint>() {
            Ok(ep) => {
                if seen.insert(ep) {
                    out.push(ep);
                }
            }
            Err(e) => debug!(addr = %entry.addr, error = %e, "skipping directory entry"),
        }
    }
    Ok(out)
}

/// Fetch the population to poll. Any failure here aborts the cycle.
pub async fn fetch_endpoints(opts: &DirectoryOptions) -> Result<Vec<Endpoint>> {
    let client = Client::builder()
        .timeout(Duration::from_millis(opts.timeout_ms))
        .user_agent(opts.user_agent.clone())
        .gzip(true)
        .build()?;
    let url = request_url(opts)?;
    let body = client
        .get(url)
        .send()
        .await
        .context("directory request")?
        .error_for_status()
        .context("directory status")?
        .text()
        .await
        .context("directory body")?;
    let endpoints = parse_server_list(&body)?;
    info!(count = endpoints.len(), "directory targets acquired");
    Ok(endpoints)
}

/// Best-effort lookup of the address the outside world sees us as.
pub async fn public_ip(opts: &PublicIpOptions) -> Option<IpAddr> {
    match fetch_public_ip(opts).await {
        Ok(ip) => {
            info!(%ip, "public ip confirmed");
            Some(ip)
        }
        Err(e) => {
            warn!(error = %e, "public ip unavailable, loopback substitution disabled");
            None
        }
    }
}

async fn fetch_public_ip(opts: &PublicIpOptions) -> Result<IpAddr> {
    let client = Client::builder()
        .timeout(Duration::from_millis(opts.timeout_ms))
        .user_agent(opts.user_agent.clone())
        .build()?;
    let body = client.get(&opts.url).send().await?.error_for_status()?.text().await?;
    body.trim().parse::<IpAddr>().with_context(|| format!("not an ip: {:?}", body.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> DirectoryOptions {
        DirectoryOptions {
            url: "https://api.example.net/IGameServersService/GetServerList/v1/".into(),
            api_key: "KEY123".into(),
            app_id: 232090,
            limit: 50000,
            timeout_ms: 10_000,
            user_agent: "census-test".into(),
        }
    }

    #[test]
    fn url_carries_key_limit_and_filter() {
        let url = request_url(&opts()).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
        assert!(pairs.contains(&("key".into(), "KEY123".into())));
        assert!(pairs.contains(&("limit".into(), "50000".into())));
        assert!(pairs.contains(&("filter".into(), "\\appid\\232090".into())));
    }

    #[test]
    fn server_list_is_parsed_and_deduplicated() {
        let body = r#"{"response":{"servers":[
            {"addr":"1.2.3.4:27015","name":"a"},
            {"addr":"1.2.3.4:27015"},
            {"addr":"garbage"},
            {"addr":"5.6.7.8:27016"}
        ]}}"#;
        let eps = parse_server_list(body).unwrap();
        assert_eq!(eps.len(), 2);
        assert_eq!(eps[0].to_string(), "1.2.3.4:27015");
        assert_eq!(eps[1].to_string(), "5.6.7.8:27016");
    }

    #[test]
    fn empty_response_is_empty_list() {
        assert!(parse_server_list(r#"{"response":{}}"#).unwrap().is_empty());
        assert!(parse_server_list("not json").is_err());
    }

    #[tokio::test]
    async fn unreachable_public_ip_service_yields_none() {
        let opts = PublicIpOptions { url: "http://127.0.0.1:9/ip".into(), timeout_ms: 500, user_agent: "census-test".into() };
        assert_eq!(public_ip(&opts).await, None);
    }
}
