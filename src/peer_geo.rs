use crate::config::PeerGeoConfig;
use crate::error::{WatchError, WatchResult};
use crate::repository::JsonDocument;
use crate::rpc::ChainClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerLocation {
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl PeerLocation {
    fn unknown(ip: &str) -> Self {
        PeerLocation {
            ip: ip.to_string(),
            ..Default::default()
        }
    }
}

/// Document written to `peer_geo.output_path` after every refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerGeoReport {
    pub updated_at: i64,
    pub ip_count: usize,
    pub peers: Vec<PeerLocation>,
    pub geoip_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PeerGeoReport {
    fn failed(error: &WatchError) -> Self {
        PeerGeoReport {
            updated_at: chrono::Utc::now().timestamp(),
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

// Response shape of ipapi.co-style providers
#[derive(Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    error: Option<Value>,
    country_name: Option<String>,
    country_code: Option<String>,
    region: Option<String>,
    city: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// Parses `[v6]:port`, a bare IP, or `v4:port`.
pub fn extract_ip(remote_address: &str) -> Option<IpAddr> {
    let remote_address = remote_address.trim();
    if let Ok(socket) = remote_address.parse::<SocketAddr>() {
        return Some(socket.ip());
    }
    if let Ok(ip) = remote_address.parse::<IpAddr>() {
        return Some(ip);
    }
    if remote_address.starts_with('[') {
        let inner = remote_address.split(']').next()?.trim_start_matches('[');
        return inner.parse().ok();
    }
    let (host, _port) = remote_address.rsplit_once(':')?;
    host.parse().ok()
}

/// Unique, sorted peer IPs from an `admin_peers` response.
pub fn extract_peer_ips(peers: &Value) -> Vec<String> {
    let Some(peers) = peers.as_array() else {
        return Vec::new();
    };

    peers
        .iter()
        .filter_map(|peer| peer.get("network")?.get("remoteAddress")?.as_str())
        .filter_map(extract_ip)
        .map(|ip| ip.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Periodic best-effort enrichment of the node's peer list with locations.
pub struct PeerGeoService<C> {
    client: C,
    http: reqwest::Client,
    output: JsonDocument<PeerGeoReport>,
    provider_url: String,
    interval: Duration,
}

impl<C: ChainClient> PeerGeoService<C> {
    pub fn new(client: C, config: &PeerGeoConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_sec))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(PeerGeoService {
            client,
            http,
            output: JsonDocument::new(&config.output_path),
            provider_url: config.provider_url.clone(),
            interval: Duration::from_secs(config.update_interval_sec),
        })
    }

    /// Never returns; a failed refresh is recorded in the output document instead.
    pub async fn run(&self) {
        info!(
            "Starting peer geo refresh every {:?} into {}",
            self.interval,
            self.output.path().display()
        );

        loop {
            let report = match self.refresh().await {
                Ok(report) => {
                    debug!("Peer geo refreshed: {} address(es)", report.ip_count);
                    report
                }
                Err(e) => {
                    warn!("Peer geo refresh failed: {}", e);
                    PeerGeoReport::failed(&e)
                }
            };
            if let Err(e) = self.output.save(&report).await {
                warn!("Failed to write peer geo report: {}", e);
            }
            sleep(self.interval).await;
        }
    }

    pub async fn refresh(&self) -> WatchResult<PeerGeoReport> {
        if !self.client.is_connected().await {
            return Err(WatchError::Connectivity(
                "node not reachable for admin_peers".to_string(),
            ));
        }

        let peers = self.client.admin_peers().await.unwrap_or(Value::Array(vec![]));
        let ips = extract_peer_ips(&peers);
        debug!("Looking up {} peer address(es)", ips.len());

        let mut located = Vec::with_capacity(ips.len());
        for ip in &ips {
            located.push(self.lookup(ip).await);
        }

        Ok(PeerGeoReport {
            updated_at: chrono::Utc::now().timestamp(),
            ip_count: ips.len(),
            peers: located,
            geoip_enabled: false,
            error: None,
        })
    }

    async fn lookup(&self, ip: &str) -> PeerLocation {
        let url = self.provider_url.replace("{ip}", ip);
        let response = match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!("Geo lookup for {} returned {}", ip, response.status());
                return PeerLocation::unknown(ip);
            }
            Err(e) => {
                debug!("Geo lookup for {} failed: {}", ip, e);
                return PeerLocation::unknown(ip);
            }
        };

        match response.json::<ProviderResponse>().await {
            Ok(body) if body.error.is_none() => PeerLocation {
                ip: ip.to_string(),
                country: body.country_name,
                country_code: body.country_code,
                region: body.region,
                city: body.city,
                latitude: body.latitude,
                longitude: body.longitude,
            },
            _ => PeerLocation::unknown(ip),
        }
    }
}
