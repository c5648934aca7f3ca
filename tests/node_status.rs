mod common;

use alloy_primitives::U256;
use common::{FakeChain, ONE_COIN, OTHER, WATCHED};
use cph_monitor::config::PeerGeoConfig;
use cph_monitor::error::WatchError;
use cph_monitor::peer_geo::PeerGeoService;
use cph_monitor::query::commands::{NodeStatus, WatchEntry, collect_balances, collect_node_status};
use serde_json::json;

#[tokio::test]
async fn test_status_of_connected_node() {
    let chain = FakeChain::at_height(1234);

    let status = collect_node_status(&chain).await.unwrap();

    assert_eq!(
        status,
        NodeStatus {
            connected: true,
            block_number: Some(1234),
            peer_count: Some(4),
            syncing: Some(json!(false)),
            txpool: Some(json!({"pending": "0x2", "queued": "0x0"})),
            mining_status: None,
            hashrate: None,
        }
    );
}

#[tokio::test]
async fn test_status_of_unreachable_node() {
    let chain = FakeChain::at_height(1234);
    chain.script_connectivity(&[false]);

    let status = collect_node_status(&chain).await.unwrap();

    assert_eq!(status, NodeStatus::disconnected());
    assert_eq!(serde_json::to_value(&status).unwrap(), json!({"connected": false}));
}

#[tokio::test]
async fn test_failed_balance_leaves_entry_empty() {
    let chain = FakeChain::default();
    let addresses = vec![WATCHED.to_string(), OTHER.to_string()];

    let entries = collect_balances(&chain, &addresses).await;

    assert_eq!(
        entries,
        vec![
            WatchEntry {
                address: WATCHED.to_string(),
                balance: Some(U256::from(3 * ONE_COIN)),
            },
            WatchEntry {
                address: OTHER.to_string(),
                balance: None,
            },
        ]
    );
}

fn geo_config(dir: &std::path::Path) -> PeerGeoConfig {
    PeerGeoConfig {
        enabled: true,
        output_path: dir.join("peer_geo.json"),
        update_interval_sec: 60,
        provider_url: "http://127.0.0.1:9/{ip}/json/".to_string(),
        request_timeout_sec: 1,
        user_agent: "cph-monitor-test".to_string(),
    }
}

#[tokio::test]
async fn test_peer_geo_without_peers() {
    let temp_dir = tempfile::tempdir().unwrap();
    let chain = FakeChain::default();
    chain.set_peers(json!([]));
    let service = PeerGeoService::new(chain, &geo_config(temp_dir.path())).unwrap();

    let report = service.refresh().await.unwrap();

    assert_eq!(report.ip_count, 0);
    assert!(report.peers.is_empty());
    assert!(!report.geoip_enabled);
    assert!(report.error.is_none());
}

#[tokio::test]
async fn test_peer_geo_lookup_failure_keeps_ip() {
    let temp_dir = tempfile::tempdir().unwrap();
    let chain = FakeChain::default();
    chain.set_peers(json!([
        {"network": {"remoteAddress": "192.0.2.7:30303"}},
        {"network": {"remoteAddress": "192.0.2.7:40404"}}
    ]));
    let service = PeerGeoService::new(chain, &geo_config(temp_dir.path())).unwrap();

    let report = service.refresh().await.unwrap();

    assert_eq!(report.ip_count, 1);
    assert_eq!(report.peers.len(), 1);
    assert_eq!(report.peers[0].ip, "192.0.2.7");
    assert!(report.peers[0].country.is_none());
}

#[tokio::test]
async fn test_peer_geo_requires_connection() {
    let temp_dir = tempfile::tempdir().unwrap();
    let chain = FakeChain::default();
    chain.script_connectivity(&[false]);
    let service = PeerGeoService::new(chain, &geo_config(temp_dir.path())).unwrap();

    assert!(matches!(
        service.refresh().await,
        Err(WatchError::Connectivity(_))
    ));
}
