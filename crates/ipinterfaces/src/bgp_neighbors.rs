//! BGP neighbor annotation of interface addresses
//!
//! CONFIG_DB `BGP_NEIGHBOR|<neighbor ip>` rows carry the local endpoint in
//! `local_addr`. Any interface address whose bare IP equals a neighbor's
//! local endpoint is annotated with that neighbor's IP and name.

use crate::db::{DbQuery, TableSelector, CFG_BGP_NEIGHBOR_TABLE, TABLE_KEY_SEPARATOR};
use crate::error::{IpIntfError, Result};
use crate::types::{IpInterfaceDetail, DEFAULT_NAMESPACE};
use serde_json::Value;
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::{debug, instrument, warn};

/// Peer reached from a given local address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgpNeighborInfo {
    pub neighbor_ip: String,
    pub name: String,
}

/// Field text regardless of JSON type; strings are not quoted
fn value_to_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Neighbors keyed by their raw `local_addr` text.
///
/// Only the default namespace is consulted.
#[instrument(skip(db))]
pub fn get_bgp_neighbors(db: Option<&dyn DbQuery>) -> Result<HashMap<String, BgpNeighborInfo>> {
    let db = db.ok_or(IpIntfError::QueryNotConfigured)?;
    let rows = db.query(&[TableSelector::config_db(
        DEFAULT_NAMESPACE,
        CFG_BGP_NEIGHBOR_TABLE,
    )])?;

    let mut neighbors = HashMap::with_capacity(rows.len());
    for (key, value) in &rows {
        let Some((_, neighbor_ip)) = key.split_once(TABLE_KEY_SEPARATOR) else {
            debug!(key = %key, "Skipping BGP neighbor key without table prefix");
            continue;
        };
        let Value::Object(fields) = value else {
            debug!(key = %key, "Skipping BGP neighbor entry that is not a field map");
            continue;
        };
        let Some(Value::String(local_addr)) = fields.get("local_addr") else {
            debug!(key = %key, "Skipping BGP neighbor without local_addr");
            continue;
        };

        neighbors.insert(
            local_addr.clone(),
            BgpNeighborInfo {
                neighbor_ip: neighbor_ip.to_string(),
                name: value_to_string(fields.get("name")),
            },
        );
    }

    debug!(count = neighbors.len(), "Loaded BGP neighbors");
    Ok(neighbors)
}

/// Bare IP of a valid `ip/prefix` string, in canonical text form
fn cidr_ip(cidr: &str) -> Option<String> {
    let (ip, prefix) = cidr.split_once('/')?;
    let ip = ip.parse::<IpAddr>().ok()?;
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let prefix = prefix.parse::<u8>().ok()?;
    let max_prefix = match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    (prefix <= max_prefix).then(|| ip.to_string())
}

/// Annotate every address that is some neighbor's local endpoint.
///
/// A neighbor table that cannot be read counts as having no neighbors.
pub fn enrich_with_bgp_data(
    interfaces: &mut [IpInterfaceDetail],
    db: Option<&dyn DbQuery>,
) -> Result<()> {
    let neighbors = match get_bgp_neighbors(db) {
        Ok(neighbors) => neighbors,
        Err(e) => {
            warn!(error = %e, "Failed to load BGP neighbors, skipping enrichment");
            HashMap::new()
        }
    };
    annotate(interfaces, &neighbors);
    Ok(())
}

pub fn annotate(
    interfaces: &mut [IpInterfaceDetail],
    neighbors: &HashMap<String, BgpNeighborInfo>,
) {
    if neighbors.is_empty() {
        return;
    }
    for intf in interfaces.iter_mut() {
        for addr in intf.ip_addresses.iter_mut() {
            let Some(ip) = cidr_ip(&addr.address) else {
                debug!(address = %addr.address, "Skipping unparsable CIDR");
                continue;
            };
            if let Some(info) = neighbors.get(&ip) {
                addr.bgp_neighbor_ip = info.neighbor_ip.clone();
                addr.bgp_neighbor_name = info.name.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{SnapshotDbQuery, TableData};
    use crate::types::AdminStatus;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn neighbor_db() -> SnapshotDbQuery {
        SnapshotDbQuery::from_value(json!({
            "CONFIG_DB": {
                "BGP_NEIGHBOR|10.0.0.2": { "local_addr": "192.0.2.1", "name": "peerA" },
                "BGP_NEIGHBOR|fc00::2": { "local_addr": "fc00::1", "name": 65100 },
                "BGP_NEIGHBOR|10.0.0.9": { "name": "no-local" },
                "BGP_NEIGHBOR|10.0.0.7": { "local_addr": 7, "name": "bad-local" },
                "BGP_NEIGHBOR|10.0.0.5": "not-a-map",
                "BGP_NEIGHBOR|10.0.0.4": { "local_addr": "10.0.0.3" }
            },
            "CONFIG_DB/asic0": {
                "BGP_NEIGHBOR|10.1.0.2": { "local_addr": "10.1.0.1", "name": "asic-peer" }
            }
        }))
        .unwrap()
    }

    fn interfaces() -> Vec<IpInterfaceDetail> {
        vec![
            IpInterfaceDetail::new("Ethernet0", AdminStatus::Up)
                .with_addresses(["192.0.2.1/31", "bogus", "10.1.0.1/31"]),
            IpInterfaceDetail::new("Ethernet4", AdminStatus::Up)
                .with_addresses(["fc00:0:0::1/126", "10.0.0.3/31"]),
        ]
    }

    #[test]
    fn test_get_bgp_neighbors() {
        let db = neighbor_db();
        let neighbors = get_bgp_neighbors(Some(&db)).unwrap();

        assert_eq!(neighbors.len(), 3);
        assert_eq!(
            neighbors["192.0.2.1"],
            BgpNeighborInfo {
                neighbor_ip: "10.0.0.2".to_string(),
                name: "peerA".to_string(),
            }
        );
        // Non-string names are stringified
        assert_eq!(neighbors["fc00::1"].name, "65100");
        assert_eq!(neighbors["10.0.0.3"].name, "");
        // Per-ASIC neighbor tables are not consulted
        assert!(!neighbors.contains_key("10.1.0.1"));
    }

    #[test]
    fn test_keys_without_separator_are_skipped() {
        let query = |_: &[TableSelector]| -> Result<TableData> {
            let mut rows = TableData::new();
            rows.insert("10.0.0.2".to_string(), json!({ "local_addr": "192.0.2.1" }));
            Ok(rows)
        };
        let neighbors = get_bgp_neighbors(Some(&query)).unwrap();
        assert!(neighbors.is_empty());
    }

    #[test]
    fn test_enrich_annotates_matching_addresses() {
        let db = neighbor_db();
        let mut intfs = interfaces();
        enrich_with_bgp_data(&mut intfs, Some(&db)).unwrap();

        let a = &intfs[0].ip_addresses;
        assert_eq!(a[0].bgp_neighbor_ip, "10.0.0.2");
        assert_eq!(a[0].bgp_neighbor_name, "peerA");
        assert_eq!(a[1].bgp_neighbor_ip, "");
        assert_eq!(a[2].bgp_neighbor_ip, "");

        // Non-canonical CIDR text still matches after canonicalization
        let b = &intfs[1].ip_addresses;
        assert_eq!(b[0].bgp_neighbor_ip, "fc00::2");
        assert_eq!(b[0].bgp_neighbor_name, "65100");
        assert_eq!(b[1].bgp_neighbor_ip, "10.0.0.4");
    }

    #[test]
    fn test_enrich_is_idempotent() {
        let db = neighbor_db();
        let mut once = interfaces();
        enrich_with_bgp_data(&mut once, Some(&db)).unwrap();
        let mut twice = once.clone();
        enrich_with_bgp_data(&mut twice, Some(&db)).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_enrich_without_query_leaves_interfaces_untouched() {
        let mut intfs = interfaces();
        enrich_with_bgp_data(&mut intfs, None).unwrap();
        assert_eq!(intfs, interfaces());
    }

    #[test]
    fn test_enrich_with_failing_query() {
        let query = |_: &[TableSelector]| -> Result<TableData> {
            Err(IpIntfError::Database("timeout".to_string()))
        };
        let mut intfs = interfaces();
        enrich_with_bgp_data(&mut intfs, Some(&query)).unwrap();
        assert_eq!(intfs, interfaces());
    }

    #[test]
    fn test_get_bgp_neighbors_unconfigured() {
        assert!(matches!(
            get_bgp_neighbors(None),
            Err(IpIntfError::QueryNotConfigured)
        ));
    }

    #[test]
    fn test_cidr_ip() {
        assert_eq!(cidr_ip("192.0.2.1/31").as_deref(), Some("192.0.2.1"));
        assert_eq!(cidr_ip("2001:DB8:0::1/64").as_deref(), Some("2001:db8::1"));
        assert_eq!(cidr_ip("fc00::1/128").as_deref(), Some("fc00::1"));
        assert_eq!(cidr_ip("0.0.0.0/0").as_deref(), Some("0.0.0.0"));
        assert_eq!(cidr_ip("not-an-ip/24"), None);
        assert_eq!(cidr_ip("10.0.0.1"), None);
        assert_eq!(cidr_ip("10.0.0.1/"), None);
        assert_eq!(cidr_ip("10.0.0.1/abc"), None);
        assert_eq!(cidr_ip("10.0.0.1/33"), None);
        assert_eq!(cidr_ip("10.0.0.1/+8"), None);
        assert_eq!(cidr_ip("fc00::1/129"), None);
        assert_eq!(cidr_ip("10.0.0.1/24/8"), None);
    }

    #[test]
    fn test_annotate_skips_invalid_cidr() {
        let mut neighbors = HashMap::new();
        neighbors.insert(
            "192.0.2.1".to_string(),
            BgpNeighborInfo {
                neighbor_ip: "10.0.0.2".to_string(),
                name: "peerA".to_string(),
            },
        );
        let mut intfs = vec![IpInterfaceDetail::new("Ethernet0", AdminStatus::Up)
            .with_addresses(["192.0.2.1", "192.0.2.1/abc", "192.0.2.1/99", "192.0.2.1/31"])];

        annotate(&mut intfs, &neighbors);
        let annotated: Vec<_> = intfs[0]
            .ip_addresses
            .iter()
            .map(|a| a.bgp_neighbor_ip.as_str())
            .collect();
        assert_eq!(annotated, vec!["", "", "", "10.0.0.2"]);
    }
}
