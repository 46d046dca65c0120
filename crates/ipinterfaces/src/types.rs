//! Core types for IP interface discovery

use crate::error::{IpIntfError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default (host) network namespace identifier
pub const DEFAULT_NAMESPACE: &str = "";

/// Per-ASIC namespaces are named `asic<N>`
pub const ASIC_NAME_PREFIX: &str = "asic";

/// Conventional namespace name for ASIC `index`
pub fn asic_namespace(index: usize) -> String {
    format!("{}{}", ASIC_NAME_PREFIX, index)
}

/// Address family requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressFamily::Ipv4 => "ipv4",
            AddressFamily::Ipv6 => "ipv6",
        }
    }
}

impl FromStr for AddressFamily {
    type Err = IpIntfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ipv4" => Ok(AddressFamily::Ipv4),
            "ipv6" => Ok(AddressFamily::Ipv6),
            other => Err(IpIntfError::UnsupportedAddressFamily(other.to_string())),
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which namespace roles a multi-ASIC query covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayScope {
    /// Frontend, backend and fabric namespaces
    #[default]
    All,
    /// Frontend namespaces only
    Frontend,
}

impl DisplayScope {
    pub const ALL: &'static str = "all";
    pub const FRONTEND: &'static str = "frontend";

    /// Anything other than "all" narrows the scope to frontend namespaces.
    pub fn from_option(display: Option<&str>) -> Self {
        match display {
            None | Some(Self::ALL) => DisplayScope::All,
            Some(_) => DisplayScope::Frontend,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayScope::All => Self::ALL,
            DisplayScope::Frontend => Self::FRONTEND,
        }
    }
}

/// Interface administrative status derived from the link flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminStatus {
    Up,
    #[default]
    Down,
}

impl AdminStatus {
    /// IFF_UP from linux/if.h
    pub const IFF_UP: u32 = 0x1;

    pub fn from_flags(flags: u32) -> Self {
        if flags & Self::IFF_UP != 0 {
            AdminStatus::Up
        } else {
            AdminStatus::Down
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdminStatus::Up => "up",
            AdminStatus::Down => "down",
        }
    }
}

impl fmt::Display for AdminStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational status placeholder; the link and address dumps do not carry it
pub const OPER_STATUS_UNKNOWN: &str = "n/a";

/// One address on an interface, with optional BGP peering annotation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IpAddressDetail {
    /// CIDR text, e.g. "192.0.2.1/31"
    pub address: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bgp_neighbor_ip: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bgp_neighbor_name: String,
}

impl IpAddressDetail {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }
}

/// Consolidated view of one interface across all visited namespaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpInterfaceDetail {
    pub name: String,
    pub ip_addresses: Vec<IpAddressDetail>,
    pub admin_status: AdminStatus,
    pub oper_status: String,
    /// Bonding master name, empty if none
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub master: String,
}

impl IpInterfaceDetail {
    pub fn new(name: impl Into<String>, admin_status: AdminStatus) -> Self {
        Self {
            name: name.into(),
            ip_addresses: Vec::new(),
            admin_status,
            oper_status: OPER_STATUS_UNKNOWN.to_string(),
            master: String::new(),
        }
    }

    pub fn with_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ip_addresses
            .extend(addresses.into_iter().map(IpAddressDetail::new));
        self
    }

    pub fn has_address(&self, address: &str) -> bool {
        self.ip_addresses.iter().any(|a| a.address == address)
    }

    /// Appends addresses not already present, preserving discovery order.
    pub fn merge_addresses(&mut self, other: &IpInterfaceDetail) {
        for addr in &other.ip_addresses {
            if !self.has_address(&addr.address) {
                self.ip_addresses.push(addr.clone());
            }
        }
    }
}

/// Namespaces grouped by DEVICE_METADATA `sub_role`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamespacesByRole {
    pub frontend: Vec<String>,
    pub backend: Vec<String>,
    pub fabric: Vec<String>,
}

impl NamespacesByRole {
    /// Single-ASIC layout: only the default namespace, as frontend
    pub fn single_asic() -> Self {
        Self {
            frontend: vec![DEFAULT_NAMESPACE.to_string()],
            ..Default::default()
        }
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.iter_all().any(|ns| ns == namespace)
    }

    /// Frontend, then backend, then fabric
    pub fn iter_all(&self) -> impl Iterator<Item = &String> {
        self.frontend
            .iter()
            .chain(self.backend.iter())
            .chain(self.fabric.iter())
    }

    /// Namespaces covered by `scope`, in role concatenation order
    pub fn for_scope(&self, scope: DisplayScope) -> Vec<String> {
        match scope {
            DisplayScope::All => self.iter_all().cloned().collect(),
            DisplayScope::Frontend => self.frontend.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_family_parse() {
        assert_eq!("ipv4".parse::<AddressFamily>().unwrap(), AddressFamily::Ipv4);
        assert_eq!("ipv6".parse::<AddressFamily>().unwrap(), AddressFamily::Ipv6);
        assert!("ipv5".parse::<AddressFamily>().is_err());
        assert!("IPv4".parse::<AddressFamily>().is_err());
        assert!("".parse::<AddressFamily>().is_err());
    }

    #[test]
    fn test_display_scope_from_option() {
        assert_eq!(DisplayScope::from_option(None), DisplayScope::All);
        assert_eq!(DisplayScope::from_option(Some("all")), DisplayScope::All);
        assert_eq!(
            DisplayScope::from_option(Some("frontend")),
            DisplayScope::Frontend
        );
        assert_eq!(DisplayScope::from_option(Some("bogus")), DisplayScope::Frontend);
    }

    #[test]
    fn test_admin_status_from_flags() {
        assert_eq!(AdminStatus::from_flags(0x1), AdminStatus::Up);
        assert_eq!(AdminStatus::from_flags(0x1043), AdminStatus::Up);
        assert_eq!(AdminStatus::from_flags(0), AdminStatus::Down);
        assert_eq!(AdminStatus::from_flags(0x1000), AdminStatus::Down);
    }

    #[test]
    fn test_merge_addresses_dedups() {
        let mut a = IpInterfaceDetail::new("Ethernet0", AdminStatus::Up)
            .with_addresses(["192.0.2.1/31"]);
        let b = IpInterfaceDetail::new("Ethernet0", AdminStatus::Down)
            .with_addresses(["192.0.2.1/31", "2001:db8::1/64"]);
        a.merge_addresses(&b);

        assert_eq!(a.ip_addresses.len(), 2);
        assert_eq!(a.ip_addresses[1].address, "2001:db8::1/64");
        assert_eq!(a.admin_status, AdminStatus::Up);
    }

    #[test]
    fn test_interface_json_field_names() {
        let mut intf = IpInterfaceDetail::new("Ethernet0", AdminStatus::Up)
            .with_addresses(["192.0.2.1/31"]);
        intf.ip_addresses[0].bgp_neighbor_ip = "10.0.0.2".to_string();
        intf.ip_addresses[0].bgp_neighbor_name = "peerA".to_string();

        let value = serde_json::to_value(&intf).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "name": "Ethernet0",
                "ip_addresses": [{
                    "address": "192.0.2.1/31",
                    "bgp_neighbor_ip": "10.0.0.2",
                    "bgp_neighbor_name": "peerA"
                }],
                "admin_status": "up",
                "oper_status": "n/a"
            })
        );
    }

    #[test]
    fn test_interface_json_includes_master_when_set() {
        let mut intf = IpInterfaceDetail::new("Ethernet4", AdminStatus::Down);
        intf.master = "PortChannel1".to_string();

        let value = serde_json::to_value(&intf).unwrap();
        assert_eq!(value["master"], "PortChannel1");
        assert_eq!(value["admin_status"], "down");
        assert_eq!(value["ip_addresses"], serde_json::json!([]));
    }

    #[test]
    fn test_namespaces_by_role() {
        let roles = NamespacesByRole {
            frontend: vec!["asic0".into(), "asic1".into()],
            backend: vec!["asic2".into()],
            fabric: vec!["asic3".into()],
        };
        assert!(roles.contains("asic2"));
        assert!(roles.contains("asic3"));
        assert!(!roles.contains("asic4"));
        assert!(!roles.contains(DEFAULT_NAMESPACE));
        assert_eq!(
            roles.for_scope(DisplayScope::All),
            vec!["asic0", "asic1", "asic2", "asic3"]
        );
        assert_eq!(roles.for_scope(DisplayScope::Frontend), vec!["asic0", "asic1"]);
    }

    #[test]
    fn test_single_asic_roles() {
        let roles = NamespacesByRole::single_asic();
        assert_eq!(roles.frontend, vec![DEFAULT_NAMESPACE.to_string()]);
        assert!(roles.backend.is_empty());
        assert!(roles.fabric.is_empty());
        assert_eq!(asic_namespace(3), "asic3");
    }
}
