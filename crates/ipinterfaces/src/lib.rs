//! Namespace-aware IP interface discovery for SONiC
//!
//! Backs the `show ip interfaces` / `show ipv6 interfaces` commands. On a
//! multi-ASIC device every ASIC runs in its own network namespace, so the
//! interface list is built by visiting each relevant namespace, dumping its
//! links and addresses over route netlink, and merging the results by
//! interface name.
//!
//! # Architecture
//!
//! ```text
//! IpInterfaces::get_ip_interfaces(family, namespace, display)
//!   │
//!   ├── NamespaceInventory      asic.conf + DEVICE_METADATA sub_role
//!   │
//!   ├── InterfaceSource         once per selected namespace
//!   │     └── NetnsGuard        setns in, restore on drop
//!   │           └── RouteDumper RTM_GETLINK, RTM_GETADDR
//!   │
//!   └── enrich_with_bgp_data    CONFIG_DB BGP_NEIGHBOR local_addr match
//! ```
//!
//! Database access goes through the [`DbQuery`] trait supplied by the
//! caller; nothing here holds a global client.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - CM-8: System Component Inventory - Per-namespace interface inventory
//! - SC-7: Boundary Protection - Namespace isolation is restored after each read
//! - AU-12: Audit Record Generation - Structured logging of skipped namespaces

pub mod bgp_neighbors;
pub mod config;
pub mod db;
pub mod error;
pub mod interface;
pub mod multi_asic;
pub mod netlink;
pub mod netns;
pub mod show;
pub mod source;
pub mod types;

pub use bgp_neighbors::{enrich_with_bgp_data, get_bgp_neighbors, BgpNeighborInfo};
pub use config::PlatformPaths;
pub use db::{DbQuery, SnapshotDbQuery, TableData, TableSelector};
pub use error::{IpIntfError, Result};
pub use interface::IpInterfaces;
pub use multi_asic::NamespaceInventory;
pub use netlink::{DumpRequest, RouteDialer, RouteDumper};
pub use netlink_packet_route::RouteNetlinkMessage;
pub use netns::{NetnsGuard, NetnsOps, SystemNetns};
pub use show::{ip_interfaces_json, ShowOptions};
pub use source::{InterfaceSource, NetlinkInterfaceSource};
pub use types::{
    AddressFamily, AdminStatus, DisplayScope, IpAddressDetail, IpInterfaceDetail,
    NamespacesByRole, DEFAULT_NAMESPACE,
};
