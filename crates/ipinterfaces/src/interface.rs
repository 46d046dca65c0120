//! Multi-namespace IP interface aggregation
//!
//! Selects the namespaces to visit, reads each one through an
//! [`InterfaceSource`], merges interfaces by name and finally annotates
//! addresses with BGP neighbor data.
//!
//! # Namespace selection
//! - Single ASIC: always the default namespace; any other explicit
//!   namespace is rejected.
//! - Multi ASIC: an explicit namespace must belong to some role and is used
//!   alone; otherwise frontend (display "frontend") or frontend, backend and
//!   fabric (display "all"). The default namespace is then appended if
//!   missing.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-4: System Monitoring - Operator view of interface state
//! - SC-7: Boundary Protection - Namespace work runs on a dedicated thread

use crate::bgp_neighbors::enrich_with_bgp_data;
use crate::config::PlatformPaths;
use crate::db::DbQuery;
use crate::error::{IpIntfError, Result};
use crate::multi_asic::NamespaceInventory;
use crate::source::{InterfaceSource, NetlinkInterfaceSource};
use crate::types::{AddressFamily, DisplayScope, IpInterfaceDetail, DEFAULT_NAMESPACE};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

/// Name of the OS thread that performs namespace switches
pub const RESOLVER_THREAD_NAME: &str = "ipintf-resolver";

/// Entry point for IP interface queries
#[derive(Clone)]
pub struct IpInterfaces {
    inventory: NamespaceInventory,
    source: Arc<dyn InterfaceSource>,
    db: Option<Arc<dyn DbQuery>>,
}

impl IpInterfaces {
    pub fn new(
        inventory: NamespaceInventory,
        source: Arc<dyn InterfaceSource>,
        db: Option<Arc<dyn DbQuery>>,
    ) -> Self {
        Self {
            inventory,
            source,
            db,
        }
    }

    /// Real namespaces and netlink, with `db` shared by inventory and enrichment
    pub fn system(paths: PlatformPaths, db: Option<Arc<dyn DbQuery>>) -> Self {
        let inventory = NamespaceInventory::new(paths.clone(), db.clone());
        let source = Arc::new(NetlinkInterfaceSource::system(paths));
        Self::new(inventory, source, db)
    }

    pub fn inventory(&self) -> &NamespaceInventory {
        &self.inventory
    }

    /// Namespaces to visit, in visiting order
    pub fn select_namespaces(
        &self,
        namespace: Option<&str>,
        scope: DisplayScope,
    ) -> Result<Vec<String>> {
        if !self.inventory.is_multi_asic()? {
            return match namespace {
                Some(ns) if ns != DEFAULT_NAMESPACE => {
                    Err(IpIntfError::UnknownNamespace(ns.to_string()))
                }
                _ => Ok(vec![DEFAULT_NAMESPACE.to_string()]),
            };
        }

        let roles = self.inventory.all_namespaces()?;
        let mut selected = match namespace {
            Some(ns) => {
                if !roles.contains(ns) {
                    return Err(IpIntfError::UnknownNamespace(ns.to_string()));
                }
                vec![ns.to_string()]
            }
            None => roles.for_scope(scope),
        };

        // Host interfaces are visible on every multi-ASIC query
        if !selected.iter().any(|ns| ns == DEFAULT_NAMESPACE) {
            selected.push(DEFAULT_NAMESPACE.to_string());
        }
        Ok(selected)
    }

    /// Interfaces of one family across the selected namespaces.
    ///
    /// `display_option` defaults to "all". Only invalid input and ASIC
    /// discovery failures are returned as errors; a namespace that cannot be
    /// read is skipped.
    #[instrument(skip(self))]
    pub fn get_ip_interfaces(
        &self,
        family: &str,
        namespace: Option<&str>,
        display_option: Option<&str>,
    ) -> Result<Vec<IpInterfaceDetail>> {
        let family: AddressFamily = family.parse()?;
        let scope = DisplayScope::from_option(display_option);
        let namespaces = self.select_namespaces(namespace, scope)?;

        info!(
            ?namespaces,
            family = %family,
            display = scope.as_str(),
            "Fetching interfaces"
        );

        let mut merged = InterfaceMerge::default();
        for ns in &namespaces {
            match self.source.interfaces_in_namespace(ns, family) {
                Ok(interfaces) => {
                    debug!(namespace = %ns, count = interfaces.len(), "Fetched interfaces");
                    merged.extend(interfaces);
                }
                Err(e) => {
                    warn!(namespace = %ns, error = %e, "Could not get interfaces for namespace");
                }
            }
        }

        let mut interfaces = merged.into_vec();
        info!(count = interfaces.len(), "Aggregated interfaces across namespaces");

        if let Err(e) = enrich_with_bgp_data(&mut interfaces, self.db.as_deref()) {
            warn!(error = %e, "Failed to enrich with BGP data");
        }
        Ok(interfaces)
    }

    /// [`get_ip_interfaces`](Self::get_ip_interfaces) on a dedicated OS
    /// thread, bounded by `timeout`.
    ///
    /// Every namespace switch happens on that thread, which exits when the
    /// call finishes, so a failed restore never leaks into a pooled runtime
    /// thread. On timeout the thread still runs to completion.
    pub async fn get_ip_interfaces_async(
        self: Arc<Self>,
        family: String,
        namespace: Option<String>,
        display_option: Option<String>,
        timeout: Duration,
    ) -> Result<Vec<IpInterfaceDetail>> {
        let (tx, rx) = oneshot::channel();
        thread::Builder::new()
            .name(RESOLVER_THREAD_NAME.to_string())
            .spawn(move || {
                let result = self.get_ip_interfaces(
                    &family,
                    namespace.as_deref(),
                    display_option.as_deref(),
                );
                // Receiver is gone once the caller timed out
                if tx.send(result).is_err() {
                    debug!("Interface resolution finished after the caller gave up");
                }
            })
            .map_err(|e| {
                IpIntfError::TaskJoin(format!("failed to spawn resolver thread: {}", e))
            })?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(IpIntfError::TaskJoin(
                "resolver thread exited without a result".to_string(),
            )),
            Err(_) => Err(IpIntfError::Timeout(timeout)),
        }
    }
}

impl std::fmt::Debug for IpInterfaces {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpInterfaces")
            .field("inventory", &self.inventory)
            .field("db_configured", &self.db.is_some())
            .finish()
    }
}

/// Name-keyed merge that keeps first-seen order
#[derive(Debug, Default)]
struct InterfaceMerge {
    interfaces: Vec<IpInterfaceDetail>,
    index: HashMap<String, usize>,
}

impl InterfaceMerge {
    /// First occurrence of a name wins for scalar fields; later ones only
    /// contribute addresses not already present.
    fn extend(&mut self, interfaces: Vec<IpInterfaceDetail>) {
        for intf in interfaces {
            match self.index.get(&intf.name) {
                Some(&i) => self.interfaces[i].merge_addresses(&intf),
                None => {
                    self.index.insert(intf.name.clone(), self.interfaces.len());
                    self.interfaces.push(intf);
                }
            }
        }
    }

    fn into_vec(self) -> Vec<IpInterfaceDetail> {
        self.interfaces
    }
}
