//! Per-namespace interface reader

use crate::config::PlatformPaths;
use crate::error::Result;
use crate::netlink::{
    assemble_interfaces, parse_addresses, parse_links, DumpRequest, NetlinkRouteDialer,
    RouteDialer, RouteDumper,
};
use crate::netns::{NetnsGuard, NetnsOps, SystemNetns};
use crate::types::{AddressFamily, IpInterfaceDetail};
use tracing::{debug, error, instrument};

/// Interfaces and addresses of one namespace for one family
pub trait InterfaceSource: Send + Sync {
    fn interfaces_in_namespace(
        &self,
        namespace: &str,
        family: AddressFamily,
    ) -> Result<Vec<IpInterfaceDetail>>;
}

/// Reads interfaces by switching into the namespace and dumping over netlink
///
/// The whole switch, dump and restore sequence runs on the calling thread.
#[derive(Debug, Clone)]
pub struct NetlinkInterfaceSource<N = SystemNetns, D = NetlinkRouteDialer> {
    paths: PlatformPaths,
    netns: N,
    dialer: D,
}

impl NetlinkInterfaceSource {
    /// System namespaces and a real route socket
    pub fn system(paths: PlatformPaths) -> Self {
        Self::new(paths, SystemNetns, NetlinkRouteDialer)
    }
}

impl<N: NetnsOps, D: RouteDialer> NetlinkInterfaceSource<N, D> {
    pub fn new(paths: PlatformPaths, netns: N, dialer: D) -> Self {
        Self {
            paths,
            netns,
            dialer,
        }
    }

    pub fn paths(&self) -> &PlatformPaths {
        &self.paths
    }

    fn dump_namespace(&self, family: AddressFamily) -> Result<Vec<IpInterfaceDetail>> {
        let mut conn = self.dialer.dial()?;
        let link_messages = conn.dump(DumpRequest::Links)?;
        let addr_messages = conn.dump(DumpRequest::Addresses(family))?;

        let links = parse_links(&link_messages);
        let addresses = parse_addresses(&addr_messages);
        debug!(
            links = links.len(),
            addresses = addresses.for_family(family).values().map(Vec::len).sum::<usize>(),
            "Parsed namespace dumps"
        );
        Ok(assemble_interfaces(&links, &addresses, family))
    }
}

impl<N: NetnsOps, D: RouteDialer> InterfaceSource for NetlinkInterfaceSource<N, D> {
    #[instrument(skip(self))]
    fn interfaces_in_namespace(
        &self,
        namespace: &str,
        family: AddressFamily,
    ) -> Result<Vec<IpInterfaceDetail>> {
        let guard = NetnsGuard::enter(&self.netns, &self.paths, namespace)?;
        let result = self.dump_namespace(family);
        // Restore before reporting, so a stuck thread surfaces as an error
        match (result, guard.restore()) {
            (Ok(interfaces), Ok(())) => Ok(interfaces),
            (Ok(_), Err(e)) | (Err(e), Ok(())) => Err(e),
            (Err(e), Err(restore_err)) => {
                error!(
                    namespace = %namespace,
                    error = %restore_err,
                    "Failed to restore original namespace after failed dump"
                );
                Err(e)
            }
        }
    }
}
