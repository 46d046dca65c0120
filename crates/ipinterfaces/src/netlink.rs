//! Route netlink link and address dumps
//!
//! The reader needs two request/response exchanges per namespace: a link
//! dump and a family-scoped address dump. Datagrams are framed with
//! netlink-packet-core and records decoded with netlink-packet-route; a
//! record that fails to decode is skipped instead of failing the whole dump.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SC-7: Boundary Protection - Kernel interface for network state
//! - CM-8: System Component Inventory - Enumerate links and addresses

use crate::error::{IpIntfError, Result};
use crate::types::{AddressFamily, AdminStatus, IpInterfaceDetail};
use netlink_packet_core::{
    NetlinkBuffer, NetlinkHeader, NetlinkMessage, NetlinkPayload, NLMSG_ERROR, NLM_F_DUMP,
    NLM_F_REQUEST,
};
use netlink_packet_route::address::{AddressAttribute, AddressMessage};
use netlink_packet_route::link::{LinkAttribute, LinkMessage};
use netlink_packet_route::{AddressFamily as KernelFamily, RouteNetlinkMessage};
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use tracing::{debug, trace};

/// Receive buffer per recv call; dumps span several datagrams
pub const RECV_BUFFER_SIZE: usize = 64 * 1024;

const fn align4(len: usize) -> usize {
    (len + 3) & !3
}

impl From<AddressFamily> for KernelFamily {
    fn from(family: AddressFamily) -> Self {
        match family {
            AddressFamily::Ipv4 => KernelFamily::Inet,
            AddressFamily::Ipv6 => KernelFamily::Inet6,
        }
    }
}

/// One of the two dumps issued per namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpRequest {
    Links,
    Addresses(AddressFamily),
}

impl DumpRequest {
    pub fn label(&self) -> &'static str {
        match self {
            DumpRequest::Links => "links",
            DumpRequest::Addresses(_) => "addresses",
        }
    }

    /// Empty RTM_GETLINK, or RTM_GETADDR scoped to the family
    pub fn message(&self) -> RouteNetlinkMessage {
        match self {
            DumpRequest::Links => RouteNetlinkMessage::GetLink(LinkMessage::default()),
            DumpRequest::Addresses(family) => {
                let mut msg = AddressMessage::default();
                msg.header.family = (*family).into();
                RouteNetlinkMessage::GetAddress(msg)
            }
        }
    }

    pub fn encode(&self, seq: u32) -> Vec<u8> {
        let mut header = NetlinkHeader::default();
        header.flags = NLM_F_REQUEST | NLM_F_DUMP;
        header.sequence_number = seq;

        let mut packet = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(self.message()));
        packet.finalize();

        let mut buf = vec![0u8; packet.buffer_len()];
        packet.serialize(&mut buf);
        buf
    }
}

/// Messages decoded from one datagram
#[derive(Debug, Default)]
pub struct DumpChunk {
    pub messages: Vec<RouteNetlinkMessage>,
    /// NLMSG_DONE seen
    pub done: bool,
}

/// Kernel error codes are negated errno values
fn errno_message(code: i32) -> String {
    match code.checked_neg() {
        Some(errno) => std::io::Error::from_raw_os_error(errno).to_string(),
        None => format!("netlink error code {}", code),
    }
}

/// Decode one received datagram of a dump.
///
/// Records for other sequence numbers are ignored. NLMSG_ERROR with a
/// non-zero code fails the dump.
pub fn decode_datagram(buf: &[u8], seq: u32, request: DumpRequest) -> Result<DumpChunk> {
    let mut chunk = DumpChunk::default();
    let mut offset = 0;

    while offset < buf.len() {
        let frame = match NetlinkBuffer::new_checked(&buf[offset..]) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(offset, error = %e, "Truncated netlink message, dropping rest of datagram");
                break;
            }
        };
        let len = frame.length() as usize;
        let message_type = frame.message_type();
        let message_seq = frame.sequence_number();
        let bytes = &buf[offset..offset + len];
        offset += align4(len).min(buf.len() - offset);

        if message_seq != seq {
            trace!(message_seq, seq, "Ignoring message for another request");
            continue;
        }

        let message = match NetlinkMessage::<RouteNetlinkMessage>::deserialize(bytes) {
            Ok(message) => message,
            Err(e) if message_type == NLMSG_ERROR => {
                return Err(IpIntfError::Dump {
                    request: request.label(),
                    message: format!("unreadable error message: {}", e),
                });
            }
            Err(e) => {
                debug!(message_type, error = %e, "Skipping undecodable netlink message");
                continue;
            }
        };

        match message.payload {
            NetlinkPayload::Done(_) => {
                chunk.done = true;
                break;
            }
            NetlinkPayload::Error(err) => {
                if let Some(code) = err.code {
                    return Err(IpIntfError::Dump {
                        request: request.label(),
                        message: errno_message(code.get()),
                    });
                }
            }
            NetlinkPayload::InnerMessage(inner) => chunk.messages.push(inner),
            other => trace!(?other, "Ignoring control message"),
        }
    }

    Ok(chunk)
}

/// Link fields needed for assembly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub index: u32,
    pub flags: u32,
    pub name: String,
    /// Bonding master ifindex; 0 when absent
    pub master_index: u32,
}

impl From<&LinkMessage> for LinkRecord {
    fn from(link: &LinkMessage) -> Self {
        let mut record = LinkRecord {
            index: link.header.index,
            flags: link.header.flags.bits(),
            name: String::new(),
            master_index: 0,
        };
        for attr in &link.attributes {
            match attr {
                LinkAttribute::IfName(name) => record.name = name.clone(),
                LinkAttribute::Controller(index) => record.master_index = *index,
                _ => {}
            }
        }
        record
    }
}

pub fn parse_links(messages: &[RouteNetlinkMessage]) -> Vec<LinkRecord> {
    messages
        .iter()
        .filter_map(|msg| match msg {
            RouteNetlinkMessage::NewLink(link) => Some(LinkRecord::from(link)),
            _ => None,
        })
        .collect()
}

/// CIDR strings keyed by owning ifindex, one map per family
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressMaps {
    pub ipv4: BTreeMap<u32, Vec<String>>,
    pub ipv6: BTreeMap<u32, Vec<String>>,
}

impl AddressMaps {
    pub fn for_family(&self, family: AddressFamily) -> &BTreeMap<u32, Vec<String>> {
        match family {
            AddressFamily::Ipv4 => &self.ipv4,
            AddressFamily::Ipv6 => &self.ipv6,
        }
    }
}

/// IFA_LOCAL is preferred so point-to-point links report their own end
pub fn parse_addresses(messages: &[RouteNetlinkMessage]) -> AddressMaps {
    let mut maps = AddressMaps::default();
    for msg in messages {
        let RouteNetlinkMessage::NewAddress(addr) = msg else {
            continue;
        };

        let mut local = None;
        let mut address = None;
        for attr in &addr.attributes {
            match attr {
                AddressAttribute::Local(ip) => local = Some(*ip),
                AddressAttribute::Address(ip) => address = Some(*ip),
                _ => {}
            }
        }
        let Some(ip) = local.or(address) else {
            trace!(index = addr.header.index, "Address message without address attribute");
            continue;
        };

        let map = match (&addr.header.family, ip) {
            (KernelFamily::Inet, IpAddr::V4(_)) => &mut maps.ipv4,
            (KernelFamily::Inet6, IpAddr::V6(_)) => &mut maps.ipv6,
            (family, ip) => {
                debug!(?family, %ip, "Skipping address outside its message family");
                continue;
            }
        };
        map.entry(addr.header.index)
            .or_default()
            .push(format!("{}/{}", ip, addr.header.prefix_len));
    }
    maps
}

/// Build interface records in ascending ifindex order.
///
/// Masters are resolved against the complete index table, so a slave may
/// appear in the dump before its master.
pub fn assemble_interfaces(
    links: &[LinkRecord],
    addresses: &AddressMaps,
    family: AddressFamily,
) -> Vec<IpInterfaceDetail> {
    let by_index: BTreeMap<u32, &LinkRecord> = links.iter().map(|l| (l.index, l)).collect();
    let names: HashMap<u32, &str> = by_index
        .iter()
        .map(|(index, link)| (*index, link.name.as_str()))
        .collect();
    let family_addresses = addresses.for_family(family);

    by_index
        .values()
        .map(|link| {
            let mut intf =
                IpInterfaceDetail::new(link.name.clone(), AdminStatus::from_flags(link.flags));
            if link.master_index != 0 {
                if let Some(master) = names.get(&link.master_index) {
                    intf.master = master.to_string();
                }
            }
            if let Some(cidrs) = family_addresses.get(&link.index) {
                intf = intf.with_addresses(cidrs.iter().cloned());
            }
            intf
        })
        .collect()
}

/// A dump-capable route socket
pub trait RouteDumper {
    fn dump(&mut self, request: DumpRequest) -> Result<Vec<RouteNetlinkMessage>>;
}

/// Opens route sockets in the calling thread's current namespace
pub trait RouteDialer: Send + Sync {
    type Conn: RouteDumper;

    fn dial(&self) -> Result<Self::Conn>;
}

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};
    use tracing::instrument;

    /// Dials NETLINK_ROUTE sockets
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NetlinkRouteDialer;

    impl RouteDialer for NetlinkRouteDialer {
        type Conn = NetlinkRouteConn;

        fn dial(&self) -> Result<NetlinkRouteConn> {
            let mut socket = Socket::new(NETLINK_ROUTE)
                .map_err(|e| IpIntfError::Netlink(format!("Failed to create socket: {}", e)))?;
            socket
                .bind(&SocketAddr::new(0, 0))
                .map_err(|e| IpIntfError::Netlink(format!("Failed to bind socket: {}", e)))?;
            Ok(NetlinkRouteConn { socket, seq: 0 })
        }
    }

    pub struct NetlinkRouteConn {
        socket: Socket,
        seq: u32,
    }

    impl RouteDumper for NetlinkRouteConn {
        #[instrument(skip(self))]
        fn dump(&mut self, request: DumpRequest) -> Result<Vec<RouteNetlinkMessage>> {
            self.seq = self.seq.wrapping_add(1);
            let seq = self.seq;

            self.socket
                .send(&request.encode(seq), 0)
                .map_err(|e| IpIntfError::Dump {
                    request: request.label(),
                    message: format!("send failed: {}", e),
                })?;

            let mut messages = Vec::new();
            loop {
                let mut buf = Vec::with_capacity(RECV_BUFFER_SIZE);
                self.socket
                    .recv(&mut buf, 0)
                    .map_err(|e| IpIntfError::Dump {
                        request: request.label(),
                        message: format!("recv failed: {}", e),
                    })?;

                let chunk = decode_datagram(&buf[..], seq, request)?;
                messages.extend(chunk.messages);
                if chunk.done {
                    break;
                }
            }

            debug!(request = request.label(), count = messages.len(), "Dump complete");
            Ok(messages)
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux::*;

/// Stub transport for non-Linux platforms (development only)
#[cfg(not(target_os = "linux"))]
mod mock {
    use super::*;

    #[derive(Debug, Clone, Copy, Default)]
    pub struct NetlinkRouteDialer;

    pub struct NetlinkRouteConn;

    impl RouteDialer for NetlinkRouteDialer {
        type Conn = NetlinkRouteConn;

        fn dial(&self) -> Result<NetlinkRouteConn> {
            Err(IpIntfError::Netlink(
                "route netlink unsupported on this platform".to_string(),
            ))
        }
    }

    impl RouteDumper for NetlinkRouteConn {
        fn dump(&mut self, request: DumpRequest) -> Result<Vec<RouteNetlinkMessage>> {
            Err(IpIntfError::Dump {
                request: request.label(),
                message: "unsupported platform".to_string(),
            })
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub use mock::*;

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use netlink_packet_route::link::LinkFlags;
    use std::net::Ipv6Addr;
    use std::sync::{Arc, Mutex};

    pub fn link_message(
        index: u32,
        flags: u32,
        name: &str,
        master: Option<u32>,
    ) -> RouteNetlinkMessage {
        let mut link = LinkMessage::default();
        link.header.index = index;
        link.header.flags = LinkFlags::from_bits_retain(flags);
        link.attributes.push(LinkAttribute::IfName(name.to_string()));
        if let Some(master) = master {
            link.attributes.push(LinkAttribute::Controller(master));
        }
        RouteNetlinkMessage::NewLink(link)
    }

    pub fn address_message(
        family: KernelFamily,
        prefix_len: u8,
        index: u32,
        attributes: Vec<AddressAttribute>,
    ) -> RouteNetlinkMessage {
        let mut addr = AddressMessage::default();
        addr.header.family = family;
        addr.header.prefix_len = prefix_len;
        addr.header.index = index;
        addr.attributes = attributes;
        RouteNetlinkMessage::NewAddress(addr)
    }

    pub fn ipv4_address(index: u32, addr: [u8; 4], prefix_len: u8) -> RouteNetlinkMessage {
        address_message(
            KernelFamily::Inet,
            prefix_len,
            index,
            vec![AddressAttribute::Local(IpAddr::from(addr))],
        )
    }

    pub fn ipv6_address(index: u32, addr: Ipv6Addr, prefix_len: u8) -> RouteNetlinkMessage {
        address_message(
            KernelFamily::Inet6,
            prefix_len,
            index,
            vec![AddressAttribute::Address(IpAddr::V6(addr))],
        )
    }

    /// Serializes records as the kernel would answer a dump
    pub fn datagram(seq: u32, messages: &[RouteNetlinkMessage]) -> Vec<u8> {
        let mut buf = Vec::new();
        for msg in messages {
            let mut header = NetlinkHeader::default();
            header.sequence_number = seq;
            let mut packet =
                NetlinkMessage::new(header, NetlinkPayload::InnerMessage(msg.clone()));
            packet.finalize();

            let start = buf.len();
            buf.resize(start + packet.buffer_len(), 0);
            packet.serialize(&mut buf[start..]);
            buf.resize(align4(buf.len()), 0);
        }
        buf
    }

    /// Raw nlmsghdr plus payload, for control and malformed records
    pub fn frame(message_type: u16, seq: u32, payload: &[u8]) -> Vec<u8> {
        let len = 16 + payload.len();
        let mut buf = Vec::with_capacity(align4(len));
        buf.extend_from_slice(&(len as u32).to_ne_bytes());
        buf.extend_from_slice(&message_type.to_ne_bytes());
        buf.extend_from_slice(&0u16.to_ne_bytes());
        buf.extend_from_slice(&seq.to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes());
        buf.extend_from_slice(payload);
        buf.resize(align4(len), 0);
        buf
    }

    /// Canned dump responses per namespace-independent dialer
    #[derive(Clone, Default)]
    pub struct FakeDialer {
        pub links: Vec<RouteNetlinkMessage>,
        pub addresses: Vec<RouteNetlinkMessage>,
        pub fail_dial: bool,
        pub fail_addresses: bool,
        pub requests: Arc<Mutex<Vec<DumpRequest>>>,
    }

    pub struct FakeConn {
        dialer: FakeDialer,
    }

    impl RouteDialer for FakeDialer {
        type Conn = FakeConn;

        fn dial(&self) -> Result<FakeConn> {
            if self.fail_dial {
                return Err(IpIntfError::Netlink("Failed to create socket".to_string()));
            }
            Ok(FakeConn {
                dialer: self.clone(),
            })
        }
    }

    impl RouteDumper for FakeConn {
        fn dump(&mut self, request: DumpRequest) -> Result<Vec<RouteNetlinkMessage>> {
            self.dialer.requests.lock().unwrap().push(request);
            match request {
                DumpRequest::Links => Ok(self.dialer.links.clone()),
                DumpRequest::Addresses(_) if self.dialer.fail_addresses => {
                    Err(IpIntfError::Dump {
                        request: request.label(),
                        message: "Operation not permitted".to_string(),
                    })
                }
                DumpRequest::Addresses(_) => Ok(self.dialer.addresses.clone()),
            }
        }
    }
}
