//! The traffic pattern whose reachability is being evaluated

use super::model::{Direction, Protocol};
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::IpAddr;

/// Well-known Remote Desktop port
pub const RDP_PORT: u16 = 3389;

/// An address on one side of the queried flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Any address; only rules that admit every address match
    Any,
    Ip(IpAddr),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Any => write!(f, "*"),
            Endpoint::Ip(ip) => write!(f, "{}", ip),
        }
    }
}

impl Serialize for Endpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A port on one side of the queried flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortQuery {
    /// Any port (client ephemeral ports are not known in advance)
    Any,
    Port(u16),
}

impl fmt::Display for PortQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortQuery::Any => write!(f, "*"),
            PortQuery::Port(p) => write!(f, "{}", p),
        }
    }
}

impl Serialize for PortQuery {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Description of the flow being tested against the rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrafficDescriptor {
    pub protocol: Protocol,
    pub direction: Direction,
    pub source: Endpoint,
    pub source_port: PortQuery,
    pub destination: Endpoint,
    pub destination_port: u16,
}

impl TrafficDescriptor {
    /// Inbound RDP from anywhere: the general reachability question
    pub fn rdp() -> Self {
        Self::inbound_tcp(RDP_PORT)
    }

    /// Inbound TCP from any source to any address on `port`
    pub fn inbound_tcp(port: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            direction: Direction::Inbound,
            source: Endpoint::Any,
            source_port: PortQuery::Any,
            destination: Endpoint::Any,
            destination_port: port,
        }
    }

    /// Narrow the query to a single client address
    pub fn from_source(mut self, ip: IpAddr) -> Self {
        self.source = Endpoint::Ip(ip);
        self
    }
}

impl Default for TrafficDescriptor {
    fn default() -> Self {
        Self::rdp()
    }
}

impl fmt::Display for TrafficDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}:{} -> {}:{}",
            self.direction,
            self.protocol,
            self.source,
            self.source_port,
            self.destination,
            self.destination_port
        )
    }
}
