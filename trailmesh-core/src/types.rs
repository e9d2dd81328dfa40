//! Typed wrappers for node identity and link addressing.
//!
//! Node ids and link-layer addresses are both small byte blobs on the wire;
//! the newtypes keep them from being mixed up in routing and forwarding code.

use core::fmt;

use crate::constants;

/// A 16-bit logical node id.
///
/// `0x0000` addresses the gateway (whichever node holds that role) and
/// `0xFFFF` is broadcast; device ids live in `[1, 254]`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u16);

impl NodeId {
    pub const GATEWAY: NodeId = NodeId(constants::GATEWAY_ID);
    pub const BROADCAST: NodeId = NodeId(constants::BROADCAST_ID);

    pub fn is_gateway_address(self) -> bool {
        self.0 == constants::GATEWAY_ID
    }

    pub fn is_broadcast(self) -> bool {
        self.0 == constants::BROADCAST_ID
    }

    /// Whether this id is assignable to a device.
    pub fn is_device(self) -> bool {
        (constants::NODE_ID_MIN..=constants::NODE_ID_MAX).contains(&self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            constants::GATEWAY_ID => write!(f, "gateway"),
            constants::BROADCAST_ID => write!(f, "broadcast"),
            id => write!(f, "{}", id),
        }
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self)
    }
}

impl From<u16> for NodeId {
    fn from(id: u16) -> Self {
        NodeId(id)
    }
}

impl From<NodeId> for u16 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// A 6-byte link-layer address, as handed to the radio driver.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct LinkAddress(pub [u8; 6]);

impl LinkAddress {
    /// The link-layer broadcast address.
    pub const BROADCAST: LinkAddress = LinkAddress([0xFF; 6]);

    pub fn is_broadcast(self) -> bool {
        self.0 == [0xFF; 6]
    }
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkAddress({})", self)
    }
}

impl From<[u8; 6]> for LinkAddress {
    fn from(bytes: [u8; 6]) -> Self {
        LinkAddress(bytes)
    }
}

impl AsRef<[u8; 6]> for LinkAddress {
    fn as_ref(&self) -> &[u8; 6] {
        &self.0
    }
}

/// Runtime role of a node. A single binary serves either role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sensor,
    Gateway,
}

impl Role {
    pub fn to_wire(self) -> u8 {
        match self {
            Role::Sensor => constants::ROLE_SENSOR,
            Role::Gateway => constants::ROLE_GATEWAY,
        }
    }

    pub fn from_wire(val: u8) -> Option<Self> {
        match val {
            constants::ROLE_SENSOR => Some(Role::Sensor),
            constants::ROLE_GATEWAY => Some(Role::Gateway),
            _ => None,
        }
    }

    pub fn is_gateway(self) -> bool {
        matches!(self, Role::Gateway)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sensor => write!(f, "sensor"),
            Role::Gateway => write!(f, "gateway"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    extern crate alloc;
    use alloc::format;

    #[test]
    fn node_id_classes() {
        assert!(NodeId::GATEWAY.is_gateway_address());
        assert!(NodeId::BROADCAST.is_broadcast());
        assert!(NodeId(1).is_device());
        assert!(NodeId(254).is_device());
        assert!(!NodeId(0).is_device());
        assert!(!NodeId(255).is_device());
        assert!(!NodeId(0xFFFF).is_device());
    }

    #[test]
    fn node_id_display() {
        assert_eq!(format!("{}", NodeId(7)), "7");
        assert_eq!(format!("{}", NodeId::GATEWAY), "gateway");
        assert_eq!(format!("{}", NodeId::BROADCAST), "broadcast");
    }

    #[test]
    fn link_address_display() {
        let addr = LinkAddress([0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]);
        assert_eq!(format!("{}", addr), "DE:AD:BE:EF:00:01");
    }

    #[test]
    fn link_address_broadcast() {
        assert!(LinkAddress::BROADCAST.is_broadcast());
        assert!(!LinkAddress([0; 6]).is_broadcast());
    }

    #[test]
    fn role_wire_roundtrip() {
        for role in [Role::Sensor, Role::Gateway] {
            assert_eq!(Role::from_wire(role.to_wire()), Some(role));
        }
        assert!(Role::from_wire(7).is_none());
    }
}
