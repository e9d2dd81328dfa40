//! Host callback trait for substrate events.
//!
//! Every method is invoked synchronously on the main loop; defaults are
//! no-ops so a host only overrides what it consumes. A gateway typically
//! forwards `on_message` motion alerts and `on_image_received` buffers to
//! the phone uplink.

use trailmesh_core::frame::Frame;
use trailmesh_core::routing::RouteEntry;
use trailmesh_core::types::NodeId;

pub trait Callbacks: Send {
    /// A decoded application frame addressed to this node.
    fn on_message(&mut self, _frame: &Frame) {}

    /// A node id entered the routing table (first sighting, or first after
    /// its previous entry was pruned).
    fn on_node_discovered(&mut self, _node: &RouteEntry) {}

    /// A routing entry aged out.
    fn on_node_lost(&mut self, _node: &RouteEntry) {}

    /// A fully reassembled image arrived at this sink.
    fn on_image_received(&mut self, _source: NodeId, _image_id: u16, _data: &[u8]) {}

    /// An inbound image transfer ended incomplete.
    fn on_image_failed(&mut self, _source: NodeId, _image_id: u16, _received: u16, _expected: u16) {}
}
