use alloc::vec::Vec;

use crate::constants::*;
use crate::dedup::SeenRing;
use crate::frame::{Frame, MessageType};
use crate::payload::HeartbeatPayload;
use crate::routing::{RouteEntry, RoutingTable};
use crate::types::{LinkAddress, NodeId, Role};

/// Actions produced by the engine for the caller to execute.
///
/// The engine performs no I/O: sends go to the radio, deliveries to the host
/// handlers, both at the caller's discretion.
#[derive(Debug, Clone)]
pub enum MeshAction {
    /// Transmit a frame to a specific link address.
    Unicast { addr: LinkAddress, frame: Frame },
    /// Transmit a frame to the link broadcast address.
    Broadcast { frame: Frame },
    /// Hand a frame addressed to this node up to the host.
    Deliver { frame: Frame },
    /// A node id entered the routing table for the first time since boot or
    /// since its entry was pruned.
    NodeDiscovered { node: RouteEntry },
    /// An acknowledgement for a locally originated frame arrived.
    AckMatched { from: NodeId, sequence: u16 },
}

/// Ingress and forwarding counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub frames_received: u32,
    pub frames_delivered: u32,
    pub frames_relayed: u32,
    pub decode_errors: u32,
    pub duplicates_dropped: u32,
    pub unknown_dropped: u32,
}

/// Per-node forwarding engine: ingress classification, relay toward the
/// gateway with path annotation, ack emission, and sequence allocation.
pub struct MeshEngine {
    node_id: NodeId,
    role: Role,
    routing: RoutingTable,
    seen: SeenRing,
    sequence: u16,
    battery_level: u8,
    started_ms: u64,
    stats: EngineStats,
}

impl MeshEngine {
    pub fn new(node_id: NodeId, role: Role, max_nodes: usize, started_ms: u64) -> Self {
        MeshEngine {
            node_id,
            role,
            routing: RoutingTable::new(node_id, max_nodes),
            seen: SeenRing::new(SEEN_RING_SIZE),
            sequence: 0,
            battery_level: 100,
            started_ms,
            stats: EngineStats::default(),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Battery percentage advertised in heartbeats and status responses.
    pub fn set_battery_level(&mut self, percent: u8) {
        self.battery_level = percent.min(100);
    }

    pub fn battery_level(&self) -> u8 {
        self.battery_level
    }

    /// Allocate the next 16-bit sequence number (wrap permitted).
    pub fn next_sequence(&mut self) -> u16 {
        self.sequence = self.sequence.wrapping_add(1);
        self.sequence
    }

    // =========================================================================
    // Routing queries
    // =========================================================================

    pub fn gateway_route(&self) -> Option<&RouteEntry> {
        self.routing.best_gateway_route()
    }

    pub fn lookup(&self, node_id: NodeId) -> Option<&RouteEntry> {
        self.routing.lookup(node_id)
    }

    /// Resolve the link target for a unicast destination.
    pub fn resolve_unicast(&self, dest: NodeId) -> Option<&RouteEntry> {
        if dest.is_gateway_address() {
            self.routing.best_gateway_route()
        } else {
            self.routing.lookup(dest)
        }
    }

    pub fn snapshot(&self) -> &[RouteEntry] {
        self.routing.snapshot()
    }

    pub fn node_count(&self) -> usize {
        self.routing.len()
    }

    /// This node's advertised distance to the gateway.
    pub fn own_hop_count(&self) -> u8 {
        if self.role.is_gateway() {
            return 0;
        }
        match self.routing.best_gateway_route() {
            Some(route) => route.hop_count.saturating_add(1).min(HOP_COUNT_UNREACHABLE),
            None => HOP_COUNT_UNREACHABLE,
        }
    }

    /// Signal indicator for the current gateway route, `0` without one.
    pub fn gateway_rssi(&self) -> i8 {
        self.routing.best_gateway_route().map(|r| r.rssi).unwrap_or(0)
    }

    /// Drop routes not refreshed within `timeout_ms`; returns the lost peers.
    pub fn prune_routes(&mut self, now_ms: u64, timeout_ms: u64) -> Vec<RouteEntry> {
        self.routing.prune(now_ms, timeout_ms)
    }

    // =========================================================================
    // Outbound frame builders
    // =========================================================================

    fn uptime_s(&self, now_ms: u64) -> u32 {
        (now_ms.saturating_sub(self.started_ms) / 1000) as u32
    }

    /// Beacon advertising this node's role, battery, and gateway distance.
    pub fn heartbeat_frame(&mut self, now_ms: u64) -> Frame {
        let sequence = self.next_sequence();
        Frame::heartbeat(
            self.node_id,
            self.role,
            self.gateway_rssi(),
            self.battery_level,
            self.own_hop_count(),
            self.uptime_s(now_ms),
            sequence,
        )
    }

    /// Status report for a STATUS_REQUEST; caller supplies its own counters.
    pub fn status_frame(
        &mut self,
        dest: NodeId,
        motion_count: u32,
        images_sent: u32,
        now_ms: u64,
    ) -> Frame {
        let sequence = self.next_sequence();
        let mut frame = Frame::new(self.node_id, dest, MessageType::StatusResponse, sequence);
        let payload = crate::payload::StatusPayload {
            node_id: self.node_id.0 as u8,
            role: self.role.to_wire(),
            rssi: self.gateway_rssi(),
            battery: self.battery_level,
            uptime_s: self.uptime_s(now_ms),
            motion_count,
            images_sent,
            mesh_nodes: self.routing.len() as u8,
        };
        let _ = frame.set_payload(payload.pack());
        frame
    }

    // =========================================================================
    // Ingress
    // =========================================================================

    /// Process one received datagram and return the actions it implies.
    pub fn handle_frame(
        &mut self,
        sender: &LinkAddress,
        raw: &[u8],
        now_ms: u64,
    ) -> Vec<MeshAction> {
        self.stats.frames_received = self.stats.frames_received.wrapping_add(1);

        let mut actions = Vec::new();
        let frame = match Frame::decode(raw) {
            Ok(frame) => frame,
            Err(_) => {
                self.stats.decode_errors = self.stats.decode_errors.wrapping_add(1);
                return actions;
            }
        };

        let source = frame.header.source;
        if source == self.node_id {
            // Our own transmission echoed back.
            return actions;
        }

        // Observe the sender. Heartbeats (and discovery responses, which carry
        // the same payload) update the full entry; anything else refreshes
        // freshness and the link address only. Note that on a relayed frame
        // this binds the originator's id to the relaying hop's address.
        let heartbeat = match frame.header.message_type {
            MSG_TYPE_HEARTBEAT | MSG_TYPE_DISCOVER_RESP => {
                HeartbeatPayload::unpack(&frame.payload).ok()
            }
            _ => None,
        };
        let newly_seen = match &heartbeat {
            Some(hb) => self.routing.observe(
                source,
                *sender,
                hb.rssi,
                hb.hop_count,
                hb.role == ROLE_GATEWAY,
                now_ms,
            ),
            None => self.routing.refresh(source, *sender, now_ms),
        };
        if newly_seen {
            if let Some(node) = self.routing.lookup(source) {
                actions.push(MeshAction::NodeDiscovered { node: *node });
            }
        }

        // Duplicate suppression, ahead of delivery and of re-forwarding.
        let sequence = frame.header.sequence;
        if self.seen.is_duplicate(source, sequence) {
            self.stats.duplicates_dropped = self.stats.duplicates_dropped.wrapping_add(1);
            return actions;
        }
        self.seen.add(source, sequence);

        let message_type = match frame.message_type() {
            Some(t) => t,
            None => {
                self.stats.unknown_dropped = self.stats.unknown_dropped.wrapping_add(1);
                return actions;
            }
        };

        if message_type == MessageType::Heartbeat {
            // Routing already updated above.
            return actions;
        }

        if message_type == MessageType::Discover {
            let mut response = self.heartbeat_frame(now_ms);
            response.header.message_type = MSG_TYPE_DISCOVER_RESP;
            response.header.dest = source;
            response.recompute_checksum();
            actions.push(MeshAction::Unicast {
                addr: self.link_target(source, sender),
                frame: response,
            });
            return actions;
        }

        let dest = frame.header.dest;
        let for_me = dest == self.node_id
            || dest.is_broadcast()
            || (dest.is_gateway_address() && self.role.is_gateway());

        if for_me {
            if message_type == MessageType::Ack {
                // Never ack an ack.
                actions.push(MeshAction::AckMatched {
                    from: source,
                    sequence,
                });
                return actions;
            }

            let wants_ack = message_type.wants_ack();
            self.stats.frames_delivered = self.stats.frames_delivered.wrapping_add(1);
            actions.push(MeshAction::Deliver {
                frame: frame.clone(),
            });
            if wants_ack {
                let ack = Frame::ack(self.node_id, source, sequence);
                actions.push(MeshAction::Unicast {
                    addr: self.link_target(source, sender),
                    frame: ack,
                });
            }
            return actions;
        }

        // Not ours: relay traffic that is headed for the gateway (or the
        // broadcast address), drop anything else.
        if dest.is_gateway_address() || dest.is_broadcast() {
            let mut relay = frame;
            if message_type == MessageType::MotionAlert {
                relay.append_to_path(self.node_id);
            }
            self.stats.frames_relayed = self.stats.frames_relayed.wrapping_add(1);

            let next_hop = if relay.header.dest.is_gateway_address() {
                self.routing.best_gateway_route()
            } else if !relay.header.dest.is_broadcast() {
                self.routing.lookup(relay.header.dest)
            } else {
                None
            };
            match next_hop {
                Some(entry) => actions.push(MeshAction::Unicast {
                    addr: entry.link_address,
                    frame: relay,
                }),
                None => actions.push(MeshAction::Broadcast { frame: relay }),
            }
        }

        actions
    }

    /// Link address for a unicast reply: the routed entry if one exists,
    /// otherwise the hop the triggering frame arrived from.
    fn link_target(&self, dest: NodeId, sender: &LinkAddress) -> LinkAddress {
        self.routing
            .lookup(dest)
            .map(|e| e.link_address)
            .unwrap_or(*sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::MotionAlertPayload;
    use alloc::vec;

    fn addr(seed: u8) -> LinkAddress {
        LinkAddress([seed; 6])
    }

    fn sensor(id: u16) -> MeshEngine {
        MeshEngine::new(NodeId(id), Role::Sensor, MESH_MAX_NODES, 0)
    }

    fn gateway(id: u16) -> MeshEngine {
        MeshEngine::new(NodeId(id), Role::Gateway, MESH_MAX_NODES, 0)
    }

    fn heartbeat_from(engine: &mut MeshEngine, now: u64) -> Vec<u8> {
        engine.heartbeat_frame(now).encode().unwrap()
    }

    #[test]
    fn sequence_starts_at_one_and_wraps() {
        let mut engine = sensor(3);
        assert_eq!(engine.next_sequence(), 1);
        assert_eq!(engine.next_sequence(), 2);
        engine.sequence = u16::MAX;
        assert_eq!(engine.next_sequence(), 0);
    }

    #[test]
    fn corrupted_frame_counted_and_dropped() {
        let mut engine = sensor(3);
        let mut raw = Frame::motion_alert(NodeId(7), 0, 0, false, 1).encode().unwrap();
        raw[4] ^= 0x01;

        let actions = engine.handle_frame(&addr(7), &raw, 0);
        assert!(actions.is_empty());
        assert_eq!(engine.stats().decode_errors, 1);
        assert_eq!(engine.stats().frames_received, 1);
    }

    #[test]
    fn heartbeat_updates_routing_and_discovers_once() {
        let mut engine = sensor(3);
        let mut peer = gateway(1);

        let raw = heartbeat_from(&mut peer, 0);
        let actions = engine.handle_frame(&addr(1), &raw, 100);
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            MeshAction::NodeDiscovered { node } => {
                assert_eq!(node.node_id, NodeId(1));
                assert!(node.is_gateway);
                assert_eq!(node.hop_count, 0);
            }
            other => panic!("expected NodeDiscovered, got {:?}", other),
        }

        // Second heartbeat: no rediscovery, freshness advanced.
        let raw = heartbeat_from(&mut peer, 5000);
        let actions = engine.handle_frame(&addr(1), &raw, 5000);
        assert!(actions.is_empty());
        assert_eq!(engine.lookup(NodeId(1)).unwrap().last_seen_ms, 5000);
    }

    #[test]
    fn duplicate_frame_suppressed() {
        let mut gw = gateway(1);
        let raw = Frame::motion_alert(NodeId(3), 0, 0, false, 7).encode().unwrap();

        let first = gw.handle_frame(&addr(3), &raw, 0);
        assert!(first
            .iter()
            .any(|a| matches!(a, MeshAction::Deliver { .. })));

        let second = gw.handle_frame(&addr(3), &raw, 10);
        assert!(!second
            .iter()
            .any(|a| matches!(a, MeshAction::Deliver { .. })));
        assert_eq!(gw.stats().duplicates_dropped, 1);
        assert_eq!(gw.stats().frames_delivered, 1);
    }

    #[test]
    fn unknown_type_dropped() {
        let mut engine = sensor(3);
        let mut frame = Frame::new(NodeId(4), NodeId(3), MessageType::Command, 1);
        frame.header.message_type = 0x7E;
        frame.recompute_checksum();

        let actions = engine.handle_frame(&addr(4), &frame.encode().unwrap(), 0);
        // Routing refresh still discovered the sender, but nothing else.
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], MeshAction::NodeDiscovered { .. }));
        assert_eq!(engine.stats().unknown_dropped, 1);
    }

    #[test]
    fn discover_answered_with_heartbeat_payload() {
        let mut engine = sensor(3);
        let discover = Frame::new(NodeId(9), NodeId::BROADCAST, MessageType::Discover, 4);

        let actions = engine.handle_frame(&addr(9), &discover.encode().unwrap(), 0);
        let response = actions
            .iter()
            .find_map(|a| match a {
                MeshAction::Unicast { addr, frame } => Some((addr, frame)),
                _ => None,
            })
            .expect("expected a unicast response");
        assert_eq!(*response.0, addr(9));
        assert_eq!(response.1.header.message_type, MSG_TYPE_DISCOVER_RESP);
        assert_eq!(response.1.header.dest, NodeId(9));
        assert!(response.1.verify_checksum());
        assert!(HeartbeatPayload::unpack(&response.1.payload).is_ok());
    }

    #[test]
    fn delivery_acks_selected_classes() {
        let mut gw = gateway(1);
        let alert = Frame::motion_alert(NodeId(3), 123, 0, false, 9);

        let actions = gw.handle_frame(&addr(3), &alert.encode().unwrap(), 0);
        assert!(matches!(actions[1], MeshAction::Deliver { .. }));
        match &actions[2] {
            MeshAction::Unicast { addr: to, frame } => {
                assert_eq!(*to, addr(3));
                assert_eq!(frame.message_type(), Some(MessageType::Ack));
                assert_eq!(frame.header.dest, NodeId(3));
                assert_eq!(frame.header.sequence, 9);
            }
            other => panic!("expected ack unicast, got {:?}", other),
        }
    }

    #[test]
    fn broadcast_command_not_acked() {
        let mut engine = sensor(3);
        let mut frame = Frame::new(NodeId(1), NodeId::BROADCAST, MessageType::Command, 2);
        frame.set_payload(vec![0x01]).unwrap();

        let actions = engine.handle_frame(&addr(1), &frame.encode().unwrap(), 0);
        assert!(actions.iter().any(|a| matches!(a, MeshAction::Deliver { .. })));
        assert!(!actions.iter().any(|a| matches!(a, MeshAction::Unicast { .. })));
    }

    #[test]
    fn ack_matches_and_is_not_acked() {
        let mut engine = sensor(3);
        let ack = Frame::ack(NodeId(1), NodeId(3), 42);

        let actions = engine.handle_frame(&addr(1), &ack.encode().unwrap(), 0);
        assert!(actions.iter().any(|a| matches!(
            a,
            MeshAction::AckMatched { from: NodeId(1), sequence: 42 }
        )));
        assert!(!actions.iter().any(|a| matches!(a, MeshAction::Unicast { .. })));
        assert!(!actions.iter().any(|a| matches!(a, MeshAction::Deliver { .. })));
    }

    #[test]
    fn relay_appends_self_and_unicasts_toward_gateway() {
        let mut relay = sensor(4);
        let mut gw = gateway(1);
        let raw = heartbeat_from(&mut gw, 0);
        relay.handle_frame(&addr(1), &raw, 0);

        let alert = Frame::motion_alert(NodeId(3), 555, 2, true, 11);
        let actions = relay.handle_frame(&addr(3), &alert.encode().unwrap(), 100);

        let forwarded = actions
            .iter()
            .find_map(|a| match a {
                MeshAction::Unicast { addr, frame } => Some((addr, frame)),
                _ => None,
            })
            .expect("expected relayed unicast");
        assert_eq!(*forwarded.0, addr(1));
        assert!(forwarded.1.verify_checksum());

        let payload = MotionAlertPayload::unpack(&forwarded.1.payload).unwrap();
        assert_eq!(payload.path, vec![NodeId(3), NodeId(4)]);
        assert_eq!(relay.stats().frames_relayed, 1);
        // The relay does not deliver gateway-destined traffic upward.
        assert!(!actions.iter().any(|a| matches!(a, MeshAction::Deliver { .. })));
    }

    #[test]
    fn relay_without_route_broadcasts() {
        let mut relay = sensor(4);
        let alert = Frame::motion_alert(NodeId(3), 555, 2, true, 11);

        let actions = relay.handle_frame(&addr(3), &alert.encode().unwrap(), 0);
        assert!(actions.iter().any(|a| matches!(a, MeshAction::Broadcast { .. })));
    }

    #[test]
    fn unicast_for_someone_else_dropped() {
        let mut engine = sensor(4);
        let frame = Frame::new(NodeId(3), NodeId(9), MessageType::Command, 5);

        let actions = engine.handle_frame(&addr(3), &frame.encode().unwrap(), 0);
        assert!(!actions.iter().any(|a| matches!(
            a,
            MeshAction::Unicast { .. } | MeshAction::Broadcast { .. } | MeshAction::Deliver { .. }
        )));
    }

    #[test]
    fn gateway_dest_only_for_gateway_role() {
        let alert = Frame::motion_alert(NodeId(3), 0, 0, false, 1);
        let raw = alert.encode().unwrap();

        let mut sensor_node = sensor(4);
        let actions = sensor_node.handle_frame(&addr(3), &raw, 0);
        assert!(!actions.iter().any(|a| matches!(a, MeshAction::Deliver { .. })));

        let mut gw = gateway(4);
        let actions = gw.handle_frame(&addr(3), &raw, 0);
        assert!(actions.iter().any(|a| matches!(a, MeshAction::Deliver { .. })));
    }

    #[test]
    fn own_hop_count_tracks_route() {
        let mut engine = sensor(3);
        assert_eq!(engine.own_hop_count(), HOP_COUNT_UNREACHABLE);

        let mut relay = sensor(4);
        let mut gw = gateway(1);
        relay.handle_frame(&addr(1), &heartbeat_from(&mut gw, 0), 0);
        engine.handle_frame(&addr(4), &heartbeat_from(&mut relay, 0), 0);

        // Relay advertises hop 1, so we are at hop 2.
        assert_eq!(engine.own_hop_count(), 2);

        let mut direct_gw = gateway(1);
        engine.handle_frame(&addr(1), &heartbeat_from(&mut direct_gw, 0), 0);
        assert_eq!(engine.own_hop_count(), 1);

        assert_eq!(gw.own_hop_count(), 0);
    }

    #[test]
    fn status_frame_reports_counters() {
        let mut engine = sensor(3);
        engine.set_battery_level(80);
        let frame = engine.status_frame(NodeId(1), 12, 4, 60_000);
        let status = crate::payload::StatusPayload::unpack(&frame.payload).unwrap();
        assert_eq!(status.node_id, 3);
        assert_eq!(status.battery, 80);
        assert_eq!(status.uptime_s, 60);
        assert_eq!(status.motion_count, 12);
        assert_eq!(status.images_sent, 4);
    }

    #[test]
    fn own_echo_ignored() {
        let mut engine = sensor(3);
        let raw = Frame::motion_alert(NodeId(3), 0, 0, false, 1).encode().unwrap();
        let actions = engine.handle_frame(&LinkAddress::BROADCAST, &raw, 0);
        assert!(actions.is_empty());
        assert!(engine.lookup(NodeId(3)).is_none());
    }
}
