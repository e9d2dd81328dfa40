use alloc::vec::Vec;

use crate::constants::*;
use crate::types::{LinkAddress, NodeId};

/// Soft-state entry for a mesh peer, refreshed by every frame heard from it.
///
/// `hop_count` is the peer's advertised distance to the gateway, not ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub node_id: NodeId,
    pub link_address: LinkAddress,
    pub rssi: i8,
    pub hop_count: u8,
    pub last_seen_ms: u64,
    pub is_gateway: bool,
    pub reachable: bool,
}

impl RouteEntry {
    /// Whether this entry can carry traffic toward the gateway.
    fn routes_to_gateway(&self) -> bool {
        self.reachable && (self.is_gateway || self.hop_count != HOP_COUNT_UNREACHABLE)
    }
}

/// Bounded routing table rebuilt from heartbeats after every reset.
///
/// At most one entry per node id, never the local node itself. Inserting into
/// a full table evicts the entry with the oldest `last_seen_ms` (ties broken
/// by weakest signal).
pub struct RoutingTable {
    local_id: NodeId,
    capacity: usize,
    entries: Vec<RouteEntry>,
}

impl RoutingTable {
    pub fn new(local_id: NodeId, capacity: usize) -> Self {
        RoutingTable {
            local_id,
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Full upsert from a heartbeat (or discovery response) payload.
    ///
    /// Returns true when the node id was not previously in the table, i.e.
    /// exactly once per node id until that entry is pruned.
    pub fn observe(
        &mut self,
        node_id: NodeId,
        link_address: LinkAddress,
        rssi: i8,
        hop_count: u8,
        is_gateway: bool,
        now_ms: u64,
    ) -> bool {
        if !self.admissible(node_id) {
            return false;
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| e.node_id == node_id) {
            entry.link_address = link_address;
            entry.rssi = rssi;
            entry.hop_count = hop_count;
            entry.is_gateway = is_gateway;
            entry.last_seen_ms = now_ms;
            entry.reachable = true;
            return false;
        }
        self.insert(RouteEntry {
            node_id,
            link_address,
            rssi,
            hop_count,
            last_seen_ms: now_ms,
            is_gateway,
            reachable: true,
        });
        true
    }

    /// Lightweight upsert for frames that carry no link metrics: only the
    /// link address and freshness are updated. An unknown sender is created
    /// with assumed defaults and an unknown gateway distance.
    pub fn refresh(&mut self, node_id: NodeId, link_address: LinkAddress, now_ms: u64) -> bool {
        if !self.admissible(node_id) {
            return false;
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| e.node_id == node_id) {
            entry.link_address = link_address;
            entry.last_seen_ms = now_ms;
            entry.reachable = true;
            return false;
        }
        self.insert(RouteEntry {
            node_id,
            link_address,
            rssi: RSSI_ASSUMED,
            hop_count: HOP_COUNT_UNREACHABLE,
            last_seen_ms: now_ms,
            is_gateway: false,
            reachable: true,
        });
        true
    }

    fn admissible(&self, node_id: NodeId) -> bool {
        node_id != self.local_id && node_id.is_device()
    }

    fn insert(&mut self, entry: RouteEntry) {
        if self.entries.len() >= self.capacity {
            // Evict the stalest entry; on equal age, the weakest signal.
            if let Some(victim) = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| (e.last_seen_ms, e.rssi))
                .map(|(i, _)| i)
            {
                self.entries.swap_remove(victim);
            }
        }
        self.entries.push(entry);
    }

    pub fn lookup(&self, node_id: NodeId) -> Option<&RouteEntry> {
        self.entries.iter().find(|e| e.node_id == node_id)
    }

    /// Select the next hop toward the gateway.
    ///
    /// A direct gateway neighbor with the strongest signal wins; otherwise the
    /// reachable peer advertising the shortest gateway distance (ties broken
    /// by strongest signal). Peers that have never advertised a distance do
    /// not qualify.
    pub fn best_gateway_route(&self) -> Option<&RouteEntry> {
        if let Some(direct) = self
            .entries
            .iter()
            .filter(|e| e.reachable && e.is_gateway)
            .max_by_key(|e| e.rssi)
        {
            return Some(direct);
        }
        self.entries
            .iter()
            .filter(|e| e.routes_to_gateway())
            .min_by_key(|e| (e.hop_count, core::cmp::Reverse(e.rssi)))
    }

    /// Remove entries not refreshed within `timeout_ms`. Returns the evicted
    /// entries so the caller can react to lost peers.
    pub fn prune(&mut self, now_ms: u64, timeout_ms: u64) -> Vec<RouteEntry> {
        let mut removed = Vec::new();
        self.entries.retain(|e| {
            if now_ms.saturating_sub(e.last_seen_ms) > timeout_ms {
                removed.push(*e);
                false
            } else {
                true
            }
        });
        removed
    }

    /// Read-only view for status reporting.
    pub fn snapshot(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
