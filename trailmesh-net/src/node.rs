//! Node driver: owns the forwarding engine, executes its actions against the
//! radio, and drives the timers from a single cooperative loop.

use std::fmt;

use trailmesh_core::constants::*;
use trailmesh_core::engine::{MeshAction, MeshEngine};
use trailmesh_core::frame::{Frame, FrameError, MessageType};
use trailmesh_core::image::{ImageReceiver, ImageRxEvent};
use trailmesh_core::payload::{ImageChunkPayload, ImageEndPayload, ImageStartPayload};
use trailmesh_core::routing::RouteEntry;
use trailmesh_core::types::{LinkAddress, NodeId, Role};

use crate::callbacks::Callbacks;
use crate::config::{ConfigError, MeshConfig};
use crate::radio::{Clock, Radio};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshError {
    /// No next hop toward the gateway.
    NoRoute,
    /// A second image transfer was attempted while one is active.
    Busy,
    /// The image exceeds the chunk budget.
    ImageTooLarge,
    /// The radio reported failure (or timed out) after the retry budget.
    SendFailed,
    /// A specific chunk exhausted its retries; the transfer was aborted.
    ChunkSendFailed(u16),
    /// Frame construction failed.
    Frame(FrameError),
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshError::NoRoute => write!(f, "No route to gateway"),
            MeshError::Busy => write!(f, "Image transfer already in progress"),
            MeshError::ImageTooLarge => write!(f, "Image exceeds chunk budget"),
            MeshError::SendFailed => write!(f, "Radio send failed"),
            MeshError::ChunkSendFailed(index) => write!(f, "Chunk {} send failed", index),
            MeshError::Frame(e) => write!(f, "Frame error: {}", e),
        }
    }
}

impl std::error::Error for MeshError {}

impl From<FrameError> for MeshError {
    fn from(e: FrameError) -> Self {
        MeshError::Frame(e)
    }
}

/// The local unicast send slot; at most one transmission is ever in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendSlot {
    Idle,
    Sending { started_ms: u64 },
}

/// Merged engine and driver counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshStats {
    pub messages_sent: u32,
    pub messages_received: u32,
    pub messages_delivered: u32,
    pub messages_relayed: u32,
    pub decode_errors: u32,
    pub duplicates_dropped: u32,
    pub unknown_dropped: u32,
    pub send_failures: u32,
    pub acks_matched: u32,
    pub motion_alerts_sent: u32,
    pub images_sent: u32,
}

/// A mesh node: substrate state plus the radio and clock it drives.
///
/// Everything runs on the caller's loop; the only blocking points are the
/// bounded send-completion wait and the pacing gaps inside `send_image`.
pub struct MeshNode<R: Radio, C: Clock> {
    engine: MeshEngine,
    receiver: ImageReceiver,
    radio: R,
    clock: C,
    callbacks: Option<Box<dyn Callbacks>>,
    config: MeshConfig,
    slot: SendSlot,
    pending_ack: Option<u16>,
    image_in_progress: bool,
    had_gateway_route: bool,
    last_heartbeat_ms: u64,
    last_prune_ms: u64,
    messages_sent: u32,
    send_failures: u32,
    acks_matched: u32,
    motion_alerts_sent: u32,
    images_sent: u32,
}

impl<R: Radio, C: Clock> MeshNode<R, C> {
    /// Bring the substrate up: validate configuration, set the channel, and
    /// emit the initial beacon.
    pub fn new(
        node_id: NodeId,
        role: Role,
        config: MeshConfig,
        mut radio: R,
        mut clock: C,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if !node_id.is_device() {
            return Err(ConfigError::InvalidNodeId(node_id.0));
        }

        radio.set_channel(config.channel);
        let now = clock.now_ms();
        let mut engine = MeshEngine::new(node_id, role, config.max_nodes, now);
        engine.set_battery_level(config.battery_level);

        let mut node = MeshNode {
            engine,
            receiver: ImageReceiver::new(config.img_chunk_size, config.img_max_chunks),
            radio,
            clock,
            callbacks: None,
            config,
            slot: SendSlot::Idle,
            pending_ack: None,
            image_in_progress: false,
            had_gateway_route: false,
            last_heartbeat_ms: now,
            last_prune_ms: now,
            messages_sent: 0,
            send_failures: 0,
            acks_matched: 0,
            motion_alerts_sent: 0,
            images_sent: 0,
        };
        log::info!(
            "Node {} up as {} at {}, channel {}",
            node_id,
            role,
            node.radio.local_address(),
            node.config.channel
        );
        node.send_heartbeat();
        Ok(node)
    }

    pub fn set_callbacks(&mut self, callbacks: Box<dyn Callbacks>) {
        self.callbacks = Some(callbacks);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn node_id(&self) -> NodeId {
        self.engine.node_id()
    }

    pub fn role(&self) -> Role {
        self.engine.role()
    }

    pub fn link_address(&self) -> LinkAddress {
        self.radio.local_address()
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    pub fn snapshot_nodes(&self) -> Vec<RouteEntry> {
        self.engine.snapshot().to_vec()
    }

    pub fn gateway_route(&self) -> Option<RouteEntry> {
        self.engine.gateway_route().copied()
    }

    pub fn set_battery_level(&mut self, percent: u8) {
        self.engine.set_battery_level(percent);
    }

    pub fn image_transfer_in_progress(&self) -> bool {
        self.image_in_progress
    }

    pub fn send_in_flight(&self) -> bool {
        matches!(self.slot, SendSlot::Sending { .. })
    }

    pub fn stats(&self) -> MeshStats {
        let engine = self.engine.stats();
        MeshStats {
            messages_sent: self.messages_sent,
            messages_received: engine.frames_received,
            messages_delivered: engine.frames_delivered,
            messages_relayed: engine.frames_relayed,
            decode_errors: engine.decode_errors,
            duplicates_dropped: engine.duplicates_dropped,
            unknown_dropped: engine.unknown_dropped,
            send_failures: self.send_failures,
            acks_matched: self.acks_matched,
            motion_alerts_sent: self.motion_alerts_sent,
            images_sent: self.images_sent,
        }
    }

    // =========================================================================
    // Main loop entry points
    // =========================================================================

    /// Drive the timers: beacon cadence, route pruning, image timeout.
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();

        if now.saturating_sub(self.last_heartbeat_ms) >= self.config.heartbeat_interval_ms {
            self.send_heartbeat();
        }

        // Prune at least twice per route lifetime.
        if now.saturating_sub(self.last_prune_ms) >= self.config.route_timeout_ms / 2 {
            self.last_prune_ms = now;
            let removed = self.engine.prune_routes(now, self.config.route_timeout_ms);
            for node in &removed {
                log::info!("Node {} timed out", node.node_id);
                if let Some(cb) = self.callbacks.as_mut() {
                    cb.on_node_lost(node);
                }
            }
            if self.had_gateway_route && self.engine.gateway_route().is_none() {
                self.had_gateway_route = false;
            }
        }

        if let Some(event) = self.receiver.prune(now, self.config.image_timeout_ms) {
            self.dispatch_image_event(event);
        }
    }

    /// Feed one received datagram from the radio driver.
    pub fn ingest(&mut self, sender: LinkAddress, raw: &[u8]) {
        let now = self.clock.now_ms();
        let actions = self.engine.handle_frame(&sender, raw, now);
        self.execute(actions);

        // Downstream neighbors learn quickly when we first reach the gateway.
        if !self.had_gateway_route && self.engine.gateway_route().is_some() {
            self.had_gateway_route = true;
            log::info!("Gateway route acquired via {}",
                self.engine.gateway_route().map(|r| r.node_id).unwrap_or(NodeId::GATEWAY));
            self.send_heartbeat();
        }
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Broadcast a beacon now; normally implicit via `tick`.
    pub fn send_heartbeat(&mut self) {
        let now = self.clock.now_ms();
        let frame = self.engine.heartbeat_frame(now);
        self.transmit(LinkAddress::BROADCAST, &frame);
        self.last_heartbeat_ms = now;
    }

    /// Unicast a motion alert toward the gateway; the path starts at us.
    pub fn send_motion_alert(
        &mut self,
        timestamp_ms: u32,
        image_id: u16,
        has_image: bool,
    ) -> Result<(), MeshError> {
        let route = self
            .engine
            .resolve_unicast(NodeId::GATEWAY)
            .map(|e| e.link_address)
            .ok_or(MeshError::NoRoute)?;

        let sequence = self.engine.next_sequence();
        let frame = Frame::motion_alert(
            self.engine.node_id(),
            timestamp_ms,
            image_id,
            has_image,
            sequence,
        );
        if !self.transmit(route, &frame) {
            return Err(MeshError::SendFailed);
        }
        self.pending_ack = Some(sequence);
        self.motion_alerts_sent += 1;
        log::info!("Motion alert {} sent (image {})", sequence, image_id);
        Ok(())
    }

    /// Push an image to the gateway: IMAGE_START, chunk loop with per-chunk
    /// retry and pacing, best-effort IMAGE_END.
    pub fn send_image(&mut self, data: &[u8], image_id: u16) -> Result<(), MeshError> {
        if self.image_in_progress {
            return Err(MeshError::Busy);
        }
        let chunk_size = self.config.img_chunk_size;
        let total_chunks = (data.len() + chunk_size - 1) / chunk_size;
        if total_chunks > self.config.img_max_chunks as usize {
            return Err(MeshError::ImageTooLarge);
        }
        if self.engine.resolve_unicast(NodeId::GATEWAY).is_none() {
            return Err(MeshError::NoRoute);
        }

        self.image_in_progress = true;
        let result = self.run_image_transfer(data, image_id, total_chunks as u16);
        self.image_in_progress = false;

        match &result {
            Ok(()) => {
                self.images_sent += 1;
                log::info!("Image {} sent ({} bytes)", image_id, data.len());
            }
            Err(e) => log::warn!("Image {} transfer aborted: {}", image_id, e),
        }
        result
    }

    fn run_image_transfer(
        &mut self,
        data: &[u8],
        image_id: u16,
        total_chunks: u16,
    ) -> Result<(), MeshError> {
        let now = self.clock.now_ms();
        let route = self
            .engine
            .resolve_unicast(NodeId::GATEWAY)
            .map(|e| e.link_address)
            .ok_or(MeshError::NoRoute)?;
        log::info!(
            "Image {} transfer: {} bytes in {} chunks",
            image_id,
            data.len(),
            total_chunks
        );

        // No retry on the start frame.
        let sequence = self.engine.next_sequence();
        let start = Frame::image_start(
            self.engine.node_id(),
            image_id,
            data.len() as u32,
            total_chunks,
            now as u32,
            sequence,
        );
        if !self.transmit(route, &start) {
            return Err(MeshError::SendFailed);
        }
        self.pending_ack = Some(sequence);

        let chunk_size = self.config.img_chunk_size;
        for index in 0..total_chunks {
            let offset = index as usize * chunk_size;
            let end = (offset + chunk_size).min(data.len());

            // Retries resend the same frame under the same sequence.
            let sequence = self.engine.next_sequence();
            let chunk = Frame::image_chunk(
                self.engine.node_id(),
                image_id,
                index,
                &data[offset..end],
                sequence,
            )?;

            let mut sent = false;
            for attempt in 0..self.config.msg_max_retries.max(1) {
                if attempt > 0 {
                    self.clock.yield_ms(self.config.msg_retry_delay_ms);
                }
                let target = match self.engine.resolve_unicast(NodeId::GATEWAY) {
                    Some(entry) => entry.link_address,
                    None => continue,
                };
                if self.transmit(target, &chunk) {
                    sent = true;
                    break;
                }
            }
            if !sent {
                return Err(MeshError::ChunkSendFailed(index));
            }

            // Quiescent gap so relays and the sink are not flooded.
            self.clock.yield_ms(CHUNK_PACING_MS);
        }

        // Best-effort terminator; completion does not hinge on its ack.
        let sequence = self.engine.next_sequence();
        let end_frame = Frame::image_end(self.engine.node_id(), image_id, total_chunks, sequence);
        if let Some(route) = self
            .engine
            .resolve_unicast(NodeId::GATEWAY)
            .map(|e| e.link_address)
        {
            self.transmit(route, &end_frame);
            self.pending_ack = Some(sequence);
        }
        Ok(())
    }

    /// One transmission through the send slot: start the radio, poll for the
    /// completion, fail after `SEND_TIMEOUT_MS` without one.
    fn transmit(&mut self, addr: LinkAddress, frame: &Frame) -> bool {
        debug_assert_eq!(self.slot, SendSlot::Idle);
        let raw = match frame.encode() {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Dropping unencodable frame: {}", e);
                return false;
            }
        };

        let started_ms = self.clock.now_ms();
        self.slot = SendSlot::Sending { started_ms };
        if self.radio.start_send(&addr, &raw).is_err() {
            self.slot = SendSlot::Idle;
            self.send_failures += 1;
            return false;
        }

        loop {
            match self.radio.poll_send_complete() {
                Some(success) => {
                    self.slot = SendSlot::Idle;
                    if success {
                        self.messages_sent += 1;
                    } else {
                        self.send_failures += 1;
                    }
                    return success;
                }
                None => {
                    if self.clock.now_ms().saturating_sub(started_ms) >= SEND_TIMEOUT_MS {
                        self.slot = SendSlot::Idle;
                        self.send_failures += 1;
                        log::warn!("Send completion timed out");
                        return false;
                    }
                    self.clock.yield_ms(1);
                }
            }
        }
    }

    // =========================================================================
    // Action execution and upward dispatch
    // =========================================================================

    fn execute(&mut self, actions: Vec<MeshAction>) {
        for action in actions {
            match action {
                MeshAction::Unicast { addr, frame } => {
                    if !self.transmit(addr, &frame) {
                        log::debug!("Forwarding to {} failed", addr);
                    }
                }
                MeshAction::Broadcast { frame } => {
                    self.transmit(LinkAddress::BROADCAST, &frame);
                }
                MeshAction::Deliver { frame } => self.deliver(frame),
                MeshAction::NodeDiscovered { node } => {
                    log::info!(
                        "Node {} discovered (gateway: {}, rssi {})",
                        node.node_id,
                        node.is_gateway,
                        node.rssi
                    );
                    if let Some(cb) = self.callbacks.as_mut() {
                        cb.on_node_discovered(&node);
                    }
                }
                MeshAction::AckMatched { from, sequence } => {
                    if self.pending_ack == Some(sequence) {
                        self.pending_ack = None;
                        self.acks_matched += 1;
                        log::debug!("Ack for {} from {}", sequence, from);
                    }
                }
            }
        }
    }

    fn deliver(&mut self, frame: Frame) {
        let source = frame.header.source;
        match frame.message_type() {
            Some(MessageType::ImageStart) if self.engine.role().is_gateway() => {
                match ImageStartPayload::unpack(&frame.payload) {
                    Ok(start) => {
                        log::info!(
                            "Image {} from {}: {} bytes in {} chunks",
                            start.image_id,
                            source,
                            start.total_size,
                            start.total_chunks
                        );
                        let now = self.clock.now_ms();
                        if let Some(event) = self.receiver.on_start(source, &start, now) {
                            self.dispatch_image_event(event);
                        }
                    }
                    Err(e) => log::warn!("Malformed image start from {}: {}", source, e),
                }
            }
            Some(MessageType::ImageChunk) if self.engine.role().is_gateway() => {
                match ImageChunkPayload::unpack(&frame.payload) {
                    Ok(chunk) => {
                        if let Some(event) = self.receiver.on_chunk(&chunk) {
                            self.dispatch_image_event(event);
                        }
                    }
                    Err(e) => log::warn!("Malformed image chunk from {}: {}", source, e),
                }
            }
            Some(MessageType::ImageEnd) if self.engine.role().is_gateway() => {
                match ImageEndPayload::unpack(&frame.payload) {
                    Ok(end) => {
                        if let Some(event) = self.receiver.on_end(&end) {
                            self.dispatch_image_event(event);
                        }
                    }
                    Err(e) => log::warn!("Malformed image end from {}: {}", source, e),
                }
            }
            Some(MessageType::StatusRequest) => {
                // Answered by the substrate; the request is not forwarded up.
                let target = self.engine.lookup(source).map(|e| e.link_address);
                let motion_count = self.motion_alerts_sent;
                let images_sent = self.images_sent;
                let now = self.clock.now_ms();
                let response = self.engine.status_frame(source, motion_count, images_sent, now);
                match target {
                    Some(addr) => {
                        self.transmit(addr, &response);
                    }
                    None => log::debug!("No link for status response to {}", source),
                }
            }
            _ => {
                if let Some(cb) = self.callbacks.as_mut() {
                    cb.on_message(&frame);
                }
            }
        }
    }

    fn dispatch_image_event(&mut self, event: ImageRxEvent) {
        match event {
            ImageRxEvent::Completed {
                source,
                image_id,
                data,
            } => {
                log::info!(
                    "Image {} from {} complete ({} bytes)",
                    image_id,
                    source,
                    data.len()
                );
                if let Some(cb) = self.callbacks.as_mut() {
                    cb.on_image_received(source, image_id, &data);
                }
            }
            ImageRxEvent::Failed {
                source,
                image_id,
                received,
                expected,
            } => {
                log::warn!(
                    "Image {} from {} incomplete: {}/{} chunks",
                    image_id,
                    source,
                    received,
                    expected
                );
                if let Some(cb) = self.callbacks.as_mut() {
                    cb.on_image_failed(source, image_id, received, expected);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullRadio;

    impl Radio for NullRadio {
        fn start_send(&mut self, _addr: &LinkAddress, _bytes: &[u8]) -> Result<(), crate::radio::RadioError> {
            Ok(())
        }

        fn poll_send_complete(&mut self) -> Option<bool> {
            Some(true)
        }

        fn local_address(&self) -> LinkAddress {
            LinkAddress([0x02; 6])
        }
    }

    struct StepClock {
        now: u64,
    }

    impl Clock for StepClock {
        fn now_ms(&mut self) -> u64 {
            self.now
        }

        fn yield_ms(&mut self, ms: u64) {
            self.now += ms;
        }
    }

    fn node() -> MeshNode<NullRadio, StepClock> {
        MeshNode::new(
            NodeId(3),
            Role::Sensor,
            MeshConfig::default(),
            NullRadio,
            StepClock { now: 0 },
        )
        .unwrap()
    }

    #[test]
    fn rejects_reserved_node_ids() {
        for id in [0u16, 255, 0xFFFF] {
            let result = MeshNode::new(
                NodeId(id),
                Role::Sensor,
                MeshConfig::default(),
                NullRadio,
                StepClock { now: 0 },
            );
            assert!(matches!(result, Err(ConfigError::InvalidNodeId(_))));
        }
    }

    #[test]
    fn init_sends_initial_beacon() {
        let node = node();
        assert_eq!(node.stats().messages_sent, 1);
        assert!(!node.send_in_flight());
    }

    #[test]
    fn second_image_transfer_is_busy() {
        let mut node = node();
        node.image_in_progress = true;
        let before = node.stats();
        assert_eq!(node.send_image(&[0u8; 100], 1), Err(MeshError::Busy));
        // The in-flight transfer state is untouched.
        assert!(node.image_transfer_in_progress());
        assert_eq!(node.stats(), before);
    }

    #[test]
    fn image_too_large_rejected_up_front() {
        let mut node = node();
        let data = vec![0u8; node.config().max_image_bytes() + 1];
        assert_eq!(node.send_image(&data, 1), Err(MeshError::ImageTooLarge));
    }

    #[test]
    fn unicast_sends_need_a_route() {
        let mut node = node();
        assert_eq!(node.send_motion_alert(0, 0, false), Err(MeshError::NoRoute));
        assert_eq!(node.send_image(&[0u8; 10], 1), Err(MeshError::NoRoute));
    }
}
