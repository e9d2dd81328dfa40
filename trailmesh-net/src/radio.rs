//! Seams between the substrate and the platform.
//!
//! The radio is a datagram-oriented broadcast-capable link: per-peer unicast
//! with an asynchronous completion report, plus a broadcast address. The
//! substrate starts a transmission and polls for the completion from its
//! cooperative loop; it never holds more than one transmission in flight.

use std::fmt;

use trailmesh_core::types::LinkAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// The driver refused the transmission outright.
    Rejected,
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioError::Rejected => write!(f, "Radio rejected transmission"),
        }
    }
}

impl std::error::Error for RadioError {}

pub trait Radio {
    /// Apply the configured channel. Drivers without channel selection ignore it.
    fn set_channel(&mut self, _channel: u8) {}

    /// Begin transmitting one datagram to `addr` (or `LinkAddress::BROADCAST`).
    ///
    /// Success here only means the driver accepted the datagram; the outcome
    /// arrives later through `poll_send_complete`.
    fn start_send(&mut self, addr: &LinkAddress, bytes: &[u8]) -> Result<(), RadioError>;

    /// Completion status of the in-flight transmission: `None` while pending,
    /// `Some(success)` once the driver reports.
    fn poll_send_complete(&mut self) -> Option<bool>;

    /// This node's own link-layer address.
    fn local_address(&self) -> LinkAddress;
}

/// Monotonic time and the cooperative yield used while waiting on the radio.
pub trait Clock {
    /// Milliseconds since an arbitrary epoch; must never go backwards.
    fn now_ms(&mut self) -> u64;

    /// Give the platform a breather; also paces chunk bursts and retry gaps.
    fn yield_ms(&mut self, ms: u64);
}
