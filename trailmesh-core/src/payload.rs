//! Typed payload layouts, one per message class.
//!
//! Every multi-byte field is little-endian and packed; the structs here are
//! the only place the byte offsets live. `pack` always emits the full wire
//! layout, `unpack` validates lengths and value ranges.

use alloc::vec::Vec;
use core::fmt;

use crate::constants::*;
use crate::types::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    TooShort,
    PathLengthInvalid,
    ChunkTooLarge,
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::TooShort => write!(f, "Payload too short"),
            PayloadError::PathLengthInvalid => write!(f, "Path length field invalid"),
            PayloadError::ChunkTooLarge => {
                write!(f, "Chunk data exceeds {} bytes", IMG_CHUNK_SIZE)
            }
        }
    }
}

// =============================================================================
// HEARTBEAT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatPayload {
    pub node_id: u8,
    pub role: u8,
    pub rssi: i8,
    pub battery: u8,
    pub hop_count: u8,
    pub uptime_s: u32,
}

impl HeartbeatPayload {
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEARTBEAT_LEN);
        out.push(self.node_id);
        out.push(self.role);
        out.push(self.rssi as u8);
        out.push(self.battery);
        out.push(self.hop_count);
        out.extend_from_slice(&self.uptime_s.to_le_bytes());
        out
    }

    pub fn unpack(raw: &[u8]) -> Result<Self, PayloadError> {
        if raw.len() < HEARTBEAT_LEN {
            return Err(PayloadError::TooShort);
        }
        Ok(HeartbeatPayload {
            node_id: raw[0],
            role: raw[1],
            rssi: raw[2] as i8,
            battery: raw[3],
            hop_count: raw[4],
            uptime_s: u32::from_le_bytes([raw[5], raw[6], raw[7], raw[8]]),
        })
    }
}

// =============================================================================
// MOTION_ALERT
// =============================================================================

/// Motion alert with hop-by-hop path annotation.
///
/// `path[0]` is the originator; each relay appends its own id. Unused wire
/// slots are zero. An 8-byte legacy form without the path fields is accepted
/// with an empty path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionAlertPayload {
    pub timestamp_ms: u32,
    pub sensor_id: u8,
    pub image_id: u16,
    pub has_image: bool,
    pub path: Vec<NodeId>,
}

impl MotionAlertPayload {
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MOTION_ALERT_LEN);
        out.extend_from_slice(&self.timestamp_ms.to_le_bytes());
        out.push(self.sensor_id);
        out.extend_from_slice(&self.image_id.to_le_bytes());
        out.push(if self.has_image { 1 } else { 0 });
        out.push(self.path.len().min(MAX_PATH_LENGTH) as u8);
        for slot in 0..MAX_PATH_LENGTH {
            let id = self.path.get(slot).map(|n| n.0).unwrap_or(0);
            out.extend_from_slice(&id.to_le_bytes());
        }
        out
    }

    pub fn unpack(raw: &[u8]) -> Result<Self, PayloadError> {
        if raw.len() < MOTION_ALERT_LEGACY_LEN {
            return Err(PayloadError::TooShort);
        }
        let timestamp_ms = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let sensor_id = raw[4];
        let image_id = u16::from_le_bytes([raw[5], raw[6]]);
        let has_image = raw[7] != 0;

        if raw.len() < MOTION_ALERT_LEN {
            // Legacy alert without path tracking.
            return Ok(MotionAlertPayload {
                timestamp_ms,
                sensor_id,
                image_id,
                has_image,
                path: Vec::new(),
            });
        }

        let path_length = raw[8] as usize;
        if path_length > MAX_PATH_LENGTH {
            return Err(PayloadError::PathLengthInvalid);
        }
        let mut path = Vec::with_capacity(path_length);
        for slot in 0..path_length {
            let at = 9 + slot * 2;
            path.push(NodeId(u16::from_le_bytes([raw[at], raw[at + 1]])));
        }
        Ok(MotionAlertPayload {
            timestamp_ms,
            sensor_id,
            image_id,
            has_image,
            path,
        })
    }
}

// =============================================================================
// IMAGE_START / IMAGE_CHUNK / IMAGE_END
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageStartPayload {
    pub image_id: u16,
    pub total_size: u32,
    pub total_chunks: u16,
    pub capture_ts_ms: u32,
}

impl ImageStartPayload {
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IMAGE_START_LEN);
        out.extend_from_slice(&self.image_id.to_le_bytes());
        out.extend_from_slice(&self.total_size.to_le_bytes());
        out.extend_from_slice(&self.total_chunks.to_le_bytes());
        out.extend_from_slice(&self.capture_ts_ms.to_le_bytes());
        out
    }

    pub fn unpack(raw: &[u8]) -> Result<Self, PayloadError> {
        if raw.len() < IMAGE_START_LEN {
            return Err(PayloadError::TooShort);
        }
        Ok(ImageStartPayload {
            image_id: u16::from_le_bytes([raw[0], raw[1]]),
            total_size: u32::from_le_bytes([raw[2], raw[3], raw[4], raw[5]]),
            total_chunks: u16::from_le_bytes([raw[6], raw[7]]),
            capture_ts_ms: u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]),
        })
    }
}

/// Borrowed view over an IMAGE_CHUNK payload; the data slice aliases the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageChunkPayload<'a> {
    pub image_id: u16,
    pub chunk_index: u16,
    pub data: &'a [u8],
}

impl<'a> ImageChunkPayload<'a> {
    pub fn unpack(raw: &'a [u8]) -> Result<Self, PayloadError> {
        if raw.len() < IMAGE_CHUNK_HEADER_LEN {
            return Err(PayloadError::TooShort);
        }
        let data = &raw[IMAGE_CHUNK_HEADER_LEN..];
        if data.len() > IMG_CHUNK_SIZE {
            return Err(PayloadError::ChunkTooLarge);
        }
        Ok(ImageChunkPayload {
            image_id: u16::from_le_bytes([raw[0], raw[1]]),
            chunk_index: u16::from_le_bytes([raw[2], raw[3]]),
            data,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageEndPayload {
    pub image_id: u16,
    pub total_chunks: u16,
}

impl ImageEndPayload {
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IMAGE_END_LEN);
        out.extend_from_slice(&self.image_id.to_le_bytes());
        out.extend_from_slice(&self.total_chunks.to_le_bytes());
        out
    }

    pub fn unpack(raw: &[u8]) -> Result<Self, PayloadError> {
        if raw.len() < IMAGE_END_LEN {
            return Err(PayloadError::TooShort);
        }
        Ok(ImageEndPayload {
            image_id: u16::from_le_bytes([raw[0], raw[1]]),
            total_chunks: u16::from_le_bytes([raw[2], raw[3]]),
        })
    }
}

// =============================================================================
// STATUS_RESPONSE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPayload {
    pub node_id: u8,
    pub role: u8,
    pub rssi: i8,
    pub battery: u8,
    pub uptime_s: u32,
    pub motion_count: u32,
    pub images_sent: u32,
    pub mesh_nodes: u8,
}

impl StatusPayload {
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(STATUS_LEN);
        out.push(self.node_id);
        out.push(self.role);
        out.push(self.rssi as u8);
        out.push(self.battery);
        out.extend_from_slice(&self.uptime_s.to_le_bytes());
        out.extend_from_slice(&self.motion_count.to_le_bytes());
        out.extend_from_slice(&self.images_sent.to_le_bytes());
        out.push(self.mesh_nodes);
        out
    }

    pub fn unpack(raw: &[u8]) -> Result<Self, PayloadError> {
        if raw.len() < STATUS_LEN {
            return Err(PayloadError::TooShort);
        }
        Ok(StatusPayload {
            node_id: raw[0],
            role: raw[1],
            rssi: raw[2] as i8,
            battery: raw[3],
            uptime_s: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
            motion_count: u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]),
            images_sent: u32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]),
            mesh_nodes: raw[16],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn heartbeat_roundtrip() {
        let hb = HeartbeatPayload {
            node_id: 4,
            role: ROLE_GATEWAY,
            rssi: -72,
            battery: 93,
            hop_count: 0,
            uptime_s: 86_400,
        };
        let raw = hb.pack();
        assert_eq!(raw.len(), HEARTBEAT_LEN);
        assert_eq!(HeartbeatPayload::unpack(&raw).unwrap(), hb);
    }

    #[test]
    fn heartbeat_too_short() {
        assert_eq!(
            HeartbeatPayload::unpack(&[0; HEARTBEAT_LEN - 1]),
            Err(PayloadError::TooShort)
        );
    }

    #[test]
    fn motion_alert_roundtrip() {
        let alert = MotionAlertPayload {
            timestamp_ms: 0xAABB_CCDD,
            sensor_id: 3,
            image_id: 17,
            has_image: true,
            path: vec![NodeId(3), NodeId(4), NodeId(9)],
        };
        let raw = alert.pack();
        assert_eq!(raw.len(), MOTION_ALERT_LEN);
        assert_eq!(MotionAlertPayload::unpack(&raw).unwrap(), alert);
        // Unused slots are zero.
        assert!(raw[9 + 3 * 2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn motion_alert_legacy_form() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&5000u32.to_le_bytes());
        raw.push(9);
        raw.extend_from_slice(&2u16.to_le_bytes());
        raw.push(1);

        let alert = MotionAlertPayload::unpack(&raw).unwrap();
        assert_eq!(alert.timestamp_ms, 5000);
        assert_eq!(alert.sensor_id, 9);
        assert_eq!(alert.image_id, 2);
        assert!(alert.has_image);
        assert!(alert.path.is_empty());
    }

    #[test]
    fn motion_alert_bad_path_length() {
        let mut raw = MotionAlertPayload {
            timestamp_ms: 0,
            sensor_id: 1,
            image_id: 0,
            has_image: false,
            path: vec![NodeId(1)],
        }
        .pack();
        raw[8] = MAX_PATH_LENGTH as u8 + 1;
        assert_eq!(
            MotionAlertPayload::unpack(&raw),
            Err(PayloadError::PathLengthInvalid)
        );
    }

    #[test]
    fn image_start_roundtrip() {
        let start = ImageStartPayload {
            image_id: 12,
            total_size: 27_000,
            total_chunks: 143,
            capture_ts_ms: 99_000,
        };
        let raw = start.pack();
        assert_eq!(raw.len(), IMAGE_START_LEN);
        assert_eq!(ImageStartPayload::unpack(&raw).unwrap(), start);
    }

    #[test]
    fn image_chunk_view() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&7u16.to_le_bytes());
        raw.extend_from_slice(&2u16.to_le_bytes());
        raw.extend_from_slice(&[0xAA; 20]);

        let chunk = ImageChunkPayload::unpack(&raw).unwrap();
        assert_eq!(chunk.image_id, 7);
        assert_eq!(chunk.chunk_index, 2);
        assert_eq!(chunk.data, &[0xAA; 20][..]);
    }

    #[test]
    fn image_chunk_header_only_is_empty_data() {
        let raw = [1, 0, 0, 0];
        let chunk = ImageChunkPayload::unpack(&raw).unwrap();
        assert!(chunk.data.is_empty());
        assert_eq!(ImageChunkPayload::unpack(&raw[..3]), Err(PayloadError::TooShort));
    }

    #[test]
    fn image_end_roundtrip() {
        let end = ImageEndPayload {
            image_id: 12,
            total_chunks: 3,
        };
        assert_eq!(ImageEndPayload::unpack(&end.pack()).unwrap(), end);
    }

    #[test]
    fn status_roundtrip() {
        let status = StatusPayload {
            node_id: 3,
            role: ROLE_SENSOR,
            rssi: -55,
            battery: 76,
            uptime_s: 3600,
            motion_count: 12,
            images_sent: 4,
            mesh_nodes: 5,
        };
        let raw = status.pack();
        assert_eq!(raw.len(), STATUS_LEN);
        assert_eq!(StatusPayload::unpack(&raw).unwrap(), status);
    }
}
