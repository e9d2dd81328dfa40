// =============================================================================
// Trailmesh protocol constants
// =============================================================================

// --- Addressing ---

/// Wire address of "the gateway, whichever it is".
pub const GATEWAY_ID: u16 = 0x0000;

/// Wire broadcast address.
pub const BROADCAST_ID: u16 = 0xFFFF;

/// Smallest assignable device id.
pub const NODE_ID_MIN: u16 = 1;

/// Largest assignable device id.
pub const NODE_ID_MAX: u16 = 254;

// --- Roles ---

pub const ROLE_SENSOR: u8 = 0;
pub const ROLE_GATEWAY: u8 = 1;

// --- Message types ---

pub const MSG_TYPE_HEARTBEAT: u8 = 0x01;
pub const MSG_TYPE_MOTION_ALERT: u8 = 0x02;
pub const MSG_TYPE_IMAGE_START: u8 = 0x10;
pub const MSG_TYPE_IMAGE_CHUNK: u8 = 0x11;
pub const MSG_TYPE_IMAGE_END: u8 = 0x12;
pub const MSG_TYPE_ACK: u8 = 0x20;
pub const MSG_TYPE_NACK: u8 = 0x21;
pub const MSG_TYPE_DISCOVER: u8 = 0x30;
pub const MSG_TYPE_DISCOVER_RESP: u8 = 0x31;
pub const MSG_TYPE_STATUS_REQUEST: u8 = 0x40;
pub const MSG_TYPE_STATUS_RESPONSE: u8 = 0x41;
pub const MSG_TYPE_COMMAND: u8 = 0x50;

// --- Frame layout ---

/// Fixed header: source(2) + dest(2) + type(1) + sequence(2) + chunk_index(2) + checksum(1).
pub const MSG_HEADER_SIZE: usize = 10;

/// Maximum payload bytes per frame.
pub const MSG_MAX_PAYLOAD: usize = 200;

/// Serialized overhead: header plus the payload_length byte.
pub const FRAME_OVERHEAD: usize = MSG_HEADER_SIZE + 1;

/// Largest serialized frame; fits the 250-byte datagram MTU with headroom.
pub const MSG_MAX_FRAME: usize = FRAME_OVERHEAD + MSG_MAX_PAYLOAD;

// --- Payload layouts ---

/// Maximum number of node ids carried in a motion alert path.
pub const MAX_PATH_LENGTH: usize = 8;

/// node_id(1) + role(1) + rssi(1) + battery(1) + hop_count(1) + uptime_s(4).
pub const HEARTBEAT_LEN: usize = 9;

/// timestamp(4) + sensor_id(1) + image_id(2) + has_image(1) + path_length(1) + path(16).
pub const MOTION_ALERT_LEN: usize = 8 + 1 + 2 * MAX_PATH_LENGTH;

/// Legacy motion alert without path fields: timestamp(4) + sensor_id(1) + image_id(2) + has_image(1).
pub const MOTION_ALERT_LEGACY_LEN: usize = 8;

/// image_id(2) + total_size(4) + total_chunks(2) + capture_ts_ms(4).
pub const IMAGE_START_LEN: usize = 12;

/// image_id(2) + chunk_index(2), before the chunk data.
pub const IMAGE_CHUNK_HEADER_LEN: usize = 4;

/// image_id(2) + total_chunks(2).
pub const IMAGE_END_LEN: usize = 4;

/// node_id(1) + role(1) + rssi(1) + battery(1) + uptime_s(4) + motion_count(4)
/// + images_sent(4) + mesh_nodes(1).
pub const STATUS_LEN: usize = 17;

// --- Image transfer ---

/// Data bytes per image chunk.
pub const IMG_CHUNK_SIZE: usize = 190;

/// Maximum chunks per image.
pub const IMG_MAX_CHUNKS: u16 = 150;

/// Largest transferable image in bytes.
pub const IMG_MAX_BYTES: usize = IMG_CHUNK_SIZE * IMG_MAX_CHUNKS as usize;

// --- Routing ---

/// Routing table capacity.
pub const MESH_MAX_NODES: usize = 16;

/// Advertised hop count meaning "no route to the gateway".
pub const HOP_COUNT_UNREACHABLE: u8 = 0xFF;

/// Signal indicator recorded when a frame carries no measurement.
pub const RSSI_ASSUMED: i8 = -50;

/// Duplicate suppression ring capacity.
pub const SEEN_RING_SIZE: usize = 32;

// --- Default timing (milliseconds) ---

pub const HEARTBEAT_INTERVAL_MS: u64 = 10_000;
pub const ROUTE_TIMEOUT_MS: u64 = 30_000;
pub const IMAGE_TIMEOUT_MS: u64 = 30_000;
pub const MSG_RETRY_DELAY_MS: u64 = 100;
pub const SEND_TIMEOUT_MS: u64 = 100;
pub const CHUNK_PACING_MS: u64 = 10;

/// Attempts per image chunk before the transfer aborts.
pub const MSG_MAX_RETRIES: u8 = 3;

/// Default radio channel.
pub const MESH_CHANNEL: u8 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_sizes() {
        // Header is 10 bytes, one length byte, 200 payload bytes max.
        assert_eq!(FRAME_OVERHEAD, 11);
        assert_eq!(MSG_MAX_FRAME, 211);

        // Payload layouts.
        assert_eq!(HEARTBEAT_LEN, 9);
        assert_eq!(MOTION_ALERT_LEN, 25);
        assert_eq!(IMAGE_START_LEN, 12);
        assert_eq!(STATUS_LEN, 17);

        // A full chunk still fits the payload budget.
        assert!(IMAGE_CHUNK_HEADER_LEN + IMG_CHUNK_SIZE <= MSG_MAX_PAYLOAD);

        // ~28 KB image ceiling.
        assert_eq!(IMG_MAX_BYTES, 28_500);
    }

    #[test]
    fn address_space() {
        assert!(NODE_ID_MIN > GATEWAY_ID);
        assert!((NODE_ID_MAX as u32) < BROADCAST_ID as u32);
    }
}
