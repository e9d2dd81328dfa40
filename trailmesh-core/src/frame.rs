use alloc::vec::Vec;
use core::fmt;

use crate::constants::*;
use crate::payload::{HeartbeatPayload, ImageStartPayload, MotionAlertPayload};
use crate::types::{NodeId, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    TooShort,
    PayloadTooLarge,
    PayloadLengthInvalid,
    ChecksumMismatch,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::TooShort => write!(f, "Frame too short"),
            FrameError::PayloadTooLarge => write!(f, "Payload exceeds {} bytes", MSG_MAX_PAYLOAD),
            FrameError::PayloadLengthInvalid => write!(f, "Payload length field invalid"),
            FrameError::ChecksumMismatch => write!(f, "Checksum mismatch"),
        }
    }
}

/// Message classes with fixed wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Heartbeat,
    MotionAlert,
    ImageStart,
    ImageChunk,
    ImageEnd,
    Ack,
    Nack,
    Discover,
    DiscoverResp,
    StatusRequest,
    StatusResponse,
    Command,
}

impl MessageType {
    pub fn to_wire(self) -> u8 {
        match self {
            MessageType::Heartbeat => MSG_TYPE_HEARTBEAT,
            MessageType::MotionAlert => MSG_TYPE_MOTION_ALERT,
            MessageType::ImageStart => MSG_TYPE_IMAGE_START,
            MessageType::ImageChunk => MSG_TYPE_IMAGE_CHUNK,
            MessageType::ImageEnd => MSG_TYPE_IMAGE_END,
            MessageType::Ack => MSG_TYPE_ACK,
            MessageType::Nack => MSG_TYPE_NACK,
            MessageType::Discover => MSG_TYPE_DISCOVER,
            MessageType::DiscoverResp => MSG_TYPE_DISCOVER_RESP,
            MessageType::StatusRequest => MSG_TYPE_STATUS_REQUEST,
            MessageType::StatusResponse => MSG_TYPE_STATUS_RESPONSE,
            MessageType::Command => MSG_TYPE_COMMAND,
        }
    }

    pub fn from_wire(val: u8) -> Option<Self> {
        match val {
            MSG_TYPE_HEARTBEAT => Some(MessageType::Heartbeat),
            MSG_TYPE_MOTION_ALERT => Some(MessageType::MotionAlert),
            MSG_TYPE_IMAGE_START => Some(MessageType::ImageStart),
            MSG_TYPE_IMAGE_CHUNK => Some(MessageType::ImageChunk),
            MSG_TYPE_IMAGE_END => Some(MessageType::ImageEnd),
            MSG_TYPE_ACK => Some(MessageType::Ack),
            MSG_TYPE_NACK => Some(MessageType::Nack),
            MSG_TYPE_DISCOVER => Some(MessageType::Discover),
            MSG_TYPE_DISCOVER_RESP => Some(MessageType::DiscoverResp),
            MSG_TYPE_STATUS_REQUEST => Some(MessageType::StatusRequest),
            MSG_TYPE_STATUS_RESPONSE => Some(MessageType::StatusResponse),
            MSG_TYPE_COMMAND => Some(MessageType::Command),
            _ => None,
        }
    }

    /// Whether delivery of this class is acknowledged back to the source.
    pub fn wants_ack(self) -> bool {
        matches!(
            self,
            MessageType::MotionAlert | MessageType::ImageStart | MessageType::ImageEnd
        )
    }
}

// =============================================================================
// FrameHeader: fixed 10-byte packed header
// =============================================================================

/// Wire layout, little-endian:
/// ```text
/// source_id:u16  dest_id:u16  message_type:u8  sequence:u16  chunk_index:u16  checksum:u8
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub source: NodeId,
    pub dest: NodeId,
    pub message_type: u8,
    pub sequence: u16,
    pub chunk_index: u16,
    pub checksum: u8,
}

impl FrameHeader {
    /// Serialize the header into its 10-byte wire form.
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.source.0.to_le_bytes());
        out.extend_from_slice(&self.dest.0.to_le_bytes());
        out.push(self.message_type);
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out.extend_from_slice(&self.chunk_index.to_le_bytes());
        out.push(self.checksum);
    }

    fn read(raw: &[u8]) -> FrameHeader {
        FrameHeader {
            source: NodeId(u16::from_le_bytes([raw[0], raw[1]])),
            dest: NodeId(u16::from_le_bytes([raw[2], raw[3]])),
            message_type: raw[4],
            sequence: u16::from_le_bytes([raw[5], raw[6]]),
            chunk_index: u16::from_le_bytes([raw[7], raw[8]]),
            checksum: raw[9],
        }
    }
}

// =============================================================================
// Frame: header + payload
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a frame with an empty payload and a valid checksum.
    pub fn new(source: NodeId, dest: NodeId, message_type: MessageType, sequence: u16) -> Frame {
        let mut frame = Frame {
            header: FrameHeader {
                source,
                dest,
                message_type: message_type.to_wire(),
                sequence,
                chunk_index: 0,
                checksum: 0,
            },
            payload: Vec::new(),
        };
        frame.recompute_checksum();
        frame
    }

    /// Replace the payload and update the checksum.
    pub fn set_payload(&mut self, payload: Vec<u8>) -> Result<(), FrameError> {
        if payload.len() > MSG_MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge);
        }
        self.payload = payload;
        self.recompute_checksum();
        Ok(())
    }

    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_wire(self.header.message_type)
    }

    /// 8-bit XOR over the header (excluding the checksum byte) and the payload.
    pub fn compute_checksum(&self) -> u8 {
        let mut checksum = 0u8;
        for b in self.header.source.0.to_le_bytes() {
            checksum ^= b;
        }
        for b in self.header.dest.0.to_le_bytes() {
            checksum ^= b;
        }
        checksum ^= self.header.message_type;
        for b in self.header.sequence.to_le_bytes() {
            checksum ^= b;
        }
        for b in self.header.chunk_index.to_le_bytes() {
            checksum ^= b;
        }
        for b in &self.payload {
            checksum ^= b;
        }
        checksum
    }

    /// Must be called after any in-place payload mutation (notably path append).
    pub fn recompute_checksum(&mut self) {
        self.header.checksum = self.compute_checksum();
    }

    pub fn verify_checksum(&self) -> bool {
        self.compute_checksum() == self.header.checksum
    }

    /// Serialize to `[header:10][payload_length:1][payload]`.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        if self.payload.len() > MSG_MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge);
        }
        let mut out = Vec::with_capacity(FRAME_OVERHEAD + self.payload.len());
        self.header.write(&mut out);
        out.push(self.payload.len() as u8);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Parse and checksum-verify a received datagram.
    pub fn decode(raw: &[u8]) -> Result<Frame, FrameError> {
        if raw.len() < FRAME_OVERHEAD {
            return Err(FrameError::TooShort);
        }
        let header = FrameHeader::read(raw);
        let payload_length = raw[MSG_HEADER_SIZE] as usize;
        if payload_length > MSG_MAX_PAYLOAD {
            return Err(FrameError::PayloadLengthInvalid);
        }
        if raw.len() < FRAME_OVERHEAD + payload_length {
            return Err(FrameError::TooShort);
        }
        let frame = Frame {
            header,
            payload: raw[FRAME_OVERHEAD..FRAME_OVERHEAD + payload_length].to_vec(),
        };
        if !frame.verify_checksum() {
            return Err(FrameError::ChecksumMismatch);
        }
        Ok(frame)
    }

    // =========================================================================
    // Typed constructors
    // =========================================================================

    pub fn heartbeat(
        source: NodeId,
        role: Role,
        rssi: i8,
        battery: u8,
        hop_count: u8,
        uptime_s: u32,
        sequence: u16,
    ) -> Frame {
        let mut frame = Frame::new(source, NodeId::BROADCAST, MessageType::Heartbeat, sequence);
        let payload = HeartbeatPayload {
            node_id: source.0 as u8,
            role: role.to_wire(),
            rssi,
            battery,
            hop_count,
            uptime_s,
        };
        // Fixed 9-byte payload, cannot exceed the budget.
        let _ = frame.set_payload(payload.pack());
        frame
    }

    /// Motion alert addressed to the gateway, with the path seeded to the
    /// originator. The low byte of the source id doubles as the sensor id.
    pub fn motion_alert(
        source: NodeId,
        timestamp_ms: u32,
        image_id: u16,
        has_image: bool,
        sequence: u16,
    ) -> Frame {
        let mut frame = Frame::new(source, NodeId::GATEWAY, MessageType::MotionAlert, sequence);
        let payload = MotionAlertPayload {
            timestamp_ms,
            sensor_id: source.0 as u8,
            image_id,
            has_image,
            path: alloc::vec![source],
        };
        let _ = frame.set_payload(payload.pack());
        frame
    }

    pub fn image_start(
        source: NodeId,
        image_id: u16,
        total_size: u32,
        total_chunks: u16,
        capture_ts_ms: u32,
        sequence: u16,
    ) -> Frame {
        let mut frame = Frame::new(source, NodeId::GATEWAY, MessageType::ImageStart, sequence);
        let payload = ImageStartPayload {
            image_id,
            total_size,
            total_chunks,
            capture_ts_ms,
        };
        let _ = frame.set_payload(payload.pack());
        frame
    }

    pub fn image_chunk(
        source: NodeId,
        image_id: u16,
        chunk_index: u16,
        data: &[u8],
        sequence: u16,
    ) -> Result<Frame, FrameError> {
        if data.len() > IMG_CHUNK_SIZE {
            return Err(FrameError::PayloadTooLarge);
        }
        let mut frame = Frame::new(source, NodeId::GATEWAY, MessageType::ImageChunk, sequence);
        frame.header.chunk_index = chunk_index;
        let mut payload = Vec::with_capacity(IMAGE_CHUNK_HEADER_LEN + data.len());
        payload.extend_from_slice(&image_id.to_le_bytes());
        payload.extend_from_slice(&chunk_index.to_le_bytes());
        payload.extend_from_slice(data);
        frame.set_payload(payload)?;
        Ok(frame)
    }

    pub fn image_end(source: NodeId, image_id: u16, total_chunks: u16, sequence: u16) -> Frame {
        let mut frame = Frame::new(source, NodeId::GATEWAY, MessageType::ImageEnd, sequence);
        let mut payload = Vec::with_capacity(IMAGE_END_LEN);
        payload.extend_from_slice(&image_id.to_le_bytes());
        payload.extend_from_slice(&total_chunks.to_le_bytes());
        let _ = frame.set_payload(payload);
        frame
    }

    /// Acknowledgement: the acked sequence rides in the header, payload empty.
    pub fn ack(source: NodeId, dest: NodeId, sequence: u16) -> Frame {
        Frame::new(source, dest, MessageType::Ack, sequence)
    }

    // =========================================================================
    // Path annotation
    // =========================================================================

    /// Append a relay's id to a motion alert's path, in place.
    ///
    /// Returns true when the node is the last path entry afterwards (appended
    /// now, or already there). Legacy alerts without path fields and full
    /// paths are left untouched and return false.
    pub fn append_to_path(&mut self, node: NodeId) -> bool {
        if self.header.message_type != MSG_TYPE_MOTION_ALERT {
            return false;
        }
        if self.payload.len() < MOTION_ALERT_LEN {
            // Legacy format without path tracking; forward unchanged.
            return false;
        }

        let path_length = self.payload[8] as usize;
        if path_length >= 1 && path_length <= MAX_PATH_LENGTH {
            let last_at = 9 + (path_length - 1) * 2;
            let last = u16::from_le_bytes([self.payload[last_at], self.payload[last_at + 1]]);
            if last == node.0 {
                return true;
            }
        }
        if path_length >= MAX_PATH_LENGTH {
            return false;
        }

        let slot = 9 + path_length * 2;
        let bytes = node.0.to_le_bytes();
        self.payload[slot] = bytes[0];
        self.payload[slot + 1] = bytes[1];
        self.payload[8] = (path_length + 1) as u8;
        self.recompute_checksum();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let frame = Frame::new(NodeId(0x0102), NodeId(0x0304), MessageType::Command, 0x0506);
        let raw = frame.encode().unwrap();
        assert_eq!(raw.len(), FRAME_OVERHEAD);
        // Little-endian field order.
        assert_eq!(&raw[0..2], &[0x02, 0x01]); // source
        assert_eq!(&raw[2..4], &[0x04, 0x03]); // dest
        assert_eq!(raw[4], MSG_TYPE_COMMAND);
        assert_eq!(&raw[5..7], &[0x06, 0x05]); // sequence
        assert_eq!(&raw[7..9], &[0x00, 0x00]); // chunk index
        assert_eq!(raw[10], 0); // payload length
    }

    #[test]
    fn motion_alert_roundtrip() {
        let frame = Frame::motion_alert(NodeId(7), 0x1122_3344, 0x0005, true, 42);
        let raw = frame.encode().unwrap();
        assert_eq!(raw.len(), FRAME_OVERHEAD + MOTION_ALERT_LEN);

        let decoded = Frame::decode(&raw).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.header.source, NodeId(7));
        assert_eq!(decoded.header.dest, NodeId::GATEWAY);
        assert_eq!(decoded.message_type(), Some(MessageType::MotionAlert));

        let alert = MotionAlertPayload::unpack(&decoded.payload).unwrap();
        assert_eq!(alert.timestamp_ms, 0x1122_3344);
        assert_eq!(alert.sensor_id, 7);
        assert_eq!(alert.image_id, 5);
        assert!(alert.has_image);
        assert_eq!(alert.path, alloc::vec![NodeId(7)]);
    }

    #[test]
    fn constructed_frames_verify() {
        let frames = [
            Frame::heartbeat(NodeId(3), Role::Sensor, -61, 88, 2, 120, 1),
            Frame::motion_alert(NodeId(3), 1000, 1, false, 2),
            Frame::image_start(NodeId(3), 1, 400, 3, 1000, 3),
            Frame::image_chunk(NodeId(3), 1, 0, &[0xAB; 190], 4).unwrap(),
            Frame::image_end(NodeId(3), 1, 3, 5),
            Frame::ack(NodeId(1), NodeId(3), 2),
        ];
        for frame in frames {
            let raw = frame.encode().unwrap();
            assert_eq!(Frame::decode(&raw).unwrap(), frame);
        }
    }

    #[test]
    fn ack_carries_sequence_in_header() {
        let ack = Frame::ack(NodeId(1), NodeId(3), 0xBEEF);
        assert_eq!(ack.header.sequence, 0xBEEF);
        assert!(ack.payload.is_empty());
        assert!(ack.verify_checksum());
    }

    #[test]
    fn decode_too_short() {
        assert_eq!(Frame::decode(&[0u8; 5]), Err(FrameError::TooShort));
        // Header present but payload truncated.
        let mut raw = Frame::motion_alert(NodeId(7), 0, 0, false, 1).encode().unwrap();
        raw.truncate(20);
        assert_eq!(Frame::decode(&raw), Err(FrameError::TooShort));
    }

    #[test]
    fn decode_payload_length_invalid() {
        let mut raw = Frame::ack(NodeId(1), NodeId(2), 1).encode().unwrap();
        raw[MSG_HEADER_SIZE] = 201;
        assert_eq!(Frame::decode(&raw), Err(FrameError::PayloadLengthInvalid));
    }

    #[test]
    fn single_bit_flip_fails_checksum() {
        let raw = Frame::motion_alert(NodeId(7), 0x1122_3344, 5, true, 9)
            .encode()
            .unwrap();
        for i in 0..MSG_HEADER_SIZE {
            if i == 9 {
                continue; // flipping the checksum byte itself also mismatches
            }
            let mut corrupted = raw.clone();
            corrupted[i] ^= 0x01;
            assert_eq!(Frame::decode(&corrupted), Err(FrameError::ChecksumMismatch));
        }
        let mut corrupted = raw.clone();
        corrupted[9] ^= 0x01;
        assert_eq!(Frame::decode(&corrupted), Err(FrameError::ChecksumMismatch));
    }

    #[test]
    fn encode_rejects_oversize_payload() {
        let mut frame = Frame::new(NodeId(1), NodeId(2), MessageType::Command, 1);
        assert_eq!(
            frame.set_payload(alloc::vec![0u8; MSG_MAX_PAYLOAD + 1]),
            Err(FrameError::PayloadTooLarge)
        );
        assert!(frame.set_payload(alloc::vec![0u8; MSG_MAX_PAYLOAD]).is_ok());
        assert_eq!(frame.encode().unwrap().len(), MSG_MAX_FRAME);
    }

    #[test]
    fn append_to_path_appends_and_reverifies() {
        let mut frame = Frame::motion_alert(NodeId(3), 0, 0, false, 1);
        assert!(frame.append_to_path(NodeId(4)));
        assert!(frame.verify_checksum());

        let alert = MotionAlertPayload::unpack(&frame.payload).unwrap();
        assert_eq!(alert.path, alloc::vec![NodeId(3), NodeId(4)]);
    }

    #[test]
    fn append_to_path_noop_when_already_last() {
        let mut frame = Frame::motion_alert(NodeId(3), 0, 0, false, 1);
        assert!(frame.append_to_path(NodeId(4)));
        let before = frame.clone();
        assert!(frame.append_to_path(NodeId(4)));
        assert_eq!(frame, before);
    }

    #[test]
    fn append_to_path_refuses_when_full() {
        let mut frame = Frame::motion_alert(NodeId(1), 0, 0, false, 1);
        for id in 2..=(MAX_PATH_LENGTH as u16) {
            assert!(frame.append_to_path(NodeId(id)));
        }
        let before = frame.clone();
        assert!(!frame.append_to_path(NodeId(99)));
        assert_eq!(frame, before);
    }

    #[test]
    fn append_to_path_refuses_legacy_payload() {
        let mut frame = Frame::new(NodeId(3), NodeId::GATEWAY, MessageType::MotionAlert, 1);
        // Legacy 8-byte alert: timestamp + sensor_id + image_id + has_image.
        let mut payload = Vec::new();
        payload.extend_from_slice(&1000u32.to_le_bytes());
        payload.push(3);
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.push(0);
        frame.set_payload(payload).unwrap();

        let before = frame.clone();
        assert!(!frame.append_to_path(NodeId(4)));
        assert_eq!(frame, before);
    }
}
