//! Runtime configuration for a mesh node.

use std::fmt;

use trailmesh_core::constants::*;

/// Recognized options, all defaulted to the deployment values.
///
/// A single config type serves both roles; behavior branches only on the
/// role passed to `MeshNode::new`.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Time between beacons.
    pub heartbeat_interval_ms: u64,
    /// Routing entry lifetime without refresh.
    pub route_timeout_ms: u64,
    /// Sink-side image transfer lifetime.
    pub image_timeout_ms: u64,
    /// Attempts per image chunk.
    pub msg_max_retries: u8,
    /// Delay between chunk retries.
    pub msg_retry_delay_ms: u64,
    /// Data bytes per image chunk.
    pub img_chunk_size: usize,
    /// Chunk budget per image.
    pub img_max_chunks: u16,
    /// Routing table capacity.
    pub max_nodes: usize,
    /// Motion alert path capacity (bounded by the wire format).
    pub max_path_length: usize,
    /// Radio channel.
    pub channel: u8,
    /// Battery percentage advertised in beacons until the host updates it.
    pub battery_level: u8,
}

impl Default for MeshConfig {
    fn default() -> Self {
        MeshConfig {
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            route_timeout_ms: ROUTE_TIMEOUT_MS,
            image_timeout_ms: IMAGE_TIMEOUT_MS,
            msg_max_retries: MSG_MAX_RETRIES,
            msg_retry_delay_ms: MSG_RETRY_DELAY_MS,
            img_chunk_size: IMG_CHUNK_SIZE,
            img_max_chunks: IMG_MAX_CHUNKS,
            max_nodes: MESH_MAX_NODES,
            max_path_length: MAX_PATH_LENGTH,
            channel: MESH_CHANNEL,
            battery_level: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidNodeId(u16),
    InvalidChannel(u8),
    ChunkSizeInvalid(usize),
    PathLengthInvalid(usize),
    ZeroedTimer(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidNodeId(id) => {
                write!(f, "Node id {} outside [{}, {}]", id, NODE_ID_MIN, NODE_ID_MAX)
            }
            ConfigError::InvalidChannel(ch) => write!(f, "Channel {} outside [1, 13]", ch),
            ConfigError::ChunkSizeInvalid(size) => {
                write!(
                    f,
                    "Chunk size {} outside [1, {}]",
                    size,
                    MSG_MAX_PAYLOAD - IMAGE_CHUNK_HEADER_LEN
                )
            }
            ConfigError::PathLengthInvalid(len) => {
                write!(f, "Path length {} exceeds wire capacity {}", len, MAX_PATH_LENGTH)
            }
            ConfigError::ZeroedTimer(name) => write!(f, "{} must be non-zero", name),
        }
    }
}

impl std::error::Error for ConfigError {}

impl MeshConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=13).contains(&self.channel) {
            return Err(ConfigError::InvalidChannel(self.channel));
        }
        if self.img_chunk_size == 0
            || self.img_chunk_size > MSG_MAX_PAYLOAD - IMAGE_CHUNK_HEADER_LEN
        {
            return Err(ConfigError::ChunkSizeInvalid(self.img_chunk_size));
        }
        if self.max_path_length == 0 || self.max_path_length > MAX_PATH_LENGTH {
            return Err(ConfigError::PathLengthInvalid(self.max_path_length));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::ZeroedTimer("heartbeat_interval_ms"));
        }
        if self.route_timeout_ms == 0 {
            return Err(ConfigError::ZeroedTimer("route_timeout_ms"));
        }
        if self.image_timeout_ms == 0 {
            return Err(ConfigError::ZeroedTimer("image_timeout_ms"));
        }
        Ok(())
    }

    /// Largest image `send_image` will accept.
    pub fn max_image_bytes(&self) -> usize {
        self.img_chunk_size * self.img_max_chunks as usize
    }
}
