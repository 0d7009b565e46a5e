//! Default sizes and configuration constants.
//!
//! Slot sizes are based on typical data units in broadcast tool chains:
//! - Transport stream: 188-byte packets, usually carried 7 per datagram
//! - RTP: one MTU-sized datagram per buffer
//! - Audio: 48kHz stereo float32, 1024 samples
//! - Video: 1080p YUV420 frames
//!
//! # Usage
//!
//! ```rust
//! use pipework::config::PoolConfig;
//! use pipework::memory::defaults;
//!
//! let config = PoolConfig::new(defaults::RTP_SLOT_SIZE, defaults::DEFAULT_POOL_DEPTH);
//! assert!(config.validate().is_ok());
//! ```

// =============================================================================
// Slot Sizes (bytes)
// =============================================================================

/// Default buffer size when nothing more specific is known.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Size of one MPEG transport stream packet.
pub const TS_PACKET_SIZE: usize = 188;

/// Seven TS packets, the usual UDP/RTP payload.
pub const TS_DATAGRAM_SLOT_SIZE: usize = 7 * TS_PACKET_SIZE;

/// One Ethernet MTU worth of RTP datagram.
pub const RTP_SLOT_SIZE: usize = 1500;

/// Audio buffers (48kHz stereo float32, 1024 samples).
pub const AUDIO_SLOT_SIZE: usize = 1024 * 2 * 4;

/// 1080p YUV420 video frames (1920 * 1080 * 3/2).
pub const VIDEO_1080P_YUV420_SLOT_SIZE: usize = 1920 * 1080 * 3 / 2;

// =============================================================================
// Pool and Queue Depths
// =============================================================================

/// Default number of recycled buffers a pool keeps.
pub const DEFAULT_POOL_DEPTH: usize = 32;

/// Default capacity of a cross-thread queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 255;

/// Default number of buffers a queue source forwards per scheduling callback.
pub const DEFAULT_QUEUE_BURST: usize = 64;

// =============================================================================
// Lock-free tuning
// =============================================================================

/// How many times a FIFO consumer re-checks a reserved but unpublished slot
/// before reporting the queue as empty for now.
pub const PUBLISH_SPIN_LIMIT: usize = 64;
