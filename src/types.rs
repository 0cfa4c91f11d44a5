//! Stream message types shared by the capture, transform, and logging stages.

use std::sync::OnceLock;
use std::time::Instant;

/// Milliseconds elapsed since the first call in this process.
///
/// All stream timestamps use this monotonic base so events from different
/// capture sources can be correlated.
pub fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_millis() as u64
}

/// A single keyboard event from the system-wide listener.
///
/// Immutable once created; shared across subscriber mailboxes as
/// `Arc<KeyEvent>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    /// Virtual key code
    pub vkey: u16,
    /// Hardware scan code (0 when the listener backend doesn't expose one)
    pub scan_code: u16,
    /// True if pressed, false if released
    pub pressed: bool,
    /// Monotonic timestamp in milliseconds
    pub timestamp_ms: u64,
}

/// Pixel format of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Planar Y followed by interleaved UV at half resolution (12 bits/pixel)
    Nv12,
    /// Packed RGB, 3 bytes per pixel
    Rgb,
}

impl PixelFormat {
    /// Byte length of a frame of this format at the given dimensions.
    pub fn frame_len(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Nv12 => pixels * 3 / 2,
            PixelFormat::Rgb => pixels * 3,
        }
    }
}

/// A captured video frame as delivered by the capture source.
///
/// Owned by the capture stage until published, then shared as
/// `Arc<RawFrame>` and freed when the last subscriber drops it.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Source pixel format
    pub format: PixelFormat,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Capture timestamp in monotonic milliseconds
    pub timestamp_ms: u64,
    /// Raw pixel data
    pub data: Vec<u8>,
}

/// Fixed-size header written before each frame payload on disk.
///
/// Serialized as 20 little-endian bytes: timestamp, width, height, payload
/// length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame timestamp in milliseconds
    pub timestamp_ms: u64,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Payload length in bytes
    pub len: u32,
}

impl FrameHeader {
    /// Serialized size in bytes.
    pub const SIZE: usize = 20;

    /// Serialize to the on-disk little-endian layout.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.timestamp_ms.to_le_bytes());
        buf[8..12].copy_from_slice(&self.width.to_le_bytes());
        buf[12..16].copy_from_slice(&self.height.to_le_bytes());
        buf[16..20].copy_from_slice(&self.len.to_le_bytes());
        buf
    }

    /// Deserialize from the on-disk little-endian layout.
    pub fn from_bytes(buf: &[u8; Self::SIZE]) -> Self {
        FrameHeader {
            timestamp_ms: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            width: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            height: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            len: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
        }
    }
}

/// An RGB frame produced by the transform stage.
///
/// Only constructible through [`ProcessedFrame::new`], which derives the
/// header length from the buffer, so `header().len` and `data().len()`
/// always agree.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    header: FrameHeader,
    data: Vec<u8>,
}

impl ProcessedFrame {
    /// Build a frame from its dimensions and pixel buffer.
    pub fn new(timestamp_ms: u64, width: u32, height: u32, data: Vec<u8>) -> Self {
        let header = FrameHeader {
            timestamp_ms,
            width,
            height,
            len: data.len() as u32,
        };
        ProcessedFrame { header, data }
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_ms_is_monotonic() {
        let a = monotonic_ms();
        let b = monotonic_ms();
        assert!(b >= a);
    }

    #[test]
    fn test_frame_len_nv12() {
        assert_eq!(PixelFormat::Nv12.frame_len(1920, 1080), 1920 * 1080 * 3 / 2);
        assert_eq!(PixelFormat::Nv12.frame_len(64, 48), 64 * 48 * 3 / 2);
    }

    #[test]
    fn test_frame_len_rgb() {
        assert_eq!(PixelFormat::Rgb.frame_len(912, 600), 912 * 600 * 3);
    }

    #[test]
    fn test_header_roundtrip() {
        let header = FrameHeader {
            timestamp_ms: 123_456_789,
            width: 912,
            height: 600,
            len: 912 * 600 * 3,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), FrameHeader::SIZE);
        assert_eq!(FrameHeader::from_bytes(&bytes), header);
    }

    #[test]
    fn test_header_layout_is_little_endian() {
        let header = FrameHeader {
            timestamp_ms: 1,
            width: 2,
            height: 3,
            len: 4,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[8], 2);
        assert_eq!(bytes[12], 3);
        assert_eq!(bytes[16], 4);
    }

    #[test]
    fn test_processed_frame_header_matches_buffer() {
        let data = vec![0u8; 32 * 24 * 3];
        let frame = ProcessedFrame::new(42, 32, 24, data);
        assert_eq!(frame.header().len as usize, frame.data().len());
        assert_eq!(frame.header().width, 32);
        assert_eq!(frame.header().height, 24);
        assert_eq!(frame.header().timestamp_ms, 42);
    }
}
