//! Packets of encoded stream data

use std::fmt;

/// Encoded data for one stream, tagged with timestamps.
///
/// A `Packet` is owned by the caller. Reads replace its buffer wholesale;
/// writes copy what they need and leave the packet untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    /// Position of the stream this packet belongs to
    pub stream: usize,
    /// Presentation timestamp in the stream's time base
    pub pts: i64,
    /// Decoding timestamp in the stream's time base
    pub dts: i64,
    /// Duration in the stream's time base, 0 if unknown
    pub duration: i64,
    /// Is this a keyframe?
    pub is_keyframe: bool,
    /// Encoded data
    pub data: Vec<u8>,
}

impl Packet {
    /// Create an empty packet
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a packet for `stream` with identical PTS and DTS
    pub fn with_data(stream: usize, ts: i64, data: Vec<u8>) -> Self {
        Self {
            stream,
            pts: ts,
            dts: ts,
            data,
            ..Self::default()
        }
    }

    /// Size of the encoded data in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Release the held buffer and clear all metadata
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet(stream={}, size={}, pts={}, dts={}, key={})",
            self.stream,
            self.size(),
            self.pts,
            self.dts,
            self.is_keyframe
        )
    }
}
