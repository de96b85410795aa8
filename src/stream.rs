//! Streams and the per-container stream table

use crate::{Codec, Error, MediaKind, Rational, Result};

/// Codec parameters of one stream.
///
/// The container only stores these; interpreting them is up to the
/// format engine the container forwards to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamParams {
    /// Codec of the encoded data
    pub codec: Codec,
    /// Unit of packet timestamps
    pub time_base: Rational,
    /// Frame width (video)
    pub width: u32,
    /// Frame height (video)
    pub height: u32,
    /// Sample rate in Hz (audio)
    pub sample_rate: u32,
    /// Channel count (audio)
    pub channels: u16,
    /// Codec-specific configuration data (e.g., SPS for H.264)
    pub codec_config: Option<Vec<u8>>,
    /// Picture Parameter Set (PPS for H.264)
    pub pps: Option<Vec<u8>>,
}

impl StreamParams {
    pub fn video(codec: Codec, width: u32, height: u32, time_base: Rational) -> Self {
        Self {
            codec,
            time_base,
            width,
            height,
            ..Self::default()
        }
    }

    pub fn audio(codec: Codec, sample_rate: u32, channels: u16) -> Self {
        Self {
            codec,
            time_base: Rational::new(1, sample_rate.max(1) as i32),
            sample_rate,
            channels,
            ..Self::default()
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.codec.kind()
    }
}

/// One elementary stream inside a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    position: usize,
    format_id: i32,
    params: StreamParams,
}

impl Stream {
    /// 0-based index, stable for the container's lifetime
    pub fn position(&self) -> usize {
        self.position
    }

    /// Format-dependent identifier (track number, track id, ...)
    pub fn format_id(&self) -> i32 {
        self.format_id
    }

    pub fn params(&self) -> &StreamParams {
        &self.params
    }

    /// Parameters are only read by the muxer when the header (or, for
    /// streams added later, the first packet) is written.
    pub fn params_mut(&mut self) -> &mut StreamParams {
        &mut self.params
    }

    pub fn codec(&self) -> Codec {
        self.params.codec
    }

    pub fn time_base(&self) -> Rational {
        self.params.time_base
    }
}

/// Ordered registry of a container's streams. Positions are 0..N-1 with no gaps.
#[derive(Debug, Default)]
pub struct StreamTable {
    streams: Vec<Stream>,
}

impl StreamTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stream at the next position.
    ///
    /// With `unique_ids` set, a `format_id` already present is rejected.
    pub fn add(&mut self, format_id: i32, params: StreamParams, unique_ids: bool) -> Result<&mut Stream> {
        if unique_ids && self.streams.iter().any(|s| s.format_id == format_id) {
            return Err(Error::DuplicateStreamId(format_id));
        }

        let position = self.streams.len();
        self.streams.push(Stream {
            position,
            format_id,
            params,
        });
        Ok(&mut self.streams[position])
    }

    pub fn get(&self, position: usize) -> Option<&Stream> {
        self.streams.get(position)
    }

    pub fn get_mut(&mut self, position: usize) -> Option<&mut Stream> {
        self.streams.get_mut(position)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn as_slice(&self) -> &[Stream] {
        &self.streams
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Stream> {
        self.streams.iter()
    }

    pub fn clear(&mut self) {
        self.streams.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_are_sequential() {
        let mut table = StreamTable::new();
        for id in [7, 3, 9] {
            table.add(id, StreamParams::default(), false).unwrap();
        }

        let positions: Vec<_> = table.iter().map(|s| s.position()).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(table.get(1).unwrap().format_id(), 3);
        assert!(table.get(3).is_none());
    }

    #[test]
    fn test_duplicate_ids() {
        let mut table = StreamTable::new();
        table.add(1, StreamParams::default(), true).unwrap();

        assert!(matches!(
            table.add(1, StreamParams::default(), true),
            Err(Error::DuplicateStreamId(1))
        ));
        assert_eq!(table.len(), 1);

        // formats without the rule accept repeats
        table.add(1, StreamParams::default(), false).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_audio_params_use_sample_rate_time_base() {
        let params = StreamParams::audio(Codec::Opus, 48000, 2);
        assert_eq!(params.time_base, Rational::new(1, 48000));
        assert_eq!(params.kind(), MediaKind::Audio);
    }
}
