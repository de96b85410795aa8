//! WebM / Matroska demuxer

use super::{Demuxer, DiscoveredStream};
use crate::muxer::webm::codec_from_id;
use crate::{Error, Packet, Rational, Result, StreamParams};
use matroska_demuxer::{Frame, MatroskaFile};
use std::collections::HashMap;
use std::io::{Read, Seek};
use std::time::Duration;

/// A TrackEntry, registered as a stream once announced
struct Track {
    number: u64,
    params: StreamParams,
}

/// WebM demuxer on top of `matroska_demuxer`.
///
/// Frame timestamps are kept in TimestampScale units; every stream gets the
/// matching time base.
pub struct WebmDemuxer<R: Read + Seek + Send> {
    file: MatroskaFile<R>,
    frame: Frame,
    duration: Option<Duration>,
    tracks: Vec<Track>,
    positions: HashMap<u64, usize>,
    new_streams: Vec<DiscoveredStream>,
}

impl<R: Read + Seek + Send> WebmDemuxer<R> {
    /// Parse the EBML header, Info and Tracks
    pub fn new(reader: R) -> Result<Self> {
        let file = MatroskaFile::open(reader)
            .map_err(|e| Error::Format(format!("Failed to open WebM file: {}", e)))?;

        let scale = file.info().timestamp_scale().get();
        let time_base = i32::try_from(scale)
            .map(|scale| Rational::new(scale, 1_000_000_000).reduced())
            .map_err(|_| Error::Format(format!("WebM timestamp scale {} is too large", scale)))?;
        let duration = file
            .info()
            .duration()
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(|d| Duration::from_nanos((d * scale as f64) as u64));

        let mut tracks: Vec<Track> = Vec::with_capacity(file.tracks().len());
        for entry in file.tracks() {
            let number = entry.track_number().get();
            if tracks.iter().any(|t| t.number == number) {
                log::warn!("Ignoring duplicate WebM track {}", number);
                continue;
            }
            tracks.push(Track {
                number,
                params: track_params(entry, time_base)?,
            });
        }

        Ok(Self {
            file,
            frame: Frame::default(),
            duration,
            tracks,
            positions: HashMap::new(),
            new_streams: Vec::new(),
        })
    }

    /// Position of a track, registering it on first sight
    fn position_for(&mut self, number: u64) -> Option<usize> {
        if let Some(position) = self.positions.get(&number) {
            return Some(*position);
        }
        let index = self.tracks.iter().position(|t| t.number == number)?;
        Some(self.announce(index))
    }

    fn announce(&mut self, index: usize) -> usize {
        let track = &self.tracks[index];
        let position = self.positions.len();
        self.new_streams.push(DiscoveredStream {
            format_id: i32::try_from(track.number).unwrap_or(i32::MAX),
            params: track.params.clone(),
        });
        self.positions.insert(track.number, position);
        position
    }
}

impl<R: Read + Seek + Send> Demuxer for WebmDemuxer<R> {
    fn read_header(&mut self, find_all_streams: bool) -> Result<()> {
        // Tracks were parsed by `new`; only registration is deferred
        if find_all_streams {
            for index in 0..self.tracks.len() {
                if !self.positions.contains_key(&self.tracks[index].number) {
                    self.announce(index);
                }
            }
        }
        Ok(())
    }

    fn take_new_streams(&mut self) -> Vec<DiscoveredStream> {
        std::mem::take(&mut self.new_streams)
    }

    fn read_packet(&mut self, packet: &mut Packet) -> Result<()> {
        loop {
            let more = self
                .file
                .next_frame(&mut self.frame)
                .map_err(|e| Error::Demux(format!("Failed to read WebM frame: {}", e)))?;
            if !more {
                return Err(Error::EndOfStream);
            }

            let Some(position) = self.position_for(self.frame.track) else {
                log::debug!("Skipping frame for undeclared WebM track {}", self.frame.track);
                continue;
            };

            let timestamp = i64::try_from(self.frame.timestamp).map_err(|_| {
                Error::Format(format!(
                    "WebM timestamp {} on track {} is out of range",
                    self.frame.timestamp, self.frame.track
                ))
            })?;
            let duration = match self.frame.duration {
                Some(duration) => i64::try_from(duration).map_err(|_| {
                    Error::Format(format!("WebM block duration {} is out of range", duration))
                })?,
                None => 0,
            };

            packet.stream = position;
            packet.pts = timestamp;
            packet.dts = timestamp;
            packet.duration = duration;
            // BlockGroups without a reference carry no flag and are keyframes
            packet.is_keyframe = self.frame.is_keyframe.unwrap_or(true);
            packet.data = std::mem::take(&mut self.frame.data);
            return Ok(());
        }
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }
}

fn track_params(entry: &matroska_demuxer::TrackEntry, time_base: Rational) -> Result<StreamParams> {
    let out_of_range = |what: &str, value: u64| {
        Error::Format(format!(
            "WebM track {} {} {} is out of range",
            entry.track_number(),
            what,
            value
        ))
    };

    let mut params = StreamParams {
        codec: codec_from_id(entry.codec_id()),
        time_base,
        codec_config: entry.codec_private().map(<[u8]>::to_vec),
        ..StreamParams::default()
    };

    if let Some(video) = entry.video() {
        let width = video.pixel_width().get();
        let height = video.pixel_height().get();
        params.width = u32::try_from(width).map_err(|_| out_of_range("width", width))?;
        params.height = u32::try_from(height).map_err(|_| out_of_range("height", height))?;
    }
    if let Some(audio) = entry.audio() {
        let channels = audio.channels().get();
        params.sample_rate = audio.sampling_frequency() as u32;
        params.channels = u16::try_from(channels).map_err(|_| out_of_range("channel count", channels))?;
    }
    Ok(params)
}
