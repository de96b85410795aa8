//! MP4 container demuxer

use super::{Demuxer, DiscoveredStream};
use crate::rational::compare_ts;
use crate::{Codec, Error, Packet, Rational, Result, StreamParams};
use mp4::{Mp4Reader, Mp4Sample};
use std::cmp::Ordering;
use std::io::{Read, Seek};
use std::time::Duration;

/// Read position within one track
struct TrackCursor {
    track_id: u32,
    time_base: Rational,
    params: StreamParams,
    sample_count: u32,
    next_sample: u32,
    peeked: Option<Mp4Sample>,
    position: Option<usize>,
}

/// MP4 demuxer.
///
/// MP4 keeps samples per track, so packets are merged across tracks by
/// sample start time, which is how muxers lay out interleaved chunks.
pub struct Mp4Demuxer<R: Read + Seek + Send> {
    reader: Mp4Reader<R>,
    tracks: Vec<TrackCursor>,
    new_streams: Vec<DiscoveredStream>,
    announced: usize,
}

impl<R: Read + Seek + Send> Mp4Demuxer<R> {
    /// Parse the `moov` box of a resource of `size` bytes
    pub fn new(reader: R, size: u64) -> Result<Self> {
        let reader = Mp4Reader::read_header(reader, size)
            .map_err(|e| Error::Demux(format!("Failed to read MP4 header: {}", e)))?;

        let mut track_ids: Vec<u32> = reader.tracks().keys().copied().collect();
        track_ids.sort_unstable();

        let mut tracks = Vec::with_capacity(track_ids.len());
        for track_id in track_ids {
            let Some(track) = reader.tracks().get(&track_id) else {
                continue;
            };
            let timescale = track.timescale();
            if timescale == 0 || timescale > i32::MAX as u32 {
                log::warn!("Skipping MP4 track {} with timescale {}", track_id, timescale);
                continue;
            }
            let time_base = Rational::new(1, timescale as i32);
            let sample_count = reader
                .sample_count(track_id)
                .map_err(|e| Error::Demux(format!("Track {}: {}", track_id, e)))?;

            tracks.push(TrackCursor {
                track_id,
                time_base,
                params: track_params(track, time_base),
                sample_count,
                next_sample: 1,
                peeked: None,
                position: None,
            });
        }

        Ok(Self {
            reader,
            tracks,
            new_streams: Vec::new(),
            announced: 0,
        })
    }

    fn announce(&mut self, index: usize) -> usize {
        let track = &mut self.tracks[index];
        if let Some(position) = track.position {
            return position;
        }

        let position = self.announced;
        track.position = Some(position);
        self.announced += 1;
        self.new_streams.push(DiscoveredStream {
            format_id: track.track_id as i32,
            params: track.params.clone(),
        });
        position
    }

    /// Load the next sample of every track that has none buffered
    fn fill_peeks(&mut self) -> Result<()> {
        for track in &mut self.tracks {
            while track.peeked.is_none() && track.next_sample <= track.sample_count {
                let sample_id = track.next_sample;
                track.next_sample += 1;
                track.peeked = self
                    .reader
                    .read_sample(track.track_id, sample_id)
                    .map_err(|e| {
                        Error::Demux(format!(
                            "Failed to read sample {} of track {}: {}",
                            sample_id, track.track_id, e
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Track whose buffered sample starts first
    fn earliest_track(&self) -> Option<usize> {
        let mut best: Option<(usize, u64, Rational)> = None;
        for (index, track) in self.tracks.iter().enumerate() {
            let Some(sample) = &track.peeked else {
                continue;
            };
            let earlier = match best {
                None => true,
                Some((_, start, base)) => {
                    compare_ts(sample.start_time as i64, track.time_base, start as i64, base)
                        == Ordering::Less
                }
            };
            if earlier {
                best = Some((index, sample.start_time, track.time_base));
            }
        }
        best.map(|(index, _, _)| index)
    }
}

impl<R: Read + Seek + Send> Demuxer for Mp4Demuxer<R> {
    fn read_header(&mut self, find_all_streams: bool) -> Result<()> {
        // moov has already been parsed; only registration is deferred
        if find_all_streams {
            for index in 0..self.tracks.len() {
                self.announce(index);
            }
        }
        Ok(())
    }

    fn take_new_streams(&mut self) -> Vec<DiscoveredStream> {
        std::mem::take(&mut self.new_streams)
    }

    fn read_packet(&mut self, packet: &mut Packet) -> Result<()> {
        self.fill_peeks()?;
        let index = self.earliest_track().ok_or(Error::EndOfStream)?;
        let position = self.announce(index);
        let sample = self.tracks[index]
            .peeked
            .take()
            .ok_or(Error::EndOfStream)?;

        packet.stream = position;
        packet.dts = sample.start_time as i64;
        packet.pts = packet.dts + sample.rendering_offset as i64;
        packet.duration = sample.duration as i64;
        packet.is_keyframe = sample.is_sync;
        packet.data = sample.bytes.to_vec();
        Ok(())
    }

    fn duration(&self) -> Option<Duration> {
        Some(self.reader.duration())
    }
}

fn track_params(track: &mp4::Mp4Track, time_base: Rational) -> StreamParams {
    let codec = match track.media_type() {
        Ok(mp4::MediaType::H264) => Codec::H264,
        Ok(mp4::MediaType::VP9) => Codec::Vp9,
        Ok(mp4::MediaType::AAC) => Codec::Aac,
        Ok(mp4::MediaType::TTXT) => Codec::Text,
        _ => Codec::Unknown,
    };

    let mut params = StreamParams {
        codec,
        time_base,
        ..StreamParams::default()
    };

    match codec {
        Codec::H264 | Codec::Vp9 => {
            params.width = track.width() as u32;
            params.height = track.height() as u32;
            if codec == Codec::H264 {
                params.codec_config = track.sequence_parameter_set().ok().map(<[u8]>::to_vec);
                params.pps = track.picture_parameter_set().ok().map(<[u8]>::to_vec);
            }
        }
        Codec::Aac => {
            if let Ok(freq) = track.sample_freq_index() {
                params.sample_rate = freq.freq();
            }
            if let Ok(config) = track.channel_config() {
                params.channels = channel_count(config);
            }
        }
        _ => {}
    }
    params
}

fn channel_count(config: mp4::ChannelConfig) -> u16 {
    use mp4::ChannelConfig::*;
    match config {
        Mono => 1,
        Stereo => 2,
        Three => 3,
        Four => 4,
        Five => 5,
        FiveOne => 6,
        SevenOne => 8,
    }
}
