//! MP4 container muxer

use super::Muxer;
use crate::{Codec, Error, Packet, Result, Stream};
use mp4::{Mp4Config, Mp4Sample, Mp4Writer, TrackConfig};
use std::io::{Seek, Write};

enum State<W: Write + Seek> {
    /// Header not written yet, nothing on disk
    Pending(W),
    Writing(Mp4Writer<W>),
    Finished(W),
    /// Only seen if a previous call failed half-way
    Poisoned,
}

/// Per-track sample timing.
///
/// `stts` stores durations, not start times, so each sample is held back
/// until the next DTS on its track fixes its duration.
#[derive(Default)]
struct TrackTiming {
    pending: Option<(i64, Mp4Sample)>,
    last_gap: Option<u32>,
}

impl TrackTiming {
    fn started(&self) -> bool {
        self.pending.is_some() || self.last_gap.is_some()
    }
}

/// MP4 muxer (H.264 video and AAC audio)
///
/// The `moov` box is written by the trailer, so tracks may still be added
/// after the header. Every track starts at DTS 0 and DTS must increase.
pub struct Mp4Muxer<W: Write + Seek + Send> {
    state: State<W>,
    tracks: Vec<TrackTiming>,
}

impl<W: Write + Seek + Send> Mp4Muxer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            state: State::Pending(writer),
            tracks: Vec::new(),
        }
    }

    /// Underlying writer, once the trailer has been written
    pub fn into_inner(self) -> Result<W> {
        match self.state {
            State::Finished(writer) => Ok(writer),
            _ => Err(Error::Mux("MP4 file is not finalized".to_string())),
        }
    }

    fn writer_mut(&mut self) -> Result<&mut Mp4Writer<W>> {
        match &mut self.state {
            State::Writing(writer) => Ok(writer),
            _ => Err(Error::Mux("MP4 writer is not accepting data".to_string())),
        }
    }

    fn add_track(&mut self, stream: &Stream) -> Result<()> {
        let config = track_config(stream)?;
        self.writer_mut()?
            .add_track(&config)
            .map_err(|e| Error::Mux(format!("Failed to add track: {}", e)))?;

        self.tracks.push(TrackTiming::default());
        Ok(())
    }

    fn write_sample(&mut self, index: usize, sample: &Mp4Sample) -> Result<()> {
        // mp4 numbers tracks from 1 in the order they are added
        let track_id = index as u32 + 1;
        self.writer_mut()?
            .write_sample(track_id, sample)
            .map_err(|e| Error::Mux(format!("Failed to write sample: {}", e)))
    }

    /// Write the held-back sample of every track
    fn flush_pending(&mut self) -> Result<()> {
        for index in 0..self.tracks.len() {
            let track = &self.tracks[index];
            let Some((_, sample)) = &track.pending else {
                continue;
            };
            let mut sample = clone_sample(sample);
            if sample.duration == 0 {
                sample.duration = track.last_gap.unwrap_or(1);
            }
            self.write_sample(index, &sample)?;
            self.tracks[index].pending = None;
        }
        Ok(())
    }
}

impl<W: Write + Seek + Send> Muxer for Mp4Muxer<W> {
    fn write_header(&mut self, streams: &[Stream]) -> Result<()> {
        // Validate before anything reaches the output
        for stream in streams {
            track_config(stream)?;
        }

        let writer = match std::mem::replace(&mut self.state, State::Poisoned) {
            State::Pending(writer) => writer,
            other => {
                self.state = other;
                return Err(Error::Mux("MP4 header already written".to_string()));
            }
        };

        let has_video = streams.iter().any(|s| s.codec() == Codec::H264);
        let mut compatible_brands = vec![brand("isom"), brand("iso2"), brand("mp41")];
        if has_video {
            compatible_brands.push(brand("avc1"));
        }

        let mp4_config = Mp4Config {
            major_brand: brand("isom"),
            minor_version: 512,
            compatible_brands,
            timescale: 1000, // milliseconds
        };

        let mp4_writer = Mp4Writer::write_start(writer, &mp4_config)
            .map_err(|e| Error::Mux(format!("Failed to create MP4 writer: {}", e)))?;
        self.state = State::Writing(mp4_writer);

        for stream in streams {
            self.add_track(stream)?;
        }
        Ok(())
    }

    fn append_stream(&mut self, stream: &Stream) -> Result<()> {
        self.add_track(stream)
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<usize> {
        let index = packet.stream;
        if index >= self.tracks.len() {
            return Err(Error::InvalidStream(index));
        }
        if packet.dts < 0 {
            return Err(Error::Mux(format!(
                "MP4 cannot store negative DTS {} on stream {}",
                packet.dts, index
            )));
        }
        if !self.tracks[index].started() && packet.dts != 0 {
            return Err(Error::Mux(format!(
                "MP4 track {} must start at DTS 0, got {}",
                index, packet.dts
            )));
        }

        let rendering_offset = packet
            .pts
            .checked_sub(packet.dts)
            .and_then(|offset| i32::try_from(offset).ok())
            .ok_or_else(|| {
                Error::Mux(format!(
                    "PTS {} is too far from DTS {} on stream {}",
                    packet.pts, packet.dts, index
                ))
            })?;
        let duration = u32::try_from(packet.duration.max(0)).map_err(|_| {
            Error::Mux(format!(
                "Duration {} is too long for MP4 on stream {}",
                packet.duration, index
            ))
        })?;

        let previous = self.tracks[index]
            .pending
            .as_ref()
            .map(|(dts, sample)| (*dts, clone_sample(sample)));
        if let Some((previous_dts, mut previous_sample)) = previous {
            let gap = u32::try_from(packet.dts - previous_dts)
                .ok()
                .filter(|gap| *gap > 0)
                .ok_or_else(|| {
                    Error::Mux(format!(
                        "DTS {} on stream {} does not advance from {}",
                        packet.dts, index, previous_dts
                    ))
                })?;
            previous_sample.duration = gap;
            self.write_sample(index, &previous_sample)?;
            self.tracks[index].last_gap = Some(gap);
        }

        let sample = Mp4Sample {
            start_time: packet.dts as u64,
            duration,
            rendering_offset,
            is_sync: packet.is_keyframe,
            bytes: mp4::Bytes::copy_from_slice(&packet.data),
        };
        self.tracks[index].pending = Some((packet.dts, sample));
        Ok(packet.size())
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.flush_pending()?;
        let mut mp4_writer = match std::mem::replace(&mut self.state, State::Poisoned) {
            State::Writing(writer) => writer,
            other => {
                self.state = other;
                return Err(Error::Mux("MP4 header has not been written".to_string()));
            }
        };

        mp4_writer
            .write_end()
            .map_err(|e| Error::Mux(format!("Failed to finalize MP4: {}", e)))?;

        self.state = State::Finished(mp4_writer.into_writer());
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        match self.state {
            State::Pending(mut writer) | State::Finished(mut writer) => {
                writer.flush().map_err(Error::Io)
            }
            State::Writing(writer) => {
                // no trailer: the file is left without a moov box
                let mut writer = writer.into_writer();
                writer.flush().map_err(Error::Io)
            }
            State::Poisoned => Ok(()),
        }
    }
}

/// Build the mp4 track configuration for a stream
fn track_config(stream: &Stream) -> Result<TrackConfig> {
    let params = stream.params();
    let time_base = params.time_base;
    if time_base.num != 1 || time_base.den <= 0 {
        return Err(Error::Mux(format!(
            "MP4 tracks need a 1/N time base, stream {} has {}",
            stream.position(),
            time_base
        )));
    }

    let media_conf = match params.codec {
        Codec::H264 => {
            let sps = params.codec_config.clone().unwrap_or_default();
            let pps = params.pps.clone().unwrap_or_default();
            // avcC takes profile and level from the SPS
            if sps.len() < 4 || pps.is_empty() {
                return Err(Error::Mux(format!(
                    "H.264 stream {} needs SPS and PPS",
                    stream.position()
                )));
            }
            let dimension = |value: u32| {
                u16::try_from(value).map_err(|_| {
                    Error::Mux(format!(
                        "Video size {}x{} of stream {} exceeds the MP4 limit",
                        params.width,
                        params.height,
                        stream.position()
                    ))
                })
            };
            mp4::MediaConfig::AvcConfig(mp4::AvcConfig {
                width: dimension(params.width)?,
                height: dimension(params.height)?,
                seq_param_set: sps,
                pic_param_set: pps,
            })
        }
        Codec::Aac => mp4::MediaConfig::AacConfig(mp4::AacConfig {
            bitrate: 0,
            profile: mp4::AudioObjectType::AacLowComplexity,
            freq_index: freq_index(params.sample_rate)?,
            chan_conf: channel_config(params.channels)?,
        }),
        other => {
            return Err(Error::Mux(format!(
                "MP4 container does not support codec {:?} (stream {})",
                other,
                stream.position()
            )))
        }
    };

    let track_type = match params.codec {
        Codec::Aac => mp4::TrackType::Audio,
        _ => mp4::TrackType::Video,
    };

    Ok(TrackConfig {
        track_type,
        timescale: time_base.den as u32,
        language: String::from("und"),
        media_conf,
    })
}

fn freq_index(sample_rate: u32) -> Result<mp4::SampleFreqIndex> {
    use mp4::SampleFreqIndex::*;
    Ok(match sample_rate {
        96000 => Freq96000,
        88200 => Freq88200,
        64000 => Freq64000,
        48000 => Freq48000,
        44100 => Freq44100,
        32000 => Freq32000,
        24000 => Freq24000,
        22050 => Freq22050,
        16000 => Freq16000,
        12000 => Freq12000,
        11025 => Freq11025,
        8000 => Freq8000,
        7350 => Freq7350,
        other => {
            return Err(Error::Mux(format!(
                "AAC sample rate {} is not supported",
                other
            )))
        }
    })
}

fn channel_config(channels: u16) -> Result<mp4::ChannelConfig> {
    use mp4::ChannelConfig::*;
    Ok(match channels {
        1 => Mono,
        2 => Stereo,
        3 => Three,
        4 => Four,
        5 => Five,
        6 => FiveOne,
        8 => SevenOne,
        other => {
            return Err(Error::Mux(format!(
                "AAC channel count {} is not supported",
                other
            )))
        }
    })
}

// `Mp4Sample` does not implement `Clone`
fn clone_sample(sample: &Mp4Sample) -> Mp4Sample {
    Mp4Sample {
        start_time: sample.start_time,
        duration: sample.duration,
        rendering_offset: sample.rendering_offset,
        is_sync: sample.is_sync,
        bytes: sample.bytes.clone(),
    }
}

fn brand(s: &str) -> mp4::FourCC {
    let bytes = s.as_bytes();
    mp4::FourCC {
        value: [
            bytes.first().copied().unwrap_or(0),
            bytes.get(1).copied().unwrap_or(0),
            bytes.get(2).copied().unwrap_or(0),
            bytes.get(3).copied().unwrap_or(0),
        ],
    }
}
