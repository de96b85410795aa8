//! WebM container muxer

use super::Muxer;
use crate::ebml::{self, encode_element, encode_float, encode_size, encode_uint};
use crate::{Codec, ContainerFormat, Error, MediaKind, Packet, Rational, Result, Stream};
use std::io::{Seek, SeekFrom, Write};

/// Per-track state needed while writing blocks
struct Track {
    number: u64,
    time_base: Rational,
    kind: MediaKind,
}

/// Offsets of the header fields the trailer fills in
struct Patches {
    segment_size: u64,
    duration: u64,
}

/// WebM muxer using simple EBML writing.
///
/// Each cluster is buffered and written with its size once the next one
/// starts. The segment is written with an unknown size, which the trailer
/// replaces together with the Info duration.
pub struct WebmMuxer<W: Write + Seek + Send> {
    writer: W,
    tracks: Vec<Track>,
    patches: Option<Patches>,
    cluster: Vec<u8>,
    cluster_start: i64,
    cluster_open: bool,
    /// End of the latest block, in milliseconds
    end_time: i64,
}

impl<W: Write + Seek + Send> WebmMuxer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            tracks: Vec::new(),
            patches: None,
            cluster: Vec::new(),
            cluster_start: 0,
            cluster_open: false,
            end_time: 0,
        }
    }

    /// Underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn create_ebml_header(&self) -> Vec<u8> {
        let mut data = Vec::new();

        data.extend(encode_element(ebml::EBML_VERSION, &[1]));
        data.extend(encode_element(ebml::EBML_READ_VERSION, &[1]));
        data.extend(encode_element(ebml::EBML_MAX_ID_LENGTH, &[4]));
        data.extend(encode_element(ebml::EBML_MAX_SIZE_LENGTH, &[8]));
        data.extend(encode_element(ebml::DOC_TYPE, b"webm"));
        data.extend(encode_element(ebml::DOC_TYPE_VERSION, &[4]));
        data.extend(encode_element(ebml::DOC_TYPE_READ_VERSION, &[2]));

        data
    }

    fn create_segment_info(&self) -> Vec<u8> {
        let mut data = Vec::new();

        // TimestampScale = 1000000 (1ms)
        data.extend(encode_element(ebml::TIMESTAMP_SCALE, &encode_uint(1_000_000)));
        data.extend(encode_element(ebml::MUXING_APP, b"minmux"));
        data.extend(encode_element(ebml::WRITING_APP, b"minmux"));
        // last, so the trailer finds it at the end of Info
        data.extend(encode_element(ebml::DURATION, &encode_float(0.0)));

        data
    }

    fn create_track_entry(&self, stream: &Stream) -> Result<Vec<u8>> {
        let params = stream.params();
        let codec_id = codec_id(params.codec).ok_or_else(|| {
            Error::Mux(format!(
                "WebM container does not support codec {:?} (stream {})",
                params.codec,
                stream.position()
            ))
        })?;

        let number = stream.position() as u64 + 1;
        let uid = if stream.format_id() > 0 {
            stream.format_id() as u64
        } else {
            number
        };

        let mut data = Vec::new();
        data.extend(encode_element(ebml::TRACK_NUMBER, &encode_uint(number)));
        data.extend(encode_element(ebml::TRACK_UID, &encode_uint(uid)));
        data.extend(encode_element(ebml::TRACK_TYPE, &[track_type(params.kind())]));
        data.extend(encode_element(ebml::CODEC_ID, codec_id.as_bytes()));
        if let Some(private) = &params.codec_config {
            data.extend(encode_element(ebml::CODEC_PRIVATE, private));
        }

        match params.kind() {
            MediaKind::Video => {
                let mut video = Vec::new();
                video.extend(encode_element(ebml::PIXEL_WIDTH, &encode_uint(params.width as u64)));
                video.extend(encode_element(ebml::PIXEL_HEIGHT, &encode_uint(params.height as u64)));
                data.extend(encode_element(ebml::VIDEO, &video));
            }
            MediaKind::Audio => {
                let mut audio = Vec::new();
                audio.extend(encode_element(
                    ebml::SAMPLING_FREQUENCY,
                    &encode_float(params.sample_rate as f64),
                ));
                audio.extend(encode_element(ebml::CHANNELS, &encode_uint(params.channels as u64)));
                data.extend(encode_element(ebml::AUDIO, &audio));
            }
            MediaKind::Subtitle | MediaKind::Unknown => {}
        }

        Ok(data)
    }

    fn start_cluster(&mut self, timestamp: i64) -> Result<()> {
        if timestamp < 0 {
            return Err(Error::Mux(format!(
                "Cluster timestamp {}ms is negative",
                timestamp
            )));
        }

        self.flush_cluster()?;
        self.cluster = encode_element(ebml::TIMESTAMP, &encode_uint(timestamp as u64));
        self.cluster_start = timestamp;
        self.cluster_open = true;

        Ok(())
    }

    fn flush_cluster(&mut self) -> Result<()> {
        if !self.cluster_open {
            return Ok(());
        }
        let body = std::mem::take(&mut self.cluster);
        self.cluster_open = false;
        self.write_raw(&encode_element(ebml::CLUSTER, &body))
    }

    fn write_simple_block(&mut self, track_number: u64, relative: i16, packet: &Packet) {
        let mut block_data = encode_size(track_number);
        block_data.extend(relative.to_be_bytes());

        let flags = if packet.is_keyframe { 0x80 } else { 0x00 };
        block_data.push(flags);
        block_data.extend(&packet.data);

        self.cluster
            .extend(encode_element(ebml::SIMPLE_BLOCK, &block_data));
    }

    /// Fill in the segment size and duration, then return to the end
    fn patch_header(&mut self, patches: &Patches) -> Result<()> {
        let end = self.position()?;
        let segment_size = end - patches.segment_size - ebml::UNKNOWN_SIZE.len() as u64;

        self.writer.seek(SeekFrom::Start(patches.segment_size))?;
        self.write_raw(&ebml::encode_size_fixed(segment_size))?;
        self.writer.seek(SeekFrom::Start(patches.duration))?;
        self.write_raw(&encode_float(self.end_time as f64))?;
        self.writer.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    fn position(&mut self) -> Result<u64> {
        self.writer.stream_position().map_err(Error::Io)
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).map_err(Error::Io)
    }
}

impl<W: Write + Seek + Send> Muxer for WebmMuxer<W> {
    fn write_header(&mut self, streams: &[Stream]) -> Result<()> {
        let mut tracks = Vec::new();
        for stream in streams {
            tracks.extend(encode_element(ebml::TRACK_ENTRY, &self.create_track_entry(stream)?));
        }

        self.write_raw(&encode_element(ebml::EBML, &self.create_ebml_header()))?;

        self.write_raw(&ebml::encode_id(ebml::SEGMENT))?;
        let segment_size = self.position()?;
        self.write_raw(&ebml::UNKNOWN_SIZE)?;

        self.write_raw(&encode_element(ebml::INFO, &self.create_segment_info()))?;
        let duration = self.position()? - ebml::DURATION_LEN as u64;
        self.write_raw(&encode_element(ebml::TRACKS, &tracks))?;
        self.patches = Some(Patches {
            segment_size,
            duration,
        });

        self.tracks = streams
            .iter()
            .map(|s| Track {
                number: s.position() as u64 + 1,
                time_base: s.time_base(),
                kind: s.params().kind(),
            })
            .collect();
        Ok(())
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<usize> {
        let track = self
            .tracks
            .get(packet.stream)
            .ok_or(Error::InvalidStream(packet.stream))?;
        let number = track.number;
        let time_base = track.time_base;
        let timestamp = time_base.rescale(packet.pts, Rational::MILLIS);
        let new_cluster_on_key = packet.is_keyframe && track.kind == MediaKind::Video;

        let relative = timestamp - self.cluster_start;
        let fits = (i16::MIN as i64..=i16::MAX as i64).contains(&relative);
        if !self.cluster_open || !fits || (new_cluster_on_key && timestamp > self.cluster_start) {
            self.start_cluster(timestamp)?;
        }

        let relative = (timestamp - self.cluster_start) as i16;
        self.write_simple_block(number, relative, packet);

        let duration = time_base.rescale(packet.duration.max(0), Rational::MILLIS);
        self.end_time = self.end_time.max(timestamp.saturating_add(duration));
        Ok(packet.size())
    }

    fn write_trailer(&mut self) -> Result<()> {
        let patches = self
            .patches
            .take()
            .ok_or_else(|| Error::Mux("WebM header has not been written".to_string()))?;
        self.flush_cluster()?;
        self.patch_header(&patches)?;
        self.writer.flush().map_err(Error::Io)
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        // without a trailer the segment keeps its unknown size
        self.flush_cluster()?;
        self.writer.flush().map_err(Error::Io)?;
        Ok(())
    }
}

/// Matroska codec id for a codec, if WebM can carry it
pub fn codec_id(codec: Codec) -> Option<&'static str> {
    if !ContainerFormat::WebM.supports_codec(codec) {
        return None;
    }
    match codec {
        Codec::Av1 => Some("V_AV1"),
        Codec::Vp8 => Some("V_VP8"),
        Codec::Vp9 => Some("V_VP9"),
        Codec::Opus => Some("A_OPUS"),
        Codec::Vorbis => Some("A_VORBIS"),
        Codec::Text => Some("S_TEXT/UTF8"),
        Codec::H264 | Codec::Aac | Codec::Unknown => None,
    }
}

/// Codec for a Matroska codec id. Ids from full Matroska files are accepted too.
pub fn codec_from_id(id: &str) -> Codec {
    match id {
        "V_AV1" => Codec::Av1,
        "V_VP8" => Codec::Vp8,
        "V_VP9" => Codec::Vp9,
        "V_MPEG4/ISO/AVC" => Codec::H264,
        "A_OPUS" => Codec::Opus,
        "A_VORBIS" => Codec::Vorbis,
        "A_AAC" => Codec::Aac,
        "S_TEXT/UTF8" => Codec::Text,
        _ => Codec::Unknown,
    }
}

fn track_type(kind: MediaKind) -> u8 {
    match kind {
        MediaKind::Video => 1,
        MediaKind::Audio => 2,
        MediaKind::Subtitle => 0x11,
        MediaKind::Unknown => 0,
    }
}
