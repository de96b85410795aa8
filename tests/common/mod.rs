//! Common test utilities

#![allow(dead_code)]

use minmux::container::Engine;
use minmux::demuxer::{Demuxer, DiscoveredStream};
use minmux::muxer::Muxer;
use minmux::{
    Codec, Container, ContainerFormat, ContainerListener, Error, OpenOptions, Packet, Rational,
    Result, Stream, StreamParams,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Calls a muxer received, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxEvent {
    Header(usize),
    AppendStream(usize),
    Packet { stream: usize, dts: i64 },
    Trailer,
    Close,
}

pub type EventLog = Arc<Mutex<Vec<MuxEvent>>>;

/// Muxer that records every call instead of writing bytes
pub struct RecordingMuxer {
    events: EventLog,
}

impl RecordingMuxer {
    pub fn new() -> (Self, EventLog) {
        let events = EventLog::default();
        (
            Self {
                events: events.clone(),
            },
            events,
        )
    }

    fn record(&self, event: MuxEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl Muxer for RecordingMuxer {
    fn write_header(&mut self, streams: &[Stream]) -> Result<()> {
        self.record(MuxEvent::Header(streams.len()));
        Ok(())
    }

    fn append_stream(&mut self, stream: &Stream) -> Result<()> {
        self.record(MuxEvent::AppendStream(stream.position()));
        Ok(())
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<usize> {
        self.record(MuxEvent::Packet {
            stream: packet.stream,
            dts: packet.dts,
        });
        Ok(packet.size())
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.record(MuxEvent::Trailer);
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.record(MuxEvent::Close);
        Ok(())
    }
}

/// Recording muxer whose first packet write fails
pub struct FailOnceMuxer {
    inner: RecordingMuxer,
    failed: bool,
}

impl FailOnceMuxer {
    pub fn new() -> (Self, EventLog) {
        let (inner, events) = RecordingMuxer::new();
        (
            Self {
                inner,
                failed: false,
            },
            events,
        )
    }
}

impl Muxer for FailOnceMuxer {
    fn write_header(&mut self, streams: &[Stream]) -> Result<()> {
        self.inner.write_header(streams)
    }

    fn append_stream(&mut self, stream: &Stream) -> Result<()> {
        self.inner.append_stream(stream)
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<usize> {
        if !self.failed {
            self.failed = true;
            return Err(Error::Mux("device full".to_string()));
        }
        self.inner.write_packet(packet)
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.inner.write_trailer()
    }

    fn close(self: Box<Self>) -> Result<()> {
        Box::new(self.inner).close()
    }
}

/// DTS values of the packets a recording muxer received
pub fn written_dts(events: &EventLog) -> Vec<i64> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            MuxEvent::Packet { dts, .. } => Some(*dts),
            _ => None,
        })
        .collect()
}

pub fn packet_count(events: &EventLog) -> usize {
    written_dts(events).len()
}

/// Open a container over a recording muxer
pub fn open_recording(
    format: ContainerFormat,
    options: OpenOptions,
) -> (Container, EventLog) {
    let (muxer, events) = RecordingMuxer::new();
    let mut container = Container::new();
    container
        .open_engine("memory", Engine::Write(Box::new(muxer)), format, options)
        .unwrap();
    (container, events)
}

/// Add `count` millisecond-based streams with ids 1..=count
pub fn add_streams(container: &mut Container, count: i32) {
    for id in 1..=count {
        let stream = container.add_new_stream(id).unwrap();
        stream.params_mut().codec = Codec::Vp9;
        stream.params_mut().time_base = Rational::MILLIS;
    }
}

/// Packet with 4 bytes of payload
pub fn packet(stream: usize, dts: i64) -> Packet {
    Packet::with_data(stream, dts, vec![0xAB; 4])
}

/// Demuxer replaying a fixed script. Streams are announced either all at
/// header time or when their first packet is read.
pub struct ScriptedDemuxer {
    streams: Vec<StreamParams>,
    packets: VecDeque<Packet>,
    announced: Vec<bool>,
    new_streams: Vec<DiscoveredStream>,
}

impl ScriptedDemuxer {
    pub fn new(streams: Vec<StreamParams>, packets: Vec<Packet>) -> Self {
        let announced = vec![false; streams.len()];
        Self {
            streams,
            packets: packets.into(),
            announced,
            new_streams: Vec::new(),
        }
    }

    fn announce(&mut self, index: usize) {
        if !self.announced[index] {
            self.announced[index] = true;
            self.new_streams.push(DiscoveredStream {
                format_id: index as i32 + 100,
                params: self.streams[index].clone(),
            });
        }
    }
}

impl Demuxer for ScriptedDemuxer {
    fn read_header(&mut self, find_all_streams: bool) -> Result<()> {
        if find_all_streams {
            for index in 0..self.streams.len() {
                self.announce(index);
            }
        }
        Ok(())
    }

    fn take_new_streams(&mut self) -> Vec<DiscoveredStream> {
        std::mem::take(&mut self.new_streams)
    }

    fn read_packet(&mut self, packet: &mut Packet) -> Result<()> {
        let next = self.packets.pop_front().ok_or(Error::EndOfStream)?;
        // script streams are announced in index order
        self.announce(next.stream);
        *packet = next;
        Ok(())
    }
}

/// Listener counting events into a shared log
#[derive(Default)]
pub struct CountingListener {
    pub log: Arc<Mutex<Vec<String>>>,
}

impl ContainerListener for CountingListener {
    fn on_open(&mut self, url: &str, _kind: minmux::ContainerType) {
        self.log.lock().unwrap().push(format!("open {}", url));
    }

    fn on_close(&mut self) {
        self.log.lock().unwrap().push("close".to_string());
    }

    fn on_add_stream(&mut self, stream: &Stream) {
        self.log
            .lock()
            .unwrap()
            .push(format!("stream {}", stream.position()));
    }

    fn on_write_header(&mut self) {
        self.log.lock().unwrap().push("header".to_string());
    }

    fn on_write_packet(&mut self, packet: &Packet) {
        self.log
            .lock()
            .unwrap()
            .push(format!("packet {}", packet.dts));
    }

    fn on_flush(&mut self, count: usize) {
        self.log.lock().unwrap().push(format!("flush {}", count));
    }

    fn on_write_trailer(&mut self) {
        self.log.lock().unwrap().push("trailer".to_string());
    }
}

/// Verify that a file exists and has non-zero size
pub fn verify_file_exists_with_size<P: AsRef<Path>>(path: P) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.len() > 0,
        Err(_) => false,
    }
}

/// Read the first bytes of a file
pub fn read_magic<P: AsRef<Path>>(path: P, len: usize) -> Vec<u8> {
    let mut bytes = std::fs::read(path).unwrap_or_default();
    bytes.truncate(len);
    bytes
}
