//! The container: lifecycle state machine over a format engine

use crate::demuxer::{create_demuxer, Demuxer};
use crate::listener::{notify, ContainerListener};
use crate::muxer::{create_muxer, Muxer};
use crate::{
    ContainerFormat, ContainerType, Error, InterleaveScheduler, Packet, Result, Stream,
    StreamParams, StreamTable,
};
use std::time::Duration;

/// Options for opening a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Allow `add_new_stream` after the header (write mode, format permitting)
    pub streams_can_be_added_dynamically: bool,
    /// Read mode: probe every stream during `open` instead of discovering
    /// them while reading packets
    pub look_for_all_streams: bool,
    /// Most packets the interleave queue may hold before it releases the
    /// smallest one without waiting for empty streams. `None` is unbounded.
    pub max_interleave_packets: Option<usize>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            streams_can_be_added_dynamically: false,
            look_for_all_streams: true,
            max_interleave_packets: None,
        }
    }
}

impl OpenOptions {
    /// Validate the options
    pub fn validate(&self) -> Result<()> {
        if self.max_interleave_packets == Some(0) {
            return Err(Error::InvalidInput(
                "max_interleave_packets must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Observable lifecycle state of a [`Container`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub enum ContainerState {
    Closed = 0,
    OpenRead = 1,
    OpenWrite = 2,
    /// Write mode after `write_header`. Stays here after the trailer.
    HeaderWritten = 3,
}

/// Format engine handed to [`Container::open_engine`]
pub enum Engine {
    Read(Box<dyn Demuxer>),
    Write(Box<dyn Muxer>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WritePhase {
    Open,
    HeaderWritten,
    TrailerWritten,
}

struct ReadSession {
    demuxer: Box<dyn Demuxer>,
}

struct WriteSession {
    muxer: Box<dyn Muxer>,
    phase: WritePhase,
    scheduler: InterleaveScheduler,
    /// Streams the muxer knows about; the rest were added after the header
    announced: usize,
}

enum Session {
    Closed,
    Reading(ReadSession),
    Writing(WriteSession),
}

/// A media container opened for either reading or writing.
///
/// ```no_run
/// use minmux::{Codec, Container, ContainerType, Packet, Rational};
///
/// let mut container = Container::new();
/// container.open("out.webm", ContainerType::Write, None)?;
/// let stream = container.add_new_stream(1)?;
/// stream.params_mut().codec = Codec::Vp9;
/// stream.params_mut().time_base = Rational::MILLIS;
/// container.write_header()?;
/// container.write_packet_interleaved(&Packet::with_data(0, 0, vec![0; 16]))?;
/// container.write_trailer()?;
/// container.close()?;
/// # Ok::<(), minmux::Error>(())
/// ```
pub struct Container {
    kind: ContainerType,
    input_buffer_length: u32,
    url: Option<String>,
    format: Option<ContainerFormat>,
    options: OpenOptions,
    streams: StreamTable,
    session: Session,
    listeners: Vec<Box<dyn ContainerListener>>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// Create an unopened container
    pub fn new() -> Self {
        Self {
            kind: ContainerType::Read,
            input_buffer_length: 0,
            url: None,
            format: None,
            options: OpenOptions::default(),
            streams: StreamTable::new(),
            session: Session::Closed,
            listeners: Vec::new(),
        }
    }

    /// Open `url` with default options (no dynamic streams, probe all streams)
    pub fn open(
        &mut self,
        url: &str,
        kind: ContainerType,
        format: Option<ContainerFormat>,
    ) -> Result<()> {
        self.open_with(url, kind, format, OpenOptions::default())
    }

    /// Open `url` for reading or writing.
    ///
    /// `format` is resolved from the file contents or the extension when
    /// `None`. In read mode this blocks until the header is parsed, and with
    /// `look_for_all_streams` until every stream in it is known.
    pub fn open_with(
        &mut self,
        url: &str,
        kind: ContainerType,
        format: Option<ContainerFormat>,
        options: OpenOptions,
    ) -> Result<()> {
        if self.is_opened() {
            return Err(Error::AlreadyOpen);
        }
        options.validate()?;

        let (format, engine) = match kind {
            ContainerType::Read => {
                let format = ContainerFormat::resolve_input(url, format)?;
                let demuxer = create_demuxer(format, url, self.input_buffer_length)?;
                (format, Engine::Read(demuxer))
            }
            ContainerType::Write => {
                let format = ContainerFormat::resolve_output(url, format)?;
                (format, Engine::Write(create_muxer(format, url)?))
            }
        };

        self.open_engine(url, engine, format, options)
    }

    /// Open over an already constructed format engine.
    /// The container type follows from the engine.
    pub fn open_engine(
        &mut self,
        url: &str,
        engine: Engine,
        format: ContainerFormat,
        options: OpenOptions,
    ) -> Result<()> {
        if self.is_opened() {
            return Err(Error::AlreadyOpen);
        }
        options.validate()?;

        let (kind, session) = match engine {
            Engine::Read(mut demuxer) => {
                if let Err(e) = demuxer.read_header(options.look_for_all_streams) {
                    if let Err(close_err) = demuxer.close() {
                        log::debug!("Failed to release {} after a bad header: {}", url, close_err);
                    }
                    return Err(e);
                }
                (ContainerType::Read, Session::Reading(ReadSession { demuxer }))
            }
            Engine::Write(muxer) => (
                ContainerType::Write,
                Session::Writing(WriteSession {
                    muxer,
                    phase: WritePhase::Open,
                    scheduler: InterleaveScheduler::with_max_buffered(options.max_interleave_packets),
                    announced: 0,
                }),
            ),
        };

        self.kind = kind;
        self.url = Some(url.to_string());
        self.format = Some(format);
        self.options = options;
        self.streams.clear();
        self.session = session;

        log::debug!("Opened {} as {:?} ({})", url, kind, format.name());
        notify(&mut self.listeners, |l| l.on_open(url, kind));

        self.register_discovered_streams();
        Ok(())
    }

    /// Close the container, releasing the engine.
    ///
    /// In write mode a missing trailer is written first, which also flushes
    /// any packets still waiting in the interleave queue. The container is
    /// closed afterwards even if that fails.
    pub fn close(&mut self) -> Result<()> {
        let result = match std::mem::replace(&mut self.session, Session::Closed) {
            Session::Closed => return Err(Error::NotOpen),
            Session::Reading(read) => read.demuxer.close(),
            Session::Writing(mut write) => {
                let finished = if write.phase == WritePhase::HeaderWritten {
                    log::warn!(
                        "Closing {} without write_trailer; writing the trailer now",
                        self.url.as_deref().unwrap_or_default()
                    );
                    finish(&mut write, &self.streams, &mut self.listeners)
                } else {
                    Ok(())
                };
                let closed = write.muxer.close();
                finished.and(closed)
            }
        };

        log::debug!("Closed {}", self.url.as_deref().unwrap_or_default());
        notify(&mut self.listeners, |l| l.on_close());
        result
    }

    pub fn is_opened(&self) -> bool {
        !matches!(self.session, Session::Closed)
    }

    pub fn is_header_written(&self) -> bool {
        matches!(&self.session, Session::Writing(w) if w.phase != WritePhase::Open)
    }

    pub fn is_trailer_written(&self) -> bool {
        matches!(&self.session, Session::Writing(w) if w.phase == WritePhase::TrailerWritten)
    }

    /// Type passed to the last `open`; `Read` if never opened
    pub fn container_type(&self) -> ContainerType {
        self.kind
    }

    pub fn state(&self) -> ContainerState {
        match &self.session {
            Session::Closed => ContainerState::Closed,
            Session::Reading(_) => ContainerState::OpenRead,
            Session::Writing(w) if w.phase == WritePhase::Open => ContainerState::OpenWrite,
            Session::Writing(_) => ContainerState::HeaderWritten,
        }
    }

    /// Set the read buffer size used by the next `open`. Fails while open.
    pub fn set_input_buffer_length(&mut self, size: u32) -> Result<()> {
        if self.is_opened() {
            log::warn!(
                "Ignoring input buffer length {} on an open container (keeping {})",
                size,
                self.input_buffer_length
            );
            return Err(Error::AlreadyOpen);
        }
        self.input_buffer_length = size;
        Ok(())
    }

    /// Suggested read buffer size; 0 lets the engine decide
    pub fn input_buffer_length(&self) -> u32 {
        self.input_buffer_length
    }

    /// Streams added (write) or discovered so far (read)
    pub fn num_streams(&self) -> usize {
        self.streams.len()
    }

    pub fn stream(&self, position: usize) -> Option<&Stream> {
        self.streams.get(position)
    }

    /// Mutable access, for setting codec parameters before they are written
    pub fn stream_mut(&mut self, position: usize) -> Option<&mut Stream> {
        self.streams.get_mut(position)
    }

    pub fn streams(&self) -> &[Stream] {
        self.streams.as_slice()
    }

    /// Format resolved at open
    pub fn container_format(&self) -> Option<ContainerFormat> {
        self.format
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Total duration of a container open for reading, if the format records it
    pub fn duration(&self) -> Option<Duration> {
        match &self.session {
            Session::Reading(read) => read.demuxer.duration(),
            _ => None,
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn ContainerListener>) {
        self.listeners.push(listener);
    }

    /// Declare a new stream at the next position.
    ///
    /// After the header this needs both `streams_can_be_added_dynamically`
    /// and a format that can take streams late.
    pub fn add_new_stream(&mut self, format_id: i32) -> Result<&mut Stream> {
        let write = writing(&mut self.session)?;
        let format = self.format.ok_or(Error::NotOpen)?;

        match write.phase {
            WritePhase::Open => {}
            WritePhase::TrailerWritten => return Err(Error::TrailerAlreadyWritten),
            WritePhase::HeaderWritten => {
                if !self.options.streams_can_be_added_dynamically {
                    return Err(Error::DynamicStreamsDisabled);
                }
                if !format.supports_dynamic_streams() {
                    return Err(Error::Unsupported(format!(
                        "{} cannot add streams after the header",
                        format.name()
                    )));
                }
            }
        }

        let position = self
            .streams
            .add(
                format_id,
                StreamParams::default(),
                format.requires_unique_stream_ids(),
            )?
            .position();
        write.scheduler.add_stream();

        if let Some(stream) = self.streams.get(position) {
            log::debug!("Added stream {} (id {})", position, format_id);
            notify(&mut self.listeners, |l| l.on_add_stream(stream));
        }
        self.streams
            .get_mut(position)
            .ok_or(Error::InvalidStream(position))
    }

    /// Write the container header for the streams declared so far
    pub fn write_header(&mut self) -> Result<()> {
        let write = writing(&mut self.session)?;
        match write.phase {
            WritePhase::Open => {}
            WritePhase::HeaderWritten => return Err(Error::HeaderAlreadyWritten),
            WritePhase::TrailerWritten => return Err(Error::TrailerAlreadyWritten),
        }

        write.muxer.write_header(self.streams.as_slice())?;
        write.announced = self.streams.len();
        write.phase = WritePhase::HeaderWritten;

        log::debug!("Wrote header with {} streams", self.streams.len());
        notify(&mut self.listeners, |l| l.on_write_header());
        Ok(())
    }

    /// Flush the interleave queue and write the container trailer.
    ///
    /// Before `write_header` this writes nothing and fails.
    pub fn write_trailer(&mut self) -> Result<()> {
        let write = writing(&mut self.session)?;
        match write.phase {
            WritePhase::HeaderWritten => {}
            WritePhase::Open => {
                log::warn!(
                    "write_trailer called on {} before write_header; nothing written",
                    self.url.as_deref().unwrap_or_default()
                );
                return Err(Error::HeaderNotWritten);
            }
            WritePhase::TrailerWritten => return Err(Error::TrailerAlreadyWritten),
        }

        finish(write, &self.streams, &mut self.listeners)
    }

    /// Read the next packet in storage order into `packet`.
    ///
    /// The packet's previous buffer is released first. Returns the number of
    /// bytes read; [`Error::EndOfStream`] after the last packet. Streams found
    /// while reading are registered before this returns.
    pub fn read_next_packet(&mut self, packet: &mut Packet) -> Result<usize> {
        let read = match &mut self.session {
            Session::Reading(read) => read,
            Session::Writing(_) => return Err(Error::WrongMode(ContainerType::Write)),
            Session::Closed => return Err(Error::NotOpen),
        };

        packet.reset();
        read.demuxer.read_packet(packet)?;
        self.register_discovered_streams();

        if packet.stream >= self.streams.len() {
            return Err(Error::Demux(format!(
                "Packet for undeclared stream {}",
                packet.stream
            )));
        }
        let packet = &*packet;
        notify(&mut self.listeners, |l| l.on_read_packet(packet));
        Ok(packet.size())
    }

    /// Write a packet.
    ///
    /// With `force_interleave` the packet is queued and released in global
    /// DTS order; otherwise it is written immediately in call order. Returns
    /// the packet size. If the muxer fails on a released packet, that packet
    /// stays queued and is retried by the next write or the trailer.
    pub fn write_packet(&mut self, packet: &Packet, force_interleave: bool) -> Result<usize> {
        let write = writing(&mut self.session)?;
        match write.phase {
            WritePhase::HeaderWritten => {}
            WritePhase::Open => return Err(Error::HeaderNotWritten),
            WritePhase::TrailerWritten => return Err(Error::TrailerAlreadyWritten),
        }

        let time_base = self
            .streams
            .get(packet.stream)
            .ok_or(Error::InvalidStream(packet.stream))?
            .time_base();
        announce_streams(write, &self.streams)?;

        if !force_interleave {
            let written = write.muxer.write_packet(packet)?;
            notify(&mut self.listeners, |l| l.on_write_packet(packet));
            return Ok(written);
        }

        write.scheduler.push(packet.clone(), time_base)?;
        // a packet leaves the queue only once the muxer took it
        while let Some(ready) = write.scheduler.peek_ready() {
            write.muxer.write_packet(ready)?;
            notify(&mut self.listeners, |l| l.on_write_packet(ready));
            let stream = ready.stream;
            write.scheduler.pop_front(stream);
        }
        Ok(packet.size())
    }

    /// Same as `write_packet(packet, true)`
    pub fn write_packet_interleaved(&mut self, packet: &Packet) -> Result<usize> {
        self.write_packet(packet, true)
    }

    fn register_discovered_streams(&mut self) {
        let Session::Reading(read) = &mut self.session else {
            return;
        };

        for found in read.demuxer.take_new_streams() {
            // demuxers report each physical stream once
            let position = match self.streams.add(found.format_id, found.params, false) {
                Ok(stream) => stream.position(),
                Err(e) => {
                    log::warn!("Dropping discovered stream {}: {}", found.format_id, e);
                    continue;
                }
            };
            if let Some(stream) = self.streams.get(position) {
                log::debug!(
                    "Discovered stream {} (id {}, {:?})",
                    position,
                    stream.format_id(),
                    stream.codec()
                );
                notify(&mut self.listeners, |l| l.on_add_stream(stream));
            }
        }
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if self.is_opened() {
            log::warn!(
                "Container {} dropped while open; closing it",
                self.url.as_deref().unwrap_or_default()
            );
            if let Err(e) = self.close() {
                log::warn!("Implicit close failed: {}", e);
            }
        }
    }
}

fn writing(session: &mut Session) -> Result<&mut WriteSession> {
    match session {
        Session::Writing(write) => Ok(write),
        Session::Reading(_) => Err(Error::WrongMode(ContainerType::Read)),
        Session::Closed => Err(Error::NotOpen),
    }
}

/// Tell the muxer about streams added after the header
fn announce_streams(write: &mut WriteSession, streams: &StreamTable) -> Result<()> {
    while write.announced < streams.len() {
        let stream = streams
            .get(write.announced)
            .ok_or(Error::InvalidStream(write.announced))?;
        write.muxer.append_stream(stream)?;
        write.announced += 1;
    }
    Ok(())
}

/// Flush queued packets and write the trailer
fn finish(
    write: &mut WriteSession,
    streams: &StreamTable,
    listeners: &mut [Box<dyn ContainerListener>],
) -> Result<()> {
    announce_streams(write, streams)?;

    let queued = write.scheduler.len();
    if queued > 0 {
        log::debug!("Flushing {} interleaved packets", queued);
        while let Some(packet) = write.scheduler.peek_any() {
            write.muxer.write_packet(packet)?;
            notify(listeners, |l| l.on_write_packet(packet));
            let stream = packet.stream;
            write.scheduler.pop_front(stream);
        }
        notify(listeners, |l| l.on_flush(queued));
    }

    write.muxer.write_trailer()?;
    write.phase = WritePhase::TrailerWritten;

    log::debug!("Wrote trailer");
    notify(listeners, |l| l.on_write_trailer());
    Ok(())
}
