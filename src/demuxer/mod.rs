//! Container demuxers (the read side of a format engine)

pub mod mp4;
pub mod webm;

use crate::format::url_to_path;
use crate::{ContainerFormat, Error, Packet, Result, StreamParams};
use std::fs::File;
use std::io::BufReader;
use std::time::Duration;

/// A stream found by a demuxer, not yet registered with the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredStream {
    /// Format-dependent id (track number, track id)
    pub format_id: i32,
    pub params: StreamParams,
}

/// Reads streams and packets out of one container resource.
///
/// Streams get positions in the order they are reported by
/// [`Demuxer::take_new_streams`]; packets carry those positions.
pub trait Demuxer: Send {
    /// Parse the container header.
    ///
    /// With `find_all_streams`, keep reading until every stream declared in
    /// the header region is known. Otherwise stop after the minimal header;
    /// remaining streams are reported as their first packet is read.
    fn read_header(&mut self, find_all_streams: bool) -> Result<()>;

    /// Streams discovered since the last call, in position order
    fn take_new_streams(&mut self) -> Vec<DiscoveredStream>;

    /// Fill `packet` with the next packet in storage order.
    /// Returns [`Error::EndOfStream`] when there are no more.
    fn read_packet(&mut self, packet: &mut Packet) -> Result<()>;

    /// Total duration, when the format records it
    fn duration(&self) -> Option<Duration> {
        None
    }

    /// Release the underlying resource
    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Create a file-backed demuxer.
///
/// `buffer_length` is the read buffer size; 0 lets the library choose.
pub fn create_demuxer(
    format: ContainerFormat,
    url: &str,
    buffer_length: u32,
) -> Result<Box<dyn Demuxer>> {
    let file = File::open(url_to_path(url)?).map_err(Error::Io)?;
    let size = file.metadata().map_err(Error::Io)?.len();
    let reader = if buffer_length > 0 {
        BufReader::with_capacity(buffer_length as usize, file)
    } else {
        BufReader::new(file)
    };

    match format {
        ContainerFormat::Mp4 => Ok(Box::new(mp4::Mp4Demuxer::new(reader, size)?)),
        ContainerFormat::WebM => Ok(Box::new(webm::WebmDemuxer::new(reader)?)),
    }
}
