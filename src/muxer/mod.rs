//! Container muxers (the write side of a format engine)

pub mod mp4;
pub mod webm;

use crate::format::url_to_path;
use crate::{ContainerFormat, Error, Packet, Result, Stream};
use std::fs::File;
use std::io::BufWriter;

/// Writes streams and packets into one container resource.
///
/// Call order is driven by [`crate::Container`]: `write_header` once, then
/// `write_packet` any number of times, then `write_trailer`, then `close`.
pub trait Muxer: Send {
    /// Write the format header for the streams declared so far
    fn write_header(&mut self, streams: &[Stream]) -> Result<()>;

    /// Declare a stream after the header has been written
    fn append_stream(&mut self, stream: &Stream) -> Result<()> {
        Err(Error::Unsupported(format!(
            "Cannot add stream {} after the header",
            stream.position()
        )))
    }

    /// Write one packet. Returns the number of bytes accepted.
    fn write_packet(&mut self, packet: &Packet) -> Result<usize>;

    /// Write the format trailer
    fn write_trailer(&mut self) -> Result<()>;

    /// Flush and release the underlying resource
    fn close(self: Box<Self>) -> Result<()>;
}

/// Create a file-backed muxer for the specified container format
pub fn create_muxer(format: ContainerFormat, url: &str) -> Result<Box<dyn Muxer>> {
    let file = File::create(url_to_path(url)?).map_err(Error::Io)?;
    let writer = BufWriter::new(file);

    match format {
        ContainerFormat::Mp4 => Ok(Box::new(mp4::Mp4Muxer::new(writer))),
        ContainerFormat::WebM => Ok(Box::new(webm::WebmMuxer::new(writer))),
    }
}
