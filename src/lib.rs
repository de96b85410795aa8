//! minmux - Media container abstraction with a C FFI
//!
//! A [`Container`] wraps one file holding several time-stamped elementary
//! streams. It is opened for reading (demuxing) or writing (muxing) and
//! walks a strict lifecycle: open, header, packets, trailer, close.
//! Packets written with interleaving are reordered so the physical output
//! never goes backwards in decode time across streams.

pub mod container;
pub mod demuxer;
pub mod ebml;
pub mod error;
pub mod ffi;
pub mod format;
pub mod interleave;
pub mod listener;
pub mod muxer;
pub mod packet;
pub mod rational;
pub mod stream;

pub use container::{Container, ContainerState, OpenOptions};
pub use error::{Error, ErrorCode, Result};
pub use format::ContainerFormat;
pub use interleave::InterleaveScheduler;
pub use listener::ContainerListener;
pub use packet::Packet;
pub use rational::Rational;
pub use stream::{Stream, StreamParams, StreamTable};

/// Direction a container is opened in. A container is uni-directional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub enum ContainerType {
    /// Demux packets from an existing resource
    #[default]
    Read = 0,
    /// Mux packets into a new resource
    Write = 1,
}

/// Kind of elementary data carried by a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub enum MediaKind {
    Video = 0,
    Audio = 1,
    Subtitle = 2,
    Unknown = 3,
}

/// Codec types known to the format engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub enum Codec {
    /// Not set yet, or not recognised by the demuxer
    #[default]
    Unknown = 0,
    Av1 = 1,
    H264 = 2,
    Vp8 = 3,
    Vp9 = 4,
    Opus = 5,
    Vorbis = 6,
    Aac = 7,
    /// Plain UTF-8 subtitles
    Text = 8,
}

impl Codec {
    /// Media kind carried by this codec
    pub fn kind(&self) -> MediaKind {
        match self {
            Codec::Av1 | Codec::H264 | Codec::Vp8 | Codec::Vp9 => MediaKind::Video,
            Codec::Opus | Codec::Vorbis | Codec::Aac => MediaKind::Audio,
            Codec::Text => MediaKind::Subtitle,
            Codec::Unknown => MediaKind::Unknown,
        }
    }
}
