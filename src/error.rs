//! Error types for minmux

use crate::ContainerType;
use thiserror::Error;

/// Result type alias for minmux operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for minmux operations
#[derive(Error, Debug)]
pub enum Error {
    /// Operation needs an open container
    #[error("Container is not open")]
    NotOpen,

    /// `open` called on a container that is already open
    #[error("Container is already open")]
    AlreadyOpen,

    /// Operation is not valid for the container's type
    #[error("Operation not allowed on a {0:?} container")]
    WrongMode(ContainerType),

    /// Packet or trailer write attempted before the header
    #[error("Header has not been written")]
    HeaderNotWritten,

    /// Header written twice
    #[error("Header has already been written")]
    HeaderAlreadyWritten,

    /// Trailer written twice, or a write after the trailer
    #[error("Trailer has already been written")]
    TrailerAlreadyWritten,

    /// Stream added after the header on a container opened without dynamic streams
    #[error("Streams cannot be added after the header was written")]
    DynamicStreamsDisabled,

    /// No stream at the given position
    #[error("No stream at position {0}")]
    InvalidStream(usize),

    /// The format requires unique stream ids
    #[error("Stream id {0} is already in use")]
    DuplicateStreamId(i32),

    /// Interleaved packet arrived after a later packet was already written
    #[error("Packet DTS {dts} on stream {stream} is behind the last written DTS {last}")]
    LateDts { stream: usize, dts: i64, last: i64 },

    /// No more packets
    #[error("End of stream")]
    EndOfStream,

    /// Format could not be determined from the url or its contents
    #[error("Unknown container format: {0}")]
    UnknownFormat(String),

    /// Feature not supported by the format or engine
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Invalid input parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed container data
    #[error("Format error: {0}")]
    Format(String),

    /// Muxing error
    #[error("Muxing error: {0}")]
    Mux(String),

    /// Demuxing error
    #[error("Demuxing error: {0}")]
    Demux(String),
}

impl Error {
    /// Integer status for this error, always negative
    pub fn status(&self) -> i32 {
        ErrorCode::from(self) as i32
    }

    /// True for errors caused by calling an operation in the wrong lifecycle state
    pub fn is_lifecycle_violation(&self) -> bool {
        ErrorCode::from(self) == ErrorCode::InvalidState
    }
}

/// Status codes for FFI. Success is zero or positive, failures are negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub enum ErrorCode {
    /// Success
    Ok = 0,
    /// Operation invalid in the current container state
    InvalidState = -1,
    /// Invalid input parameter
    InvalidInput = -2,
    /// Capability missing in the format or engine
    Unsupported = -3,
    /// I/O error
    IoError = -4,
    /// Container format error
    FormatError = -5,
    /// End of stream reached
    EndOfStream = -6,
}

impl From<&Error> for ErrorCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::NotOpen
            | Error::AlreadyOpen
            | Error::WrongMode(_)
            | Error::HeaderNotWritten
            | Error::HeaderAlreadyWritten
            | Error::TrailerAlreadyWritten => ErrorCode::InvalidState,
            Error::DynamicStreamsDisabled | Error::Unsupported(_) => ErrorCode::Unsupported,
            Error::InvalidStream(_)
            | Error::DuplicateStreamId(_)
            | Error::LateDts { .. }
            | Error::InvalidInput(_) => ErrorCode::InvalidInput,
            Error::EndOfStream => ErrorCode::EndOfStream,
            Error::Io(_) => ErrorCode::IoError,
            Error::UnknownFormat(_) | Error::Format(_) | Error::Mux(_) | Error::Demux(_) => {
                ErrorCode::FormatError
            }
        }
    }
}
