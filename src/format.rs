//! Container format descriptions and resolution

use crate::{Codec, Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Container formats with a built-in engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub enum ContainerFormat {
    /// MP4 container (H.264 and AAC)
    Mp4 = 0,
    /// WebM / Matroska container
    WebM = 1,
}

impl ContainerFormat {
    pub const ALL: [ContainerFormat; 2] = [ContainerFormat::Mp4, ContainerFormat::WebM];

    /// Short name (e.g., "mp4")
    pub fn name(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::WebM => "webm",
        }
    }

    pub fn long_name(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "MPEG-4 Part 14",
            ContainerFormat::WebM => "WebM (Matroska subset)",
        }
    }

    /// File extensions, preferred one first
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ContainerFormat::Mp4 => &["mp4", "m4v", "m4a"],
            ContainerFormat::WebM => &["webm", "mkv", "mka"],
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "video/mp4",
            ContainerFormat::WebM => "video/webm",
        }
    }

    /// Can streams be added after the header has been written?
    ///
    /// MP4 writes its track table in the trailer; WebM writes it in the header.
    pub fn supports_dynamic_streams(&self) -> bool {
        match self {
            ContainerFormat::Mp4 => true,
            ContainerFormat::WebM => false,
        }
    }

    /// Must stream format ids be unique within one container?
    pub fn requires_unique_stream_ids(&self) -> bool {
        match self {
            ContainerFormat::Mp4 => false,
            ContainerFormat::WebM => true,
        }
    }

    /// Check if the container can store the given codec
    pub fn supports_codec(&self, codec: Codec) -> bool {
        match (self, codec) {
            (_, Codec::Unknown) => false,
            (ContainerFormat::Mp4, Codec::H264 | Codec::Aac) => true,
            (ContainerFormat::Mp4, _) => false,
            (ContainerFormat::WebM, Codec::H264 | Codec::Aac) => false,
            (ContainerFormat::WebM, _) => true,
        }
    }

    /// Look a format up by short name or extension
    pub fn find(name: &str) -> Option<ContainerFormat> {
        let name = name.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.name() == name || f.extensions().contains(&name.as_str()))
    }

    /// Guess a format from the extension of a url or path
    pub fn guess_from_url(url: &str) -> Option<ContainerFormat> {
        let path = strip_file_scheme(url);
        let ext = Path::new(path).extension()?.to_str()?;
        Self::find(ext)
    }

    /// Identify a format from the first bytes of a resource
    pub fn probe(header: &[u8]) -> Option<ContainerFormat> {
        if header.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
            return Some(ContainerFormat::WebM);
        }
        // MP4 files have 'ftyp' box at offset 4
        if header.len() >= 8 && &header[4..8] == b"ftyp" {
            return Some(ContainerFormat::Mp4);
        }
        None
    }

    /// Resolve the format of a resource about to be read: explicit choice,
    /// then content sniffing, then extension.
    pub fn resolve_input(url: &str, explicit: Option<ContainerFormat>) -> Result<ContainerFormat> {
        if let Some(format) = explicit {
            return Ok(format);
        }

        let mut header = [0u8; 12];
        let mut file = File::open(url_to_path(url)?)?;
        let read = read_up_to(&mut file, &mut header)?;

        Self::probe(&header[..read])
            .or_else(|| Self::guess_from_url(url))
            .ok_or_else(|| Error::UnknownFormat(url.to_string()))
    }

    /// Resolve the format of a resource about to be written
    pub fn resolve_output(url: &str, explicit: Option<ContainerFormat>) -> Result<ContainerFormat> {
        explicit
            .or_else(|| Self::guess_from_url(url))
            .ok_or_else(|| Error::UnknownFormat(url.to_string()))
    }
}

/// Map a url onto a filesystem path. Only plain paths and `file:` urls are served.
pub fn url_to_path(url: &str) -> Result<&Path> {
    if url.is_empty() {
        return Err(Error::InvalidInput("Empty url".to_string()));
    }
    let path = strip_file_scheme(url);
    if path.len() == url.len() {
        if let Some((scheme, _)) = url.split_once("://") {
            return Err(Error::Unsupported(format!("Protocol '{}' is not supported", scheme)));
        }
    }
    Ok(Path::new(path))
}

fn strip_file_scheme(url: &str) -> &str {
    url.strip_prefix("file://")
        .or_else(|| url.strip_prefix("file:"))
        .unwrap_or(url)
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
