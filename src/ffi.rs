//! FFI (Foreign Function Interface) for C/Go interoperability
//!
//! Every fallible call returns an `i32`: zero or a positive byte count on
//! success, a negative [`ErrorCode`] on failure. Null handles yield
//! `ErrorCode::InvalidInput`.

use crate::error::ErrorCode;
use crate::{
    Codec, Container, ContainerFormat, ContainerType, OpenOptions, Packet, Rational, Result,
};
use libc::{c_char, size_t};
use std::ffi::CStr;
use std::ptr;
use std::slice;

/// FFI stream description
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FfiStreamInfo {
    pub position: i32,
    pub format_id: i32,
    pub codec: Codec,
    pub time_base_num: i32,
    pub time_base_den: i32,
    pub width: u32,
    pub height: u32,
    pub sample_rate: u32,
    pub channels: u16,
}

const INVALID_INPUT: i32 = ErrorCode::InvalidInput as i32;

/// `kind` for codec configuration data (H.264 SPS, codec private data)
pub const MINMUX_CONFIG_CODEC: i32 = 0;
/// `kind` for the H.264 picture parameter set
pub const MINMUX_CONFIG_PPS: i32 = 1;

fn status(result: Result<()>) -> i32 {
    match result {
        Ok(()) => ErrorCode::Ok as i32,
        Err(e) => e.status(),
    }
}

fn size_status(result: Result<usize>) -> i32 {
    match result {
        Ok(size) => size.min(i32::MAX as usize) as i32,
        Err(e) => e.status(),
    }
}

/// Convert an optional C string; `Err` on invalid UTF-8
unsafe fn opt_str<'a>(s: *const c_char) -> std::result::Result<Option<&'a str>, ()> {
    if s.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(s).to_str().map(Some).map_err(|_| ())
}

/// Create an unopened container. Free it with `minmux_container_destroy`.
#[no_mangle]
pub extern "C" fn minmux_container_make() -> *mut Container {
    Box::into_raw(Box::new(Container::new()))
}

/// Destroy a container, closing it first if still open
///
/// # Safety
/// - `container` must come from `minmux_container_make` or be null
#[no_mangle]
pub unsafe extern "C" fn minmux_container_destroy(container: *mut Container) {
    if container.is_null() {
        return;
    }
    drop(Box::from_raw(container));
}

/// Open with default options (no dynamic streams, look for all streams)
///
/// # Safety
/// - `container` must be a valid container handle
/// - `url` must be a valid null-terminated string
/// - `format` must be a valid null-terminated format name, or null to detect it
#[no_mangle]
pub unsafe extern "C" fn minmux_container_open(
    container: *mut Container,
    url: *const c_char,
    kind: ContainerType,
    format: *const c_char,
) -> i32 {
    let options = OpenOptions::default();
    minmux_container_open_with(
        container,
        url,
        kind,
        format,
        options.streams_can_be_added_dynamically,
        options.look_for_all_streams,
    )
}

/// Open a container
///
/// # Safety
/// - `container` must be a valid container handle
/// - `url` must be a valid null-terminated string
/// - `format` must be a valid null-terminated format name, or null to detect it
#[no_mangle]
pub unsafe extern "C" fn minmux_container_open_with(
    container: *mut Container,
    url: *const c_char,
    kind: ContainerType,
    format: *const c_char,
    streams_can_be_added_dynamically: bool,
    look_for_all_streams: bool,
) -> i32 {
    let Some(container) = container.as_mut() else {
        return INVALID_INPUT;
    };
    let url = match opt_str(url) {
        Ok(Some(url)) => url,
        _ => return INVALID_INPUT,
    };
    let format = match opt_str(format) {
        Ok(None) => None,
        Ok(Some(name)) => match ContainerFormat::find(name) {
            Some(format) => Some(format),
            None => return INVALID_INPUT,
        },
        Err(()) => return INVALID_INPUT,
    };

    let options = OpenOptions {
        streams_can_be_added_dynamically,
        look_for_all_streams,
        ..OpenOptions::default()
    };
    status(container.open_with(url, kind, format, options))
}

/// # Safety
/// - `container` must be a valid container handle or null
#[no_mangle]
pub unsafe extern "C" fn minmux_container_close(container: *mut Container) -> i32 {
    match container.as_mut() {
        Some(container) => status(container.close()),
        None => INVALID_INPUT,
    }
}

/// # Safety
/// - `container` must be a valid container handle or null
#[no_mangle]
pub unsafe extern "C" fn minmux_container_is_opened(container: *const Container) -> bool {
    container.as_ref().is_some_and(Container::is_opened)
}

/// # Safety
/// - `container` must be a valid container handle or null
#[no_mangle]
pub unsafe extern "C" fn minmux_container_is_header_written(container: *const Container) -> bool {
    container.as_ref().is_some_and(Container::is_header_written)
}

/// Container type; `Read` for null or never-opened containers
///
/// # Safety
/// - `container` must be a valid container handle or null
#[no_mangle]
pub unsafe extern "C" fn minmux_container_get_type(container: *const Container) -> ContainerType {
    container
        .as_ref()
        .map(Container::container_type)
        .unwrap_or_default()
}

/// # Safety
/// - `container` must be a valid container handle or null
#[no_mangle]
pub unsafe extern "C" fn minmux_container_set_input_buffer_length(
    container: *mut Container,
    size: u32,
) -> i32 {
    match container.as_mut() {
        Some(container) => status(container.set_input_buffer_length(size)),
        None => INVALID_INPUT,
    }
}

/// # Safety
/// - `container` must be a valid container handle or null
#[no_mangle]
pub unsafe extern "C" fn minmux_container_get_input_buffer_length(
    container: *const Container,
) -> u32 {
    container
        .as_ref()
        .map_or(0, Container::input_buffer_length)
}

/// # Safety
/// - `container` must be a valid container handle or null
#[no_mangle]
pub unsafe extern "C" fn minmux_container_get_num_streams(container: *const Container) -> i32 {
    match container.as_ref() {
        Some(container) => size_status(Ok(container.num_streams())),
        None => INVALID_INPUT,
    }
}

/// Describe the stream at `position`
///
/// # Safety
/// - `container` must be a valid container handle
/// - `info` must point to writable memory for one `FfiStreamInfo`
#[no_mangle]
pub unsafe extern "C" fn minmux_container_get_stream(
    container: *const Container,
    position: i32,
    info: *mut FfiStreamInfo,
) -> i32 {
    let (Some(container), Some(info)) = (container.as_ref(), info.as_mut()) else {
        return INVALID_INPUT;
    };
    let Some(stream) = usize::try_from(position)
        .ok()
        .and_then(|p| container.stream(p))
    else {
        return INVALID_INPUT;
    };

    let params = stream.params();
    *info = FfiStreamInfo {
        position,
        format_id: stream.format_id(),
        codec: params.codec,
        time_base_num: params.time_base.num,
        time_base_den: params.time_base.den,
        width: params.width,
        height: params.height,
        sample_rate: params.sample_rate,
        channels: params.channels,
    };
    ErrorCode::Ok as i32
}

/// Add a stream; returns its position
///
/// # Safety
/// - `container` must be a valid container handle or null
#[no_mangle]
pub unsafe extern "C" fn minmux_container_add_new_stream(
    container: *mut Container,
    format_id: i32,
) -> i32 {
    match container.as_mut() {
        Some(container) => size_status(container.add_new_stream(format_id).map(|s| s.position())),
        None => INVALID_INPUT,
    }
}

/// Set codec parameters of a write-mode stream from `info`.
/// `info.position` and `info.format_id` are ignored.
///
/// # Safety
/// - `container` must be a valid container handle
/// - `info` must point to a valid `FfiStreamInfo`
#[no_mangle]
pub unsafe extern "C" fn minmux_container_set_stream_params(
    container: *mut Container,
    position: i32,
    info: *const FfiStreamInfo,
) -> i32 {
    let (Some(container), Some(info)) = (container.as_mut(), info.as_ref()) else {
        return INVALID_INPUT;
    };
    let time_base = Rational::new(info.time_base_num, info.time_base_den);
    if !time_base.is_valid() {
        return INVALID_INPUT;
    }
    let Some(stream) = usize::try_from(position)
        .ok()
        .and_then(|p| container.stream_mut(p))
    else {
        return INVALID_INPUT;
    };

    let params = stream.params_mut();
    params.codec = info.codec;
    params.time_base = time_base;
    params.width = info.width;
    params.height = info.height;
    params.sample_rate = info.sample_rate;
    params.channels = info.channels;
    ErrorCode::Ok as i32
}

/// Copy codec configuration bytes into a stream's parameters.
/// `kind` is `MINMUX_CONFIG_CODEC` or `MINMUX_CONFIG_PPS`; a `size` of 0
/// clears the value.
///
/// # Safety
/// - `container` must be a valid container handle
/// - `data` must point to `size` readable bytes, or be null when `size` is 0
#[no_mangle]
pub unsafe extern "C" fn minmux_container_set_stream_codec_config(
    container: *mut Container,
    position: i32,
    kind: i32,
    data: *const u8,
    size: size_t,
) -> i32 {
    let Some(container) = container.as_mut() else {
        return INVALID_INPUT;
    };
    if data.is_null() && size > 0 {
        return INVALID_INPUT;
    }
    let Some(stream) = usize::try_from(position)
        .ok()
        .and_then(|p| container.stream_mut(p))
    else {
        return INVALID_INPUT;
    };

    let bytes = (size > 0).then(|| slice::from_raw_parts(data, size).to_vec());
    let params = stream.params_mut();
    match kind {
        MINMUX_CONFIG_CODEC => params.codec_config = bytes,
        MINMUX_CONFIG_PPS => params.pps = bytes,
        _ => return INVALID_INPUT,
    }
    ErrorCode::Ok as i32
}

/// # Safety
/// - `container` must be a valid container handle or null
#[no_mangle]
pub unsafe extern "C" fn minmux_container_write_header(container: *mut Container) -> i32 {
    match container.as_mut() {
        Some(container) => status(container.write_header()),
        None => INVALID_INPUT,
    }
}

/// # Safety
/// - `container` must be a valid container handle or null
#[no_mangle]
pub unsafe extern "C" fn minmux_container_write_trailer(container: *mut Container) -> i32 {
    match container.as_mut() {
        Some(container) => status(container.write_trailer()),
        None => INVALID_INPUT,
    }
}

/// Read the next packet; returns bytes read
///
/// # Safety
/// - `container` and `packet` must be valid handles or null
#[no_mangle]
pub unsafe extern "C" fn minmux_container_read_next_packet(
    container: *mut Container,
    packet: *mut Packet,
) -> i32 {
    match (container.as_mut(), packet.as_mut()) {
        (Some(container), Some(packet)) => size_status(container.read_next_packet(packet)),
        _ => INVALID_INPUT,
    }
}

/// Write a packet; returns its size
///
/// # Safety
/// - `container` and `packet` must be valid handles or null
#[no_mangle]
pub unsafe extern "C" fn minmux_container_write_packet(
    container: *mut Container,
    packet: *const Packet,
    force_interleave: bool,
) -> i32 {
    match (container.as_mut(), packet.as_ref()) {
        (Some(container), Some(packet)) => {
            size_status(container.write_packet(packet, force_interleave))
        }
        _ => INVALID_INPUT,
    }
}

/// Create an empty packet. Free it with `minmux_packet_destroy`.
#[no_mangle]
pub extern "C" fn minmux_packet_make() -> *mut Packet {
    Box::into_raw(Box::new(Packet::new()))
}

/// # Safety
/// - `packet` must come from `minmux_packet_make` or be null
#[no_mangle]
pub unsafe extern "C" fn minmux_packet_destroy(packet: *mut Packet) {
    if packet.is_null() {
        return;
    }
    drop(Box::from_raw(packet));
}

/// Fill a packet, copying `size` bytes from `data`
///
/// # Safety
/// - `packet` must be a valid packet handle
/// - `data` must point to `size` readable bytes, or be null when `size` is 0
#[no_mangle]
pub unsafe extern "C" fn minmux_packet_set(
    packet: *mut Packet,
    stream: i32,
    pts: i64,
    dts: i64,
    duration: i64,
    is_keyframe: bool,
    data: *const u8,
    size: size_t,
) -> i32 {
    let Some(packet) = packet.as_mut() else {
        return INVALID_INPUT;
    };
    let Ok(stream) = usize::try_from(stream) else {
        return INVALID_INPUT;
    };
    if data.is_null() && size > 0 {
        return INVALID_INPUT;
    }

    packet.reset();
    packet.stream = stream;
    packet.pts = pts;
    packet.dts = dts;
    packet.duration = duration;
    packet.is_keyframe = is_keyframe;
    if size > 0 {
        packet.data = slice::from_raw_parts(data, size).to_vec();
    }
    ErrorCode::Ok as i32
}

/// # Safety
/// - `packet` must be a valid packet handle or null
#[no_mangle]
pub unsafe extern "C" fn minmux_packet_get_stream(packet: *const Packet) -> i32 {
    match packet.as_ref() {
        Some(packet) => size_status(Ok(packet.stream)),
        None => INVALID_INPUT,
    }
}

/// # Safety
/// - `packet` must be a valid packet handle or null
#[no_mangle]
pub unsafe extern "C" fn minmux_packet_get_pts(packet: *const Packet) -> i64 {
    packet.as_ref().map_or(0, |p| p.pts)
}

/// # Safety
/// - `packet` must be a valid packet handle or null
#[no_mangle]
pub unsafe extern "C" fn minmux_packet_get_dts(packet: *const Packet) -> i64 {
    packet.as_ref().map_or(0, |p| p.dts)
}

/// # Safety
/// - `packet` must be a valid packet handle or null
#[no_mangle]
pub unsafe extern "C" fn minmux_packet_is_keyframe(packet: *const Packet) -> bool {
    packet.as_ref().is_some_and(|p| p.is_keyframe)
}

/// # Safety
/// - `packet` must be a valid packet handle or null
#[no_mangle]
pub unsafe extern "C" fn minmux_packet_get_size(packet: *const Packet) -> size_t {
    packet.as_ref().map_or(0, Packet::size)
}

/// Packet bytes, valid until the packet is next modified or destroyed
///
/// # Safety
/// - `packet` must be a valid packet handle or null
#[no_mangle]
pub unsafe extern "C" fn minmux_packet_get_data(packet: *const Packet) -> *const u8 {
    match packet.as_ref() {
        Some(packet) if !packet.data.is_empty() => packet.data.as_ptr(),
        _ => ptr::null(),
    }
}

/// Get version string
#[no_mangle]
pub extern "C" fn minmux_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
