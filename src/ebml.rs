//! EBML element encoding for the WebM muxer

// Element IDs
pub const EBML: u32 = 0x1A45DFA3;
pub const EBML_VERSION: u32 = 0x4286;
pub const EBML_READ_VERSION: u32 = 0x42F7;
pub const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
pub const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
pub const DOC_TYPE: u32 = 0x4282;
pub const DOC_TYPE_VERSION: u32 = 0x4287;
pub const DOC_TYPE_READ_VERSION: u32 = 0x4285;

pub const SEGMENT: u32 = 0x18538067;
pub const INFO: u32 = 0x1549A966;
pub const TIMESTAMP_SCALE: u32 = 0x2AD7B1;
pub const DURATION: u32 = 0x4489;
pub const MUXING_APP: u32 = 0x4D80;
pub const WRITING_APP: u32 = 0x5741;

pub const TRACKS: u32 = 0x1654AE6B;
pub const TRACK_ENTRY: u32 = 0xAE;
pub const TRACK_NUMBER: u32 = 0xD7;
pub const TRACK_UID: u32 = 0x73C5;
pub const TRACK_TYPE: u32 = 0x83;
pub const CODEC_ID: u32 = 0x86;
pub const CODEC_PRIVATE: u32 = 0x63A2;
pub const VIDEO: u32 = 0xE0;
pub const PIXEL_WIDTH: u32 = 0xB0;
pub const PIXEL_HEIGHT: u32 = 0xBA;
pub const AUDIO: u32 = 0xE1;
pub const SAMPLING_FREQUENCY: u32 = 0xB5;
pub const CHANNELS: u32 = 0x9F;

pub const CLUSTER: u32 = 0x1F43B675;
pub const TIMESTAMP: u32 = 0xE7;
pub const SIMPLE_BLOCK: u32 = 0xA3;

/// Size marker for elements written before their length is known
pub const UNKNOWN_SIZE: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

/// Length of the `Duration` float written into Info
pub const DURATION_LEN: usize = 8;

/// Encode an EBML element ID.
///
/// EBML IDs have class markers in their leading bits that indicate the ID length:
/// - Class A (1-byte): 1xxx xxxx (0x80-0xFF)
/// - Class B (2-byte): 01xx xxxx xxxx xxxx (0x4000-0x7FFF)
/// - Class C (3-byte): 001x xxxx ... (0x200000-0x3FFFFF)
/// - Class D (4-byte): 0001 xxxx ... (0x10000000-0x1FFFFFFF)
pub fn encode_id(id: u32) -> Vec<u8> {
    let len = if id <= 0xFF {
        1
    } else if id <= 0xFFFF {
        2
    } else if id <= 0xFF_FFFF {
        3
    } else {
        4
    };
    id.to_be_bytes()[4 - len..].to_vec()
}

/// Encode an element data size using the shortest vint that holds it
pub fn encode_size(size: u64) -> Vec<u8> {
    // all-ones is reserved for "unknown", hence the strict bounds
    for len in 1..8u32 {
        if size < (1u64 << (7 * len)) - 1 {
            let marked = size | (1u64 << (7 * len));
            return marked.to_be_bytes()[(8 - len as usize)..].to_vec();
        }
    }
    let mut bytes = vec![0x01];
    bytes.extend_from_slice(&size.to_be_bytes()[1..]);
    bytes
}

pub fn encode_element(id: u32, data: &[u8]) -> Vec<u8> {
    let mut result = encode_id(id);
    result.extend(encode_size(data.len() as u64));
    result.extend(data);
    result
}

/// Big-endian unsigned integer without leading zero bytes
pub fn encode_uint(value: u64) -> Vec<u8> {
    if value == 0 {
        return vec![0];
    }
    let bytes = value.to_be_bytes();
    let skip = (value.leading_zeros() / 8) as usize;
    bytes[skip..].to_vec()
}

pub fn encode_float(value: f64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

/// Eight byte size field, for sizes patched in once the body is written
pub fn encode_size_fixed(size: u64) -> [u8; 8] {
    let mut bytes = size.to_be_bytes();
    bytes[0] = 0x01;
    bytes
}
