//! Integration tests for reading containers written by minmux

mod common;

use common::*;
use minmux::{
    Codec, Container, ContainerFormat, ContainerState, ContainerType, Error, OpenOptions, Packet,
    Rational,
};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn lazy() -> OpenOptions {
    OpenOptions {
        look_for_all_streams: false,
        ..OpenOptions::default()
    }
}

/// Write a WebM file with a VP9 stream (1ms) and an Opus stream (48 kHz)
fn write_webm(path: &Path) {
    let mut container = Container::new();
    container
        .open(path.to_str().unwrap(), ContainerType::Write, None)
        .unwrap();
    assert_eq!(container.container_format(), Some(ContainerFormat::WebM));

    let video = container.add_new_stream(1).unwrap();
    video.params_mut().codec = Codec::Vp9;
    video.params_mut().width = 320;
    video.params_mut().height = 240;
    video.params_mut().time_base = Rational::MILLIS;

    let audio = container.add_new_stream(2).unwrap();
    audio.params_mut().codec = Codec::Opus;
    audio.params_mut().sample_rate = 48000;
    audio.params_mut().channels = 2;
    audio.params_mut().time_base = Rational::new(1, 48000);

    container.write_header().unwrap();
    for i in 0..5 {
        let mut frame = Packet::with_data(0, i * 40, vec![i as u8; 32]);
        frame.is_keyframe = i == 0;
        container.write_packet_interleaved(&frame).unwrap();
    }
    for i in 0..10 {
        let mut samples = Packet::with_data(1, i * 960, vec![0x80; 8]);
        samples.is_keyframe = true;
        container.write_packet_interleaved(&samples).unwrap();
    }
    container.write_trailer().unwrap();
    container.close().unwrap();
}

/// Read every packet, returning (stream, pts) pairs
fn read_all(container: &mut Container) -> Vec<(usize, i64)> {
    let mut packet = Packet::new();
    let mut packets = Vec::new();
    loop {
        match container.read_next_packet(&mut packet) {
            Ok(size) => {
                assert_eq!(size, packet.size());
                packets.push((packet.stream, packet.pts));
            }
            Err(Error::EndOfStream) => break,
            Err(e) => panic!("Read failed: {}", e),
        }
    }
    packets
}

/// Test reading back a WebM file with all streams probed at open
#[test]
fn test_webm_find_all_streams() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("av.webm");
    write_webm(&path);
    assert!(verify_file_exists_with_size(&path));
    assert_eq!(read_magic(&path, 4), vec![0x1A, 0x45, 0xDF, 0xA3]);

    let mut container = Container::new();
    container
        .open(path.to_str().unwrap(), ContainerType::Read, None)
        .unwrap();
    assert_eq!(container.state(), ContainerState::OpenRead);
    assert_eq!(container.num_streams(), 2);

    let video = container.stream(0).unwrap();
    assert_eq!(video.codec(), Codec::Vp9);
    assert_eq!(video.params().width, 320);
    assert_eq!(video.format_id(), 1);
    let audio = container.stream(1).unwrap();
    assert_eq!(audio.codec(), Codec::Opus);
    assert_eq!(audio.params().channels, 2);

    let packets = read_all(&mut container);
    assert_eq!(packets.len(), 15);
    // interleaved on write, so storage order is time order
    assert!(packets.windows(2).all(|w| w[0].1 <= w[1].1));
    assert_eq!(container.num_streams(), 2);
    container.close().unwrap();
}

/// Test lazy stream discovery while reading
#[test]
fn test_webm_streams_discovered_while_reading() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("lazy.webm");
    write_webm(&path);

    let mut container = Container::new();
    container
        .open_with(path.to_str().unwrap(), ContainerType::Read, None, lazy())
        .unwrap();
    assert_eq!(container.num_streams(), 0);
    assert!(container.stream(0).is_none());

    let mut packet = Packet::new();
    container.read_next_packet(&mut packet).unwrap();
    assert!(container.num_streams() >= 1);

    read_all(&mut container);
    assert_eq!(container.num_streams(), 2);
    let positions: Vec<_> = container.streams().iter().map(|s| s.position()).collect();
    assert_eq!(positions, vec![0, 1]);
}

/// Test that reading replaces the packet's previous contents
#[test]
fn test_read_replaces_packet_buffer() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("reuse.webm");
    write_webm(&path);

    let mut container = Container::new();
    container
        .open(path.to_str().unwrap(), ContainerType::Read, Some(ContainerFormat::WebM))
        .unwrap();

    let mut packet = Packet::with_data(7, 999, vec![0xFF; 1024]);
    let size = container.read_next_packet(&mut packet).unwrap();
    assert_eq!(size, 32);
    assert_eq!(packet.stream, 0);
    assert_eq!(packet.pts, 0);
    assert!(packet.is_keyframe);
}

/// Test the input buffer length is used by file-backed reads
#[test]
fn test_webm_with_input_buffer_length() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("buffered.webm");
    write_webm(&path);

    let mut container = Container::new();
    container.set_input_buffer_length(64).unwrap();
    let url = format!("file:{}", path.to_str().unwrap());
    container.open(&url, ContainerType::Read, None).unwrap();

    assert_eq!(read_all(&mut container).len(), 15);
    assert_eq!(container.input_buffer_length(), 64);
}

/// H.264 parameter sets of a 64x48 baseline stream
fn set_h264(container: &mut Container, position: usize) {
    let params = container.stream_mut(position).unwrap().params_mut();
    params.codec = Codec::H264;
    params.width = 64;
    params.height = 48;
    params.time_base = Rational::new(1, 30);
    params.codec_config = Some(vec![0x67, 0x42, 0xC0, 0x1E, 0x95]);
    params.pps = Some(vec![0x68, 0xCE, 0x38, 0x80]);
}

/// Test an MP4 round trip with a stream added after the header
#[test]
fn test_mp4_round_trip_with_dynamic_stream() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("av.mp4");
    let url = path.to_str().unwrap();

    let options = OpenOptions {
        streams_can_be_added_dynamically: true,
        ..OpenOptions::default()
    };
    let mut container = Container::new();
    container
        .open_with(url, ContainerType::Write, None, options)
        .unwrap();
    assert_eq!(container.container_format(), Some(ContainerFormat::Mp4));

    container.add_new_stream(1).unwrap();
    set_h264(&mut container, 0);
    container.write_header().unwrap();

    let audio = container.add_new_stream(2).unwrap();
    let params = audio.params_mut();
    params.codec = Codec::Aac;
    params.sample_rate = 48000;
    params.channels = 2;
    params.time_base = Rational::new(1, 48000);

    for i in 0..3 {
        let mut frame = Packet::with_data(0, i, vec![0, 0, 0, 1, 0x65, i as u8]);
        frame.duration = 1;
        frame.is_keyframe = i == 0;
        container.write_packet_interleaved(&frame).unwrap();

        let mut samples = Packet::with_data(1, i * 1600, vec![0x21; 6]);
        samples.duration = 1600;
        samples.is_keyframe = true;
        container.write_packet_interleaved(&samples).unwrap();
    }
    container.close().unwrap();
    assert_eq!(read_magic(&path, 8)[4..], *b"ftyp");

    let mut reader = Container::new();
    reader.open(url, ContainerType::Read, None).unwrap();
    assert_eq!(reader.num_streams(), 2);
    assert_eq!(reader.stream(0).unwrap().codec(), Codec::H264);
    assert_eq!(reader.stream(1).unwrap().codec(), Codec::Aac);
    assert_eq!(reader.stream(1).unwrap().time_base(), Rational::new(1, 48000));
    assert!(reader.duration().is_some_and(|d| d > Duration::ZERO));

    let packets = read_all(&mut reader);
    assert_eq!(
        packets,
        vec![(0, 0), (1, 0), (0, 1), (1, 1600), (0, 2), (1, 3200)]
    );
}

/// Test that MP4 keeps DTS values that are not evenly spaced
#[test]
fn test_mp4_keeps_written_dts() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("gaps.mp4");
    let url = path.to_str().unwrap();

    let mut container = Container::new();
    container.open(url, ContainerType::Write, None).unwrap();
    container.add_new_stream(1).unwrap();
    set_h264(&mut container, 0);
    container.write_header().unwrap();
    for dts in [0, 500, 1000] {
        let frame = Packet::with_data(0, dts, vec![0, 0, 0, 1, 0x65]);
        assert_eq!(frame.duration, 0);
        container.write_packet(&frame, true).unwrap();
    }
    container.close().unwrap();

    let mut reader = Container::new();
    reader.open(url, ContainerType::Read, None).unwrap();
    let dts: Vec<_> = read_all(&mut reader).into_iter().map(|(_, ts)| ts).collect();
    assert_eq!(dts, vec![0, 500, 1000]);
}

/// Test lazy discovery on MP4
#[test]
fn test_mp4_lazy_discovery() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("video.mp4");
    let url = path.to_str().unwrap();

    let mut container = Container::new();
    container.open(url, ContainerType::Write, None).unwrap();
    container.add_new_stream(1).unwrap();
    set_h264(&mut container, 0);
    container.write_header().unwrap();
    let mut frame = Packet::with_data(0, 0, vec![0, 0, 0, 1, 0x65]);
    frame.duration = 1;
    frame.is_keyframe = true;
    container.write_packet(&frame, false).unwrap();
    container.write_trailer().unwrap();
    container.close().unwrap();

    let mut reader = Container::new();
    reader.open_with(url, ContainerType::Read, None, lazy()).unwrap();
    assert_eq!(reader.num_streams(), 0);

    let mut packet = Packet::new();
    assert_eq!(reader.read_next_packet(&mut packet).unwrap(), 5);
    assert_eq!(reader.num_streams(), 1);
    assert!(packet.is_keyframe);
    assert!(matches!(
        reader.read_next_packet(&mut packet),
        Err(Error::EndOfStream)
    ));
}

/// Test opening a missing file
#[test]
fn test_open_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("missing.webm");

    let mut container = Container::new();
    let err = container
        .open(path.to_str().unwrap(), ContainerType::Read, None)
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert!(!container.is_opened());
}
