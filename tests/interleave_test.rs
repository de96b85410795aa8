//! Integration tests for interleaved packet writing

mod common;

use common::*;
use minmux::container::Engine;
use minmux::{Container, ContainerFormat, Error, OpenOptions, Rational};

/// Test merging two streams fed one after the other
#[test]
fn test_interleave_two_streams() {
    let (mut container, events) = open_recording(ContainerFormat::Mp4, OpenOptions::default());
    add_streams(&mut container, 2);
    container.write_header().unwrap();

    for dts in [30, 10, 20] {
        assert_eq!(container.write_packet(&packet(0, dts), true).unwrap(), 4);
    }
    for dts in [15, 25] {
        container.write_packet(&packet(1, dts), true).unwrap();
    }
    container.write_trailer().unwrap();

    assert_eq!(written_dts(&events), vec![10, 15, 20, 25, 30]);
    assert_eq!(events.lock().unwrap().last(), Some(&MuxEvent::Trailer));
}

/// Test that equal DTS goes to the lower stream position first
#[test]
fn test_ties_prefer_lower_position() {
    let (mut container, events) = open_recording(ContainerFormat::Mp4, OpenOptions::default());
    add_streams(&mut container, 2);
    container.write_header().unwrap();

    container.write_packet(&packet(1, 10), true).unwrap();
    container.write_packet(&packet(0, 10), true).unwrap();
    container.write_trailer().unwrap();

    let events = events.lock().unwrap();
    assert_eq!(
        events[1..3],
        [
            MuxEvent::Packet { stream: 0, dts: 10 },
            MuxEvent::Packet { stream: 1, dts: 10 },
        ]
    );
}

/// Test that output is non-decreasing in DTS for an arbitrary mix of streams
#[test]
fn test_output_is_dts_ordered() {
    let (mut container, events) = open_recording(ContainerFormat::Mp4, OpenOptions::default());
    add_streams(&mut container, 3);
    container.write_header().unwrap();

    // each stream produces in order, at its own rate
    let mut pending: Vec<(usize, i64)> = Vec::new();
    for i in 0..20 {
        pending.push((0, i * 33));
        pending.push((1, i * 21));
        if i % 2 == 0 {
            pending.push((2, i * 50));
        }
    }
    for (stream, dts) in &pending {
        container.write_packet(&packet(*stream, *dts), true).unwrap();
    }
    container.write_trailer().unwrap();

    let written = written_dts(&events);
    assert_eq!(written.len(), pending.len());
    assert!(
        written.windows(2).all(|w| w[0] <= w[1]),
        "Output not ordered: {:?}",
        written
    );
}

/// Test that non-interleaved writes keep call order
#[test]
fn test_direct_writes_keep_call_order() {
    let (mut container, events) = open_recording(ContainerFormat::Mp4, OpenOptions::default());
    add_streams(&mut container, 2);
    container.write_header().unwrap();

    for (stream, dts) in [(0, 30), (1, 10), (0, 20)] {
        container.write_packet(&packet(stream, dts), false).unwrap();
    }
    assert_eq!(written_dts(&events), vec![30, 10, 20]);
}

/// Test rejecting a packet behind what was already written
#[test]
fn test_late_packet_rejected() {
    let (mut container, events) = open_recording(ContainerFormat::Mp4, OpenOptions::default());
    add_streams(&mut container, 2);
    container.write_header().unwrap();

    container.write_packet(&packet(0, 100), true).unwrap();
    container.write_packet(&packet(1, 120), true).unwrap();
    assert_eq!(written_dts(&events), vec![100]);

    let err = container.write_packet(&packet(0, 50), true).unwrap_err();
    assert!(matches!(
        err,
        Error::LateDts {
            stream: 0,
            dts: 50,
            last: 100
        }
    ));
    assert!(err.status() < 0);

    container.write_trailer().unwrap();
    assert_eq!(written_dts(&events), vec![100, 120]);
}

/// Test comparing DTS across different time bases
#[test]
fn test_mixed_time_bases() {
    let (mut container, events) = open_recording(ContainerFormat::Mp4, OpenOptions::default());
    add_streams(&mut container, 2);
    // stream 1 counts 48 kHz samples
    container.stream_mut(1).unwrap().params_mut().time_base = Rational::new(1, 48000);
    container.write_header().unwrap();

    // 40ms on stream 0, 960 samples = 20ms on stream 1
    container.write_packet(&packet(0, 40), true).unwrap();
    container.write_packet(&packet(1, 960), true).unwrap();
    container.write_trailer().unwrap();

    assert_eq!(written_dts(&events), vec![960, 40]);
}

/// Test that a bounded queue releases packets while a stream is silent
#[test]
fn test_queue_bound_releases_early() {
    let options = OpenOptions {
        max_interleave_packets: Some(2),
        ..OpenOptions::default()
    };
    let (mut container, events) = open_recording(ContainerFormat::Mp4, options);
    add_streams(&mut container, 2);
    container.write_header().unwrap();

    for dts in [0, 10] {
        container.write_packet(&packet(0, dts), true).unwrap();
    }
    assert_eq!(packet_count(&events), 0);

    container.write_packet(&packet(0, 20), true).unwrap();
    assert_eq!(written_dts(&events), vec![0]);
}

/// Test that a packet the muxer failed to write stays queued
#[test]
fn test_failed_write_keeps_packet_queued() {
    let (muxer, events) = FailOnceMuxer::new();
    let mut container = Container::new();
    container
        .open_engine(
            "memory",
            Engine::Write(Box::new(muxer)),
            ContainerFormat::Mp4,
            OpenOptions::default(),
        )
        .unwrap();
    add_streams(&mut container, 2);
    container.write_header().unwrap();

    container.write_packet(&packet(0, 10), true).unwrap();
    let err = container.write_packet(&packet(1, 20), true).unwrap_err();
    assert!(matches!(err, Error::Mux(_)));
    assert_eq!(packet_count(&events), 0);

    // nothing reached the muxer yet, so 15 is not late
    container.write_packet(&packet(1, 15), true).unwrap();
    assert_eq!(written_dts(&events), vec![10]);

    container.write_trailer().unwrap();
    assert_eq!(written_dts(&events), vec![10, 15, 20]);
}

/// Test that packets still queued when the trailer fails are kept
#[test]
fn test_failed_flush_keeps_packets_for_retry() {
    let (muxer, events) = FailOnceMuxer::new();
    let mut container = Container::new();
    container
        .open_engine(
            "memory",
            Engine::Write(Box::new(muxer)),
            ContainerFormat::Mp4,
            OpenOptions::default(),
        )
        .unwrap();
    add_streams(&mut container, 2);
    container.write_header().unwrap();
    container.write_packet(&packet(0, 10), true).unwrap();
    container.write_packet(&packet(0, 20), true).unwrap();

    assert!(container.write_trailer().is_err());
    assert!(!container.is_trailer_written());

    container.write_trailer().unwrap();
    assert_eq!(written_dts(&events), vec![10, 20]);
    assert_eq!(events.lock().unwrap().last(), Some(&MuxEvent::Trailer));
}
