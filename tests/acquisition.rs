//! End-to-end acquisition: device words in, weighted frames out

mod common;

use common::*;
use softglue_io::transport::{MockConnector, MockTransport, SimDevice};
use softglue_io::{ChannelSink, DetectorState, Param, SoftGlueDriver};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn configure_xy(driver: &SoftGlueDriver) {
    driver
        .write_float64_array(Param::OutputMatrix, 0, &[0.0, 1.0, -1.0])
        .unwrap();
    driver
        .write_float64_array(Param::OutputMatrix, 1, &[0.0, 0.0, 0.0, 2.0])
        .unwrap();
    driver.write_octet(Param::OutputNames, 0, "x").unwrap();
    driver.write_octet(Param::OutputNames, 1, "y").unwrap();
}

#[test]
fn test_frames_carry_weighted_channel_values() {
    let transport = MockTransport::with_device(SimDevice::new(PACKET_WORDS));
    transport.queue_packet(short_event([10, 3, 5, 0, 0, 0, 0]));
    transport.queue_packet(short_event([1, 1, 1, 0, 0, 0, 0]));

    let (driver, rx) = connected(transport);
    configure_xy(&driver);
    driver.write_int32(Param::Acquire, 0, 1).unwrap();

    let first = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(first.unique_id, 1);
    assert_eq!(first.words[0], 0);
    assert_eq!(&first.words[1..4], &[10, 3, 5]);
    assert_eq!(first.attribute("x"), Some(7.0));
    assert_eq!(first.attribute("y"), Some(10.0));

    let second = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(second.unique_id, 2);
    assert_eq!(second.attribute("x"), Some(0.0));
    assert_eq!(second.attribute("y"), Some(2.0));

    wait_until("counters", || {
        driver.params().get_int(Param::ArrayCounter, 0) == 2
    });
    assert_eq!(driver.params().get_int(Param::ArraySize, 0), 96);

    driver.write_int32(Param::Acquire, 0, 0).unwrap();
    wait_for_state(&driver, DetectorState::Idle);
}

#[test]
fn test_long_event_across_packets() {
    let transport = MockTransport::with_device(SimDevice::new(PACKET_WORDS));

    // Two noise words, then a 24-word event spread over four packets
    let mut stream = vec![0x0000_0001, 0x0000_0002, 0xC000_0000];
    stream.extend(1..=23u32);
    for packet in stream.chunks(PACKET_WORDS) {
        transport.queue_packet(packet.to_vec());
    }

    let (driver, rx) = connected(transport);
    driver
        .write_float64_array(Param::OutputMatrix, 0, &[1.0; 24])
        .unwrap();
    driver.write_octet(Param::OutputNames, 0, "total").unwrap();
    driver.write_int32(Param::Acquire, 0, 1).unwrap();

    let frame = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    let expected: Vec<i32> = (1..=23).collect();
    assert_eq!(&frame.words[1..], expected.as_slice());
    assert_eq!(frame.attribute("total"), Some((1..=23).sum::<i32>() as f64));

    // Padding of the last packet holds no further event
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_callbacks_disabled_still_counts_frames() {
    let transport = MockTransport::with_device(SimDevice::new(PACKET_WORDS));
    for i in 0..3 {
        transport.queue_packet(short_event([i, 0, 0, 0, 0, 0, 0]));
    }

    let (driver, rx) = connected(transport);
    driver.write_int32(Param::ArrayCallbacks, 0, 0).unwrap();
    driver.write_int32(Param::Acquire, 0, 1).unwrap();

    wait_until("three frames exported", || {
        driver.params().get_int(Param::ArrayCounter, 0) == 3
    });
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_unnamed_channels_use_placeholder_names() {
    let transport = MockTransport::with_device(SimDevice::new(PACKET_WORDS));
    transport.queue_packet(short_event([4, 0, 0, 0, 0, 0, 0]));

    let (driver, rx) = connected(transport);
    driver
        .write_float64_array(Param::OutputMatrix, 0, &[0.0, 3.0])
        .unwrap();
    driver.write_octet(Param::OutputNames, 1, "second").unwrap();
    driver.write_int32(Param::Acquire, 0, 1).unwrap();

    let frame = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    let names: Vec<&str> = frame.attributes.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["output0", "second"]);
    assert_eq!(frame.attribute("output0"), Some(12.0));
}

#[test]
fn test_channels_from_config_applied_at_start() {
    let mut config = test_config();
    config.channels.push(softglue_io::config::ChannelConfig {
        index: 0,
        name: "cfg".to_string(),
        weights: vec![0.0, 2.0],
    });

    let transport = MockTransport::with_device(SimDevice::new(PACKET_WORDS));
    transport.queue_packet(short_event([5, 0, 0, 0, 0, 0, 0]));
    let (driver, rx) = mock_driver(config, Arc::new(MockConnector::new(transport)));
    driver.request_connect().unwrap();
    wait_for_state(&driver, DetectorState::Idle);
    assert_eq!(driver.params().get_string(Param::OutputNames, 0), "cfg");

    driver.write_int32(Param::Acquire, 0, 1).unwrap();
    let frame = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(frame.attribute("cfg"), Some(10.0));
}

/// Minimal SoftGlue socket server serving `packets` over one connection
fn spawn_fake_device(packets: Vec<Vec<u32>>) -> (String, thread::JoinHandle<usize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut packets = packets.into_iter();
        let mut pending = packets.next();
        let mut served = 0;
        let mut command = [0u8; 8];

        while stream.read_exact(&mut command).is_ok() {
            match &command {
                b"sendnumw" => {
                    let count = if pending.is_some() { PACKET_WORDS } else { 0 };
                    let reply = format!("{:<10}", count);
                    if stream.write_all(reply.as_bytes()).is_err() {
                        break;
                    }
                }
                b"senddata" => {
                    let mut words = pending.take().unwrap_or_default();
                    words.resize(PACKET_WORDS, 0);
                    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_ne_bytes()).collect();
                    if stream.write_all(&bytes).is_err() {
                        break;
                    }
                    served += 1;
                    pending = packets.next();
                }
                other => panic!("unexpected command {:?}", other),
            }
        }
        served
    });

    (address, handle)
}

#[test]
fn test_end_to_end_over_tcp() {
    let packets = vec![
        short_event([10, 3, 5, 0, 0, 0, 0]),
        short_event([2, 0, 1, 0, 0, 0, 0]),
    ];
    let (address, device) = spawn_fake_device(packets);

    let mut config = test_config();
    config.device.address = address;
    let (sink, rx) = ChannelSink::unbounded();
    let driver = SoftGlueDriver::new(config, Arc::new(sink)).unwrap();
    configure_xy(&driver);

    assert!(driver.request_connect().unwrap());
    wait_for_state(&driver, DetectorState::Idle);
    driver.write_int32(Param::Acquire, 0, 1).unwrap();

    let first = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    let second = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(first.attribute("x"), Some(7.0));
    assert_eq!(first.attribute("y"), Some(10.0));
    assert_eq!(second.attribute("x"), Some(2.0));
    assert_eq!(second.attribute("y"), Some(2.0));

    driver.write_int32(Param::Acquire, 0, 0).unwrap();
    wait_for_state(&driver, DetectorState::Idle);
    assert!(driver.request_disconnect().unwrap());
    wait_for_state(&driver, DetectorState::Disconnected);

    assert_eq!(device.join().unwrap(), 2);
}
