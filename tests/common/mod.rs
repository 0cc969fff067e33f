//! Shared helpers for driver integration tests

#![allow(dead_code)]

use softglue_io::transport::{Connector, MockConnector, MockTransport, SimDevice};
use softglue_io::{ChannelSink, Config, DetectorState, Frame, SoftGlueDriver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const PACKET_WORDS: usize = 8;

pub fn test_config() -> Config {
    let mut config = Config::new("SG_TEST", "127.0.0.1", 4);
    config.device.packet_size = PACKET_WORDS;
    config.timing.retry_interval_ms = 10;
    config.timing.acquire_poll_us = 100;
    config.timing.export_poll_us = 1_000;
    config.timing.io_timeout_ms = 2_000;
    config
}

/// Driver wired to a mock transport, with a channel sink for frames
pub fn mock_driver(
    config: Config,
    connector: Arc<dyn Connector>,
) -> (SoftGlueDriver, crossbeam_channel::Receiver<Arc<Frame>>) {
    let (sink, rx) = ChannelSink::unbounded();
    let driver = SoftGlueDriver::with_connector(config, connector, Arc::new(sink)).unwrap();
    (driver, rx)
}

/// Mock transport answering like an idle device
pub fn idle_device() -> MockTransport {
    MockTransport::with_device(SimDevice::new(PACKET_WORDS))
}

pub fn connected(transport: MockTransport) -> (SoftGlueDriver, crossbeam_channel::Receiver<Arc<Frame>>) {
    let (driver, rx) = mock_driver(test_config(), Arc::new(MockConnector::new(transport)));
    assert!(driver.request_connect().unwrap());
    wait_for_state(&driver, DetectorState::Idle);
    (driver, rx)
}

pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(2));
    }
}

pub fn wait_for_state(driver: &SoftGlueDriver, state: DetectorState) {
    wait_until(&format!("state {}", state), || driver.state() == state);
}

/// Short event: start word plus seven data words
pub fn short_event(data: [u32; 7]) -> Vec<u32> {
    let mut words = vec![0x8000_0000];
    words.extend(data);
    words
}
