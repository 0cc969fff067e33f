//! Acquisition loop: poll the device, decode events, queue frames

use super::{SharedTransport, Shared};
use crate::core::params::Param;
use crate::core::types::{DetectorState, Frame};
use crate::matrix::MatrixSnapshot;
use crate::protocol::{EventDecoder, Exchange, RawEvent, Tick};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;

/// Build the frame for one decoded event
pub(crate) fn build_frame(unique_id: u64, event: &RawEvent, matrix: &MatrixSnapshot) -> Frame {
    let mut frame = Frame::new(unique_id);
    frame.words = event.frame_words();
    frame.attributes = matrix.evaluate(&frame.words);
    frame
}

/// Run one acquisition until cancelled, shut down or the link fails
pub(super) fn run(shared: &Arc<Shared>, transport: SharedTransport, cancel: Receiver<()>) {
    let name = &shared.config.device.name;
    let poll = shared.config.timing.acquire_poll();
    let max_failures = shared.config.timing.max_tick_failures;

    let mut exchange = Exchange::new(shared.config.device.packet_size);
    let mut decoder = EventDecoder::new();
    let mut events: Vec<RawEvent> = Vec::new();
    let mut next_id: u64 = 1;
    let mut packets: u64 = 0;
    let mut failures: u32 = 0;

    log::info!("{}: acquisition started", name);

    let reason: String = loop {
        match cancel.recv_timeout(poll) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break "stopped".to_string(),
        }
        if shared.is_shutting_down() {
            break "shutdown".to_string();
        }

        let result = {
            let mut guard = transport.lock();
            match exchange.tick(&mut **guard) {
                Ok(Tick::Pending { .. }) => Ok(false),
                Ok(Tick::Packet(bytes)) => {
                    decoder.push_bytes(bytes, &mut events);
                    Ok(true)
                }
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(pulled) => {
                failures = 0;
                if pulled {
                    packets += 1;
                }
                if !events.is_empty() {
                    let matrix = shared.matrix.snapshot();
                    for event in events.drain(..) {
                        shared.queue.push(build_frame(next_id, &event, &matrix));
                        next_id += 1;
                    }
                }
            }
            Err(e) if e.is_link_failure() => {
                log::error!("{}: device link failed: {}", name, e);
                break e.to_string();
            }
            Err(e) => {
                failures += 1;
                log::warn!(
                    "{}: tick failed ({}/{}): {}",
                    name,
                    failures,
                    max_failures,
                    e
                );
                if failures > max_failures {
                    break format!("{} consecutive protocol errors", failures);
                }
            }
        }
    };

    {
        let mut link = shared.link.lock();
        link.cancel = None;
        if link.state == DetectorState::Acquiring {
            shared.set_state(&mut link, DetectorState::Idle);
        }
        shared.params.set_int(Param::Acquire, 0, 0);
    }
    shared.params.publish();

    log::info!(
        "{}: acquisition ended ({}): {} packets, {} events, {} words skipped",
        name,
        reason,
        packets,
        decoder.events_decoded(),
        decoder.words_skipped()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::OutputMatrix;
    use crate::protocol::EventKind;

    #[test]
    fn test_build_frame_applies_matrix() {
        let matrix = OutputMatrix::new(2);
        matrix.set_name(0, "sum").unwrap();
        matrix.set_weights(0, &[5.0, 1.0, 1.0]).unwrap();

        let mut words = [0; 24];
        words[0] = 77;
        words[1] = 3;
        words[2] = 4;
        let event = RawEvent {
            kind: EventKind::Short,
            words,
        };

        let frame = build_frame(9, &event, &matrix.snapshot());
        assert_eq!(frame.unique_id, 9);
        assert_eq!(frame.words[0], 0);
        // The start word's payload never reaches the weighted sum
        assert_eq!(frame.attribute("sum"), Some(7.0));
        assert_eq!(frame.attributes.len(), 1);
    }
}
