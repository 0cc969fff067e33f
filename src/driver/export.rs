//! Export pump: queue → counters → sink

use super::Shared;
use crate::core::params::Param;
use crate::core::types::Frame;
use std::sync::Arc;

pub(super) fn run(shared: &Arc<Shared>) {
    let poll = shared.config.timing.export_poll();
    let mut previous: Option<Arc<Frame>> = None;
    let mut exported: u64 = 0;
    let mut failed: u64 = 0;

    log::debug!("Export pump started");

    while !shared.is_shutting_down() {
        let Some(frame) = shared.queue.pop_timeout(poll) else {
            continue;
        };

        // The previous frame is released before the next one goes out
        drop(previous.take());

        let frame = Arc::new(frame);
        shared.params.increment(Param::ArrayCounter, 0);
        shared
            .params
            .set_int(Param::ArraySize, 0, frame.size_bytes() as i32);
        shared.params.publish();

        if shared.params.get_int(Param::ArrayCallbacks, 0) != 0 {
            if let Err(e) = shared.sink.deliver(Arc::clone(&frame)) {
                failed += 1;
                if failed % 1000 == 1 {
                    log::warn!("Frame delivery failed ({} so far): {}", failed, e);
                }
            }
        }

        exported += 1;
        previous = Some(frame);
    }

    log::debug!(
        "Export pump exiting ({} frames exported, {} delivery failures)",
        exported,
        failed
    );
}
