//! Connect and disconnect retry loops

use super::Shared;
use crate::core::params::Param;
use crate::core::types::DetectorState;
use crate::transport::Transport;
use parking_lot::Mutex;
use std::sync::Arc;

/// Retry `Connector::connect` until it succeeds or the driver shuts down
pub(super) fn connect_loop(shared: &Arc<Shared>) {
    let target = shared.connector.target();
    let mut attempts: u64 = 0;

    while !shared.is_shutting_down() {
        attempts += 1;
        match shared.connector.connect() {
            Ok(mut transport) => {
                pull_settings(shared, transport.as_mut());
                {
                    let mut link = shared.link.lock();
                    if shared.is_shutting_down() {
                        drop(link);
                        if let Err(e) = transport.close() {
                            log::debug!("Close after cancelled connect failed: {}", e);
                        }
                        return;
                    }
                    link.transport = Some(Arc::new(Mutex::new(transport)));
                    shared.set_state(&mut link, DetectorState::Idle);
                }
                shared.params.publish();
                log::info!(
                    "{}: connected to {} (attempt {})",
                    shared.config.device.name,
                    target,
                    attempts
                );
                shared.ensure_export_pump();
                return;
            }
            Err(e) => {
                log::warn!(
                    "{}: connect to {} failed (attempt {}): {}, retrying in {:?}",
                    shared.config.device.name,
                    target,
                    attempts,
                    e,
                    shared.config.timing.retry_interval()
                );
                if !shared.wait_retry() {
                    break;
                }
            }
        }
    }
    log::debug!("Connect loop for {} cancelled", target);
}

/// Retry `Transport::close` until it succeeds or the driver shuts down
pub(super) fn disconnect_loop(shared: &Arc<Shared>) {
    loop {
        let transport = shared.link.lock().transport.clone();
        let result = match &transport {
            Some(transport) => transport.lock().close(),
            None => Ok(()),
        };

        match result {
            Ok(()) => {
                {
                    let mut link = shared.link.lock();
                    link.transport = None;
                    shared.set_state(&mut link, DetectorState::Disconnected);
                }
                shared.params.publish();
                log::info!("{}: disconnected", shared.config.device.name);
                return;
            }
            Err(e) => {
                log::warn!(
                    "{}: close failed: {}, retrying in {:?}",
                    shared.config.device.name,
                    e,
                    shared.config.timing.retry_interval()
                );
                if !shared.wait_retry() {
                    return;
                }
            }
        }
    }
}

/// On-connect hook: mirror the current output matrix into the parameters
/// so clients see the settings the next acquisition will use.
fn pull_settings(shared: &Shared, transport: &mut dyn Transport) {
    log::debug!("Pulling settings for {}", transport.peer());
    let used = shared.matrix.outputs_used();
    for channel in 0..used {
        if let Some(weights) = shared.matrix.weights(channel) {
            shared
                .params
                .set_float64_array(Param::OutputMatrix, channel, &weights);
        }
        if let Some(name) = shared.matrix.name(channel) {
            shared.params.set_string(Param::OutputNames, channel, &name);
        }
    }
}
