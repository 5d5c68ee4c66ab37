use tokio::sync::mpsc;
use tracing::debug;
use vaultkeep_protocol::status::{ChanMsg, StatusEvent};

/// Producer side of the two status queues.
///
/// Cheap to clone; every clone feeds the same queues.
#[derive(Clone)]
pub struct StatusEmitter {
    output: mpsc::UnboundedSender<ChanMsg>,
    error: mpsc::UnboundedSender<ChanMsg>,
}

/// Consumer side of the two status queues.
pub struct StatusReceivers {
    pub output: mpsc::UnboundedReceiver<ChanMsg>,
    pub error: mpsc::UnboundedReceiver<ChanMsg>,
}

/// Create the success-path and error-path queues.
pub fn status_channel() -> (StatusEmitter, StatusReceivers) {
    let (output_tx, output_rx) = mpsc::unbounded_channel();
    let (error_tx, error_rx) = mpsc::unbounded_channel();
    (
        StatusEmitter {
            output: output_tx,
            error: error_tx,
        },
        StatusReceivers {
            output: output_rx,
            error: error_rx,
        },
    )
}

impl StatusEmitter {
    /// Lower `event` onto the queues. Never blocks; silently drops once the
    /// consumer side is gone.
    pub fn emit(&self, event: StatusEvent) {
        debug!(job_id = %event.job_id(), running = event.running(), "status event");
        let (output, error) = event.into_messages();
        if self.output.send(output).is_err() {
            debug!("status output queue closed, event dropped");
        }
        if let Some(error) = error {
            if self.error.send(error).is_err() {
                debug!("status error queue closed, event dropped");
            }
        }
    }
}
