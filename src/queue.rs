// Hand-off buffer between probe tasks (many producers) and the aggregation side (one consumer).

use crate::models::ProbeResult;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

/// Creates a connected producer/consumer pair.
pub fn result_queue() -> (ResultSender, ResultReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ResultSender { tx }, ResultReceiver { rx })
}

/// Producer handle; clone one per in-flight probe.
#[derive(Debug, Clone)]
pub struct ResultSender {
    tx: UnboundedSender<ProbeResult>,
}

impl ResultSender {
    /// Enqueues a result. Returns false when the consumer is gone (shutdown); the result is dropped.
    pub fn push(&self, result: ProbeResult) -> bool {
        match self.tx.send(result) {
            Ok(()) => true,
            Err(e) => {
                tracing::trace!(host = %e.0.host, "result queue closed; dropping result");
                false
            }
        }
    }

    /// True once the consumer has been dropped; later pushes are discarded.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Single consumer. Not `Clone`, and draining needs `&mut self`.
#[derive(Debug)]
pub struct ResultReceiver {
    rx: UnboundedReceiver<ProbeResult>,
}

impl ResultReceiver {
    /// Removes and returns everything enqueued so far, in push order. Never waits.
    pub fn drain(&mut self) -> Vec<ProbeResult> {
        let mut out = Vec::with_capacity(self.rx.len());
        loop {
            match self.rx.try_recv() {
                Ok(result) => out.push(result),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
