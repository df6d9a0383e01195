// Fatal error taxonomy. Probe failures are data (ProbeResult), never errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostwatchError {
    /// Malformed or missing configuration / host list. Fatal before any round runs.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A result reached the aggregator that is not newer than what was already merged
    /// for that host. Only possible if the single-consumer discipline is broken.
    #[error("queue invariant violated: {host} delivered round {round} after round {last_round}")]
    QueueInvariant {
        host: String,
        round: u64,
        last_round: u64,
    },

    #[error("dispatcher task failed: {0}")]
    Dispatcher(#[from] tokio::task::JoinError),
}
