// Probe measurements, results and per-host snapshots shared across the pipeline.

/// Raw output of one reachability measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub reachable: bool,
    pub rtt_ms: f64,
    pub latency_ms: f64,
}

impl Measurement {
    pub fn reachable(rtt_ms: f64, latency_ms: f64) -> Self {
        Self {
            reachable: true,
            rtt_ms: rtt_ms.max(0.0),
            latency_ms: latency_ms.max(0.0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            rtt_ms: 0.0,
            latency_ms: 0.0,
        }
    }
}

/// One host's result for one round. Immutable once built by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub host: String,
    pub round: u64,
    pub reachable: bool,
    pub rtt_ms: f64,
    pub latency_ms: f64,
}

impl ProbeResult {
    pub fn new(host: impl Into<String>, round: u64, measurement: Measurement) -> Self {
        Self {
            host: host.into(),
            round,
            reachable: measurement.reachable,
            rtt_ms: measurement.rtt_ms.max(0.0),
            latency_ms: measurement.latency_ms.max(0.0),
        }
    }

    pub fn outcome(&self) -> Outcome {
        if self.reachable {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

/// Marker kept in the rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Consistent read-only copy of one host's statistics, with derived metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct HostSnapshot {
    pub host: String,
    pub rounds: u64,
    pub losses: u64,
    pub avg_rtt_ms: f64,
    pub avg_latency_ms: f64,
    pub loss_percent: f64,
    /// Oldest first.
    pub window: Vec<Outcome>,
}
