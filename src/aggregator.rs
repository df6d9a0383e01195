// Per-host rolling statistics. Written only by the aggregation side; each merge is one
// write-lock critical section so a concurrent snapshot never sees a half-applied merge.

use std::collections::{HashMap, VecDeque};

use tokio::sync::RwLock;

use crate::error::HostwatchError;
use crate::models::{HostSnapshot, Outcome, ProbeResult};

/// Rolling statistics for one host.
#[derive(Debug, Clone)]
pub struct HostStats {
    window: VecDeque<Outcome>,
    capacity: usize,
    rounds: u64,
    losses: u64,
    rtt_sum: f64,
    latency_sum: f64,
    last_round: u64,
}

impl HostStats {
    fn first(result: &ProbeResult, capacity: usize) -> Self {
        let mut window = VecDeque::with_capacity(capacity);
        window.push_back(result.outcome());
        Self {
            window,
            capacity,
            rounds: 1,
            losses: u64::from(!result.reachable),
            rtt_sum: result.rtt_ms,
            latency_sum: result.latency_ms,
            last_round: result.round,
        }
    }

    fn apply(&mut self, result: &ProbeResult) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(result.outcome());
        self.rounds += 1;
        self.losses += u64::from(!result.reachable);
        self.rtt_sum += result.rtt_ms;
        self.latency_sum += result.latency_ms;
        self.last_round = result.round;
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn losses(&self) -> u64 {
        self.losses
    }

    pub fn window(&self) -> impl Iterator<Item = Outcome> + '_ {
        self.window.iter().copied()
    }

    pub fn avg_rtt(&self) -> f64 {
        self.rtt_sum / self.rounds as f64
    }

    pub fn avg_latency(&self) -> f64 {
        self.latency_sum / self.rounds as f64
    }

    /// Share of lost rounds, rounded to one decimal.
    pub fn loss_percent(&self) -> f64 {
        round1(self.losses as f64 * 100.0 / self.rounds as f64)
    }

    fn snapshot(&self, host: &str) -> HostSnapshot {
        HostSnapshot {
            host: host.to_string(),
            rounds: self.rounds,
            losses: self.losses,
            avg_rtt_ms: self.avg_rtt(),
            avg_latency_ms: self.avg_latency(),
            loss_percent: self.loss_percent(),
            window: self.window.iter().copied().collect(),
        }
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[derive(Debug, Default)]
struct Table {
    /// Display order: configured hosts first, unknown hosts appended on first sight.
    order: Vec<String>,
    stats: HashMap<String, HostStats>,
}

/// Owns every host's HostStats. Share it by `Arc`; only the aggregation side calls `merge`.
#[derive(Debug)]
pub struct StatsAggregator {
    window_width: usize,
    table: RwLock<Table>,
}

impl StatsAggregator {
    /// `hosts` fixes the display order up front; hosts without results are not shown.
    pub fn new(window_width: usize, hosts: &[String]) -> Self {
        let mut order = Vec::with_capacity(hosts.len());
        for host in hosts {
            if !order.contains(host) {
                order.push(host.clone());
            }
        }
        Self {
            window_width: window_width.max(1),
            table: RwLock::new(Table {
                order,
                stats: HashMap::with_capacity(hosts.len()),
            }),
        }
    }

    pub fn window_width(&self) -> usize {
        self.window_width
    }

    /// Merges one result atomically with respect to that host.
    pub async fn merge(&self, result: &ProbeResult) -> Result<(), HostwatchError> {
        let mut table = self.table.write().await;
        merge_locked(&mut table, result, self.window_width)
    }

    /// Merges a drained batch under one lock. Stops at the first invariant violation;
    /// results before it stay merged. Returns how many were merged.
    pub async fn merge_all(&self, results: &[ProbeResult]) -> Result<usize, HostwatchError> {
        if results.is_empty() {
            return Ok(0);
        }
        let mut table = self.table.write().await;
        for (i, result) in results.iter().enumerate() {
            if let Err(e) = merge_locked(&mut table, result, self.window_width) {
                tracing::error!(error = %e, merged = i, "rejecting result batch");
                return Err(e);
            }
        }
        Ok(results.len())
    }

    /// Recorded hosts in display order.
    pub async fn snapshot(&self) -> Vec<HostSnapshot> {
        let table = self.table.read().await;
        table
            .order
            .iter()
            .filter_map(|host| table.stats.get(host).map(|s| s.snapshot(host)))
            .collect()
    }

    pub async fn host(&self, host: &str) -> Option<HostSnapshot> {
        let table = self.table.read().await;
        table.stats.get(host).map(|s| s.snapshot(host))
    }

    /// Number of hosts with at least one merged result.
    pub async fn recorded_hosts(&self) -> usize {
        self.table.read().await.stats.len()
    }
}

fn merge_locked(
    table: &mut Table,
    result: &ProbeResult,
    window_width: usize,
) -> Result<(), HostwatchError> {
    match table.stats.get_mut(&result.host) {
        Some(stats) => {
            if result.round <= stats.last_round {
                return Err(HostwatchError::QueueInvariant {
                    host: result.host.clone(),
                    round: result.round,
                    last_round: stats.last_round,
                });
            }
            stats.apply(result);
        }
        None => {
            if !table.order.contains(&result.host) {
                table.order.push(result.host.clone());
            }
            table
                .stats
                .insert(result.host.clone(), HostStats::first(result, window_width));
        }
    }
    Ok(())
}
