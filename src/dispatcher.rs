// Fans one round of probes out across all hosts and waits for every one of them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::{Measurement, ProbeResult};
use crate::prober::Prober;
use crate::queue::ResultSender;

/// Extra time a probe gets past its own timeout before the dispatcher abandons it.
const ABANDON_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Every probe returned (or was abandoned at its timeout) and was pushed.
    Completed { probed: usize, reachable: usize },
    /// Cancellation fired mid-round; outstanding probes were aborted and joined.
    Cancelled { completed: usize, aborted: usize },
}

pub struct Dispatcher<P> {
    prober: Arc<P>,
    hosts: Arc<[String]>,
    timeout: Duration,
    limiter: Option<Arc<Semaphore>>,
}

impl<P> Clone for Dispatcher<P> {
    fn clone(&self) -> Self {
        Self {
            prober: Arc::clone(&self.prober),
            hosts: Arc::clone(&self.hosts),
            timeout: self.timeout,
            limiter: self.limiter.clone(),
        }
    }
}

impl<P: Prober> Dispatcher<P> {
    pub fn new(prober: Arc<P>, hosts: Vec<String>, timeout: Duration) -> Self {
        Self {
            prober,
            hosts: hosts.into(),
            timeout,
            limiter: None,
        }
    }

    /// Caps how many probes of a round run at once. `None` = one task per host, all at once.
    pub fn with_max_in_flight(mut self, max_in_flight: Option<usize>) -> Self {
        self.limiter = max_in_flight
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));
        self
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Probes every host once, concurrently. Results are pushed to `queue` as they
    /// complete (not in host order). Returns once all probes are done, or, if `cancel`
    /// fires first, once every outstanding probe task has been aborted and joined.
    pub async fn dispatch_round(
        &self,
        round: u64,
        queue: &ResultSender,
        cancel: &CancellationToken,
    ) -> RoundOutcome {
        let mut tasks = JoinSet::new();
        let mut task_hosts = HashMap::with_capacity(self.hosts.len());
        for host in self.hosts.iter() {
            let prober = Arc::clone(&self.prober);
            let host = host.clone();
            let task_host = host.clone();
            let queue = queue.clone();
            let limiter = self.limiter.clone();
            let timeout = self.timeout;
            let handle = tasks.spawn(async move {
                let _permit = match limiter {
                    Some(sem) => sem.acquire_owned().await.ok(),
                    None => None,
                };
                let measurement =
                    match tokio::time::timeout(timeout + ABANDON_GRACE, prober.probe(&host, timeout))
                        .await
                    {
                        Ok(m) => m,
                        Err(_) => {
                            debug!(host = %host, round, "probe overran its timeout; abandoned");
                            Measurement::unreachable()
                        }
                    };
                let reachable = measurement.reachable;
                queue.push(ProbeResult::new(host, round, measurement));
                reachable
            });
            task_hosts.insert(handle.id(), task_host);
        }

        let mut probed = 0usize;
        let mut reachable = 0usize;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let aborted = tasks.len();
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    debug!(round, completed = probed, aborted, "round cancelled");
                    return RoundOutcome::Cancelled { completed: probed, aborted };
                }
                joined = tasks.join_next_with_id() => match joined {
                    Some(Ok((_, ok))) => {
                        probed += 1;
                        reachable += usize::from(ok);
                    }
                    Some(Err(e)) => {
                        probed += 1;
                        // The task died before pushing; its host still gets a result this round.
                        match task_hosts.remove(&e.id()) {
                            Some(host) => {
                                warn!(host = %host, round, error = %e, "probe task failed");
                                queue.push(ProbeResult::new(host, round, Measurement::unreachable()));
                            }
                            None => warn!(round, error = %e, "probe task failed"),
                        }
                    }
                    None => break,
                },
            }
        }

        debug!(round, probed, reachable, "round complete");
        RoundOutcome::Completed { probed, reachable }
    }
}
