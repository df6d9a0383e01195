// Drives rounds under one of two topologies and owns shutdown.
//
// Cooperative: dispatch round -> drain -> merge -> render, sequentially, in one task.
// Split: a dispatch task loops rounds into the queue while this task drains, merges and
// renders on its own refresh interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator::StatsAggregator;
use crate::dispatcher::{Dispatcher, RoundOutcome};
use crate::error::HostwatchError;
use crate::prober::Prober;
use crate::queue::{ResultReceiver, ResultSender, result_queue};
use crate::renderer::Renderer;
use crate::terminal::RenderSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Topology {
    #[default]
    Cooperative,
    Split,
}

/// Why a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    RoundLimit,
}

impl StopReason {
    /// Process exit status: 0 after the round limit, 130 (128 + SIGINT) after an interrupt.
    pub fn exit_status(self) -> u8 {
        match self {
            StopReason::RoundLimit => 0,
            StopReason::Cancelled => 130,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Split topology: drain/render cadence.
    pub refresh_interval: Duration,
    /// Stop normally after this many rounds. `None` runs until cancelled.
    pub max_rounds: Option<u64>,
}

pub struct Scheduler<P> {
    dispatcher: Dispatcher<P>,
    aggregator: Arc<StatsAggregator>,
    renderer: Renderer,
    config: SchedulerConfig,
    state: watch::Sender<SchedulerState>,
}

impl<P: Prober> Scheduler<P> {
    pub fn new(dispatcher: Dispatcher<P>, renderer: Renderer, config: SchedulerConfig) -> Self {
        let aggregator = Arc::new(StatsAggregator::new(
            renderer.window_width,
            dispatcher.hosts(),
        ));
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            dispatcher,
            aggregator,
            renderer,
            config,
            state,
        }
    }

    /// Read handle on the statistics this scheduler feeds.
    pub fn aggregator(&self) -> Arc<StatsAggregator> {
        Arc::clone(&self.aggregator)
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Runs until `cancel` fires, the round limit is reached, or a fatal internal error.
    /// The sink is restored and the state is `Stopped` on every exit path.
    pub async fn run(
        &self,
        topology: Topology,
        sink: &mut dyn RenderSink,
        cancel: CancellationToken,
    ) -> Result<StopReason, HostwatchError> {
        self.set_state(SchedulerState::Running);
        info!(?topology, hosts = self.dispatcher.hosts().len(), "scheduler running");

        let (tx, mut rx) = result_queue();
        self.draw(sink).await;
        let result = match topology {
            Topology::Cooperative => self.run_cooperative(tx, &mut rx, sink, &cancel).await,
            Topology::Split => self.run_split(tx, &mut rx, sink, &cancel).await,
        };

        self.set_state(SchedulerState::ShuttingDown);
        if let Err(e) = sink.restore() {
            warn!(error = %e, "failed to restore render sink");
        }
        self.set_state(SchedulerState::Stopped);
        match &result {
            Ok(reason) => info!(?reason, "scheduler stopped"),
            Err(e) => tracing::error!(error = %e, "scheduler stopped on fatal error"),
        }
        result
    }

    async fn run_cooperative(
        &self,
        tx: ResultSender,
        rx: &mut ResultReceiver,
        sink: &mut dyn RenderSink,
        cancel: &CancellationToken,
    ) -> Result<StopReason, HostwatchError> {
        let mut round = 0u64;
        loop {
            if cancel.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }
            if let Some(max) = self.config.max_rounds
                && round >= max
            {
                return Ok(StopReason::RoundLimit);
            }
            round += 1;
            let dispatch = self.dispatcher.dispatch_round(round, &tx, cancel);
            tokio::pin!(dispatch);
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // Published before the dispatcher aborts the in-flight probes.
                    self.set_state(SchedulerState::ShuttingDown);
                    dispatch.await
                }
                outcome = &mut dispatch => outcome,
            };
            match outcome {
                RoundOutcome::Completed { .. } => self.drain_and_render(rx, sink).await?,
                RoundOutcome::Cancelled { .. } => {
                    self.set_state(SchedulerState::ShuttingDown);
                    return Ok(StopReason::Cancelled);
                }
            }
        }
    }

    async fn run_split(
        &self,
        tx: ResultSender,
        rx: &mut ResultReceiver,
        sink: &mut dyn RenderSink,
        cancel: &CancellationToken,
    ) -> Result<StopReason, HostwatchError> {
        // Separate from `cancel` so ShuttingDown is published before probes are aborted.
        // The guard stops the dispatch unit if this future is dropped mid-run.
        let dispatch_cancel = CancellationToken::new();
        let _dispatch_guard = dispatch_cancel.clone().drop_guard();
        let mut dispatch = tokio::spawn(dispatch_loop(
            self.dispatcher.clone(),
            tx,
            self.config.max_rounds,
            dispatch_cancel.clone(),
        ));
        let mut dispatch_done = false;

        let mut tick = interval(self.config.refresh_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(StopReason::Cancelled),
                finished = &mut dispatch, if !dispatch_done => {
                    dispatch_done = true;
                    match finished {
                        Ok(rounds) => {
                            debug!(rounds, "dispatch unit finished");
                            break self.drain_and_render(rx, sink).await.map(|_| StopReason::RoundLimit);
                        }
                        Err(e) => break Err(HostwatchError::from(e)),
                    }
                }
                _ = tick.tick() => {
                    if let Err(e) = self.drain_and_render(rx, sink).await {
                        break Err(e);
                    }
                }
            }
        };

        self.set_state(SchedulerState::ShuttingDown);
        dispatch_cancel.cancel();
        if !dispatch_done {
            match dispatch.await {
                Ok(rounds) => debug!(rounds, "dispatch unit stopped"),
                Err(e) => warn!(error = %e, "dispatch unit did not stop cleanly"),
            }
        }
        result
    }

    async fn drain_and_render(
        &self,
        rx: &mut ResultReceiver,
        sink: &mut dyn RenderSink,
    ) -> Result<(), HostwatchError> {
        let results = rx.drain();
        let merged = self.aggregator.merge_all(&results).await?;
        if merged > 0 {
            debug!(merged, "merged results");
        }
        self.draw(sink).await;
        Ok(())
    }

    async fn draw(&self, sink: &mut dyn RenderSink) {
        let frame = self.renderer.render(&self.aggregator.snapshot().await);
        if let Err(e) = sink.draw(&frame) {
            warn!(error = %e, "render sink draw failed");
        }
    }

    fn set_state(&self, next: SchedulerState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!(from = ?*current, to = ?next, "scheduler state");
            *current = next;
            true
        });
    }
}

/// Split topology dispatch unit. Returns the number of rounds started.
async fn dispatch_loop<P: Prober>(
    dispatcher: Dispatcher<P>,
    tx: ResultSender,
    max_rounds: Option<u64>,
    cancel: CancellationToken,
) -> u64 {
    let mut round = 0u64;
    loop {
        if cancel.is_cancelled() {
            break;
        }
        if tx.is_closed() {
            debug!(rounds = round, "result queue closed; dispatch unit stopping");
            break;
        }
        if let Some(max) = max_rounds
            && round >= max
        {
            break;
        }
        round += 1;
        if let RoundOutcome::Cancelled { .. } = dispatcher.dispatch_round(round, &tx, &cancel).await {
            break;
        }
    }
    round
}
