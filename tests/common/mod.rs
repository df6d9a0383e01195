// Shared test helpers: scripted prober, in-memory sink, renderer fixture

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hostwatch::models::{Measurement, ProbeResult};
use hostwatch::prober::Prober;
use hostwatch::renderer::{LossPolicy, Palette, Renderer, TableModel};
use hostwatch::scheduler::SchedulerState;
use hostwatch::terminal::RenderSink;
use tokio::sync::watch;

/// What a fake probe does on one call.
#[derive(Debug, Clone)]
pub enum Script {
    Reply { rtt_ms: f64, latency_ms: f64, delay: Duration },
    Unreachable,
    /// Never completes; only cancellation or abandonment ends it.
    Hang,
    /// The probe task panics.
    Panic,
}

impl Script {
    pub fn reply(rtt_ms: f64) -> Self {
        Script::Reply {
            rtt_ms,
            latency_ms: rtt_ms,
            delay: Duration::ZERO,
        }
    }

    pub fn slow(rtt_ms: f64, delay: Duration) -> Self {
        Script::Reply {
            rtt_ms,
            latency_ms: rtt_ms,
            delay,
        }
    }
}

struct LiveGuard {
    live: Arc<AtomicUsize>,
    state: Option<watch::Receiver<SchedulerState>>,
    ended_in: Arc<Mutex<Vec<SchedulerState>>>,
}

impl LiveGuard {
    fn new(
        live: Arc<AtomicUsize>,
        state: Option<watch::Receiver<SchedulerState>>,
        ended_in: Arc<Mutex<Vec<SchedulerState>>>,
    ) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            live,
            state,
            ended_in,
        }
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        if let Some(state) = &self.state {
            self.ended_in.lock().unwrap().push(*state.borrow());
        }
    }
}

/// Per-host scripts played in call order; the last entry repeats.
/// Hosts without a script reply with 1ms.
#[derive(Default)]
pub struct FakeProber {
    scripts: HashMap<String, Vec<Script>>,
    calls: Mutex<HashMap<String, usize>>,
    live: Arc<AtomicUsize>,
    started: AtomicUsize,
    state: Mutex<Option<watch::Receiver<SchedulerState>>>,
    ended_in: Arc<Mutex<Vec<SchedulerState>>>,
}

impl FakeProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, host: &str, steps: Vec<Script>) -> Self {
        self.scripts.insert(host.to_string(), steps);
        self
    }

    /// Probes currently in flight (started and not yet finished or dropped).
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Records the scheduler state at the moment each later probe finishes or is dropped.
    pub fn watch_state(&self, state: watch::Receiver<SchedulerState>) {
        *self.state.lock().unwrap() = Some(state);
    }

    pub fn ended_in(&self) -> Vec<SchedulerState> {
        self.ended_in.lock().unwrap().clone()
    }

    pub fn calls(&self, host: &str) -> usize {
        self.calls.lock().unwrap().get(host).copied().unwrap_or(0)
    }

    fn next(&self, host: &str) -> Script {
        let mut calls = self.calls.lock().unwrap();
        let n = calls.entry(host.to_string()).or_insert(0);
        let idx = *n;
        *n += 1;
        match self.scripts.get(host) {
            Some(steps) if !steps.is_empty() => steps[idx.min(steps.len() - 1)].clone(),
            _ => Script::reply(1.0),
        }
    }
}

impl Prober for FakeProber {
    fn probe(&self, host: &str, _timeout: Duration) -> impl Future<Output = Measurement> + Send {
        let script = self.next(host);
        self.started.fetch_add(1, Ordering::SeqCst);
        let guard = LiveGuard::new(
            Arc::clone(&self.live),
            self.state.lock().unwrap().clone(),
            Arc::clone(&self.ended_in),
        );
        async move {
            let _guard = guard;
            match script {
                Script::Reply {
                    rtt_ms,
                    latency_ms,
                    delay,
                } => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Measurement::reachable(rtt_ms, latency_ms)
                }
                Script::Unreachable => Measurement::unreachable(),
                Script::Hang => std::future::pending().await,
                Script::Panic => panic!("scripted panic"),
            }
        }
    }
}

/// Records frames; counts restores.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub frames: Vec<TableModel>,
    pub restores: usize,
}

impl MemorySink {
    pub fn last(&self) -> Option<&TableModel> {
        self.frames.last()
    }
}

impl RenderSink for MemorySink {
    fn draw(&mut self, frame: &TableModel) -> io::Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn restore(&mut self) -> io::Result<()> {
        self.restores += 1;
        Ok(())
    }
}

pub fn renderer(window_width: usize) -> Renderer {
    Renderer {
        title: "Hostwatcher".into(),
        window_width,
        success_glyph: "!".into(),
        failure_glyph: ".".into(),
        policy: LossPolicy {
            warn_above: 0.0,
            critical_at: 20.0,
        },
        palette: Palette::default(),
    }
}

pub fn hosts(names: &[&str]) -> Vec<String> {
    names.iter().map(|h| h.to_string()).collect()
}

pub fn ok(host: &str, round: u64, rtt_ms: f64) -> ProbeResult {
    ProbeResult::new(host, round, Measurement::reachable(rtt_ms, rtt_ms))
}

pub fn lost(host: &str, round: u64) -> ProbeResult {
    ProbeResult::new(host, round, Measurement::unreachable())
}
