// One reachability + latency measurement per call. Failures come back as data, never as errors.

mod parse;

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::config::{ProbeConfig, RttSource};
use crate::models::Measurement;

pub use parse::{OutputParser, ParsedTimes, PingOutputParser};

/// Reachability primitive. Implementations must finish within roughly `timeout`
/// and must not leave work behind when the returned future is dropped.
pub trait Prober: Send + Sync + 'static {
    fn probe(&self, host: &str, timeout: Duration) -> impl Future<Output = Measurement> + Send;
}

/// Runs an external command (the system `ping` by default) once per probe.
#[derive(Debug, Clone)]
pub struct CommandProber<O = PingOutputParser> {
    program: String,
    args: Vec<String>,
    rtt_source: RttSource,
    parser: O,
}

impl CommandProber<PingOutputParser> {
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone(), PingOutputParser)
            .with_rtt_source(config.rtt_source)
    }
}

impl<O: OutputParser> CommandProber<O> {
    pub fn new(program: impl Into<String>, args: Vec<String>, parser: O) -> Self {
        Self {
            program: program.into(),
            args,
            rtt_source: RttSource::default(),
            parser,
        }
    }

    pub fn with_rtt_source(mut self, rtt_source: RttSource) -> Self {
        self.rtt_source = rtt_source;
        self
    }

    /// Argument list with `{host}`, `{timeout_secs}` and `{timeout_ms}` substituted.
    pub fn command_args(&self, host: &str, timeout: Duration) -> Vec<String> {
        let timeout_ms = timeout.as_millis().max(1);
        let timeout_secs = timeout_ms.div_ceil(1000).max(1);
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{host}", host)
                    .replace("{timeout_secs}", &timeout_secs.to_string())
                    .replace("{timeout_ms}", &timeout_ms.to_string())
            })
            .collect()
    }

    async fn run(&self, host: &str, timeout: Duration) -> Measurement {
        let mut child = match Command::new(&self.program)
            .args(self.command_args(host, timeout))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!(host, program = %self.program, error = %e, "probe spawn failed");
                return Measurement::unreachable();
            }
        };

        let mut stdout = child.stdout.take();
        let collect = async {
            let mut buf = String::new();
            if let Some(out) = stdout.as_mut()
                && let Err(e) = out.read_to_string(&mut buf).await
            {
                tracing::debug!(host, error = %e, "reading probe output failed");
            }
            (child.wait().await, buf)
        };

        let outcome = tokio::time::timeout(timeout, collect).await;
        match outcome {
            Ok((Ok(status), output)) => {
                let (rtt_ms, latency_ms) = self.parser.parse(&output).resolve(self.rtt_source);
                if status.success() {
                    Measurement::reachable(rtt_ms, latency_ms)
                } else {
                    tracing::trace!(host, %status, "probe reported unreachable");
                    Measurement::unreachable()
                }
            }
            Ok((Err(e), _)) => {
                tracing::debug!(host, error = %e, "waiting for probe failed");
                Measurement::unreachable()
            }
            Err(_) => {
                tracing::debug!(host, timeout_ms = timeout.as_millis() as u64, "probe timed out");
                if let Err(e) = child.start_kill() {
                    tracing::debug!(host, error = %e, "killing timed-out probe failed");
                }
                // Reap so no zombie outlives the round.
                let _ = child.wait().await;
                Measurement::unreachable()
            }
        }
    }
}

impl<O: OutputParser> Prober for CommandProber<O> {
    fn probe(&self, host: &str, timeout: Duration) -> impl Future<Output = Measurement> + Send {
        self.run(host, timeout)
    }
}
