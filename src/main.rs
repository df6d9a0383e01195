use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hostwatch::config::AppConfig;
use hostwatch::dispatcher::Dispatcher;
use hostwatch::error::HostwatchError;
use hostwatch::prober::CommandProber;
use hostwatch::renderer::Renderer;
use hostwatch::scheduler::{Scheduler, SchedulerConfig, StopReason, Topology};
use hostwatch::terminal::{PlainSink, RenderSink, TerminalSink};
use hostwatch::version;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

/// Exit status when shutdown overran its grace period and the run was torn down
/// (128 + SIGKILL). Orderly stops use `StopReason::exit_status`.
const EXIT_FORCED: u8 = 137;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[derive(Parser)]
#[command(name = "hostwatch", version = version::VERSION, about = "Live reachability and latency table for a list of hosts")]
struct Cli {
    /// Config file (default: $CONFIG_FILE, else ./config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host list file; overrides `hosts` / `hosts_file` from the config.
    #[arg(long)]
    hosts: Option<PathBuf>,

    /// Run dispatch and rendering as two independent units sharing the result queue.
    #[arg(long, alias = "multiprocess")]
    split: bool,

    /// Stop after this many rounds.
    #[arg(long)]
    rounds: Option<u64>,

    /// Print plain-text frames instead of the live view (implied when stdout is not a terminal).
    #[arg(long)]
    plain: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; keep the default quiet so the live table stays readable.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            eprintln!("{}: {:#}", version::NAME, e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path),
        None => AppConfig::load(),
    }
    .context("loading configuration")?;
    let hosts = config.resolve_hosts(cli.hosts.as_deref())?;

    let started = chrono::Local::now();
    let renderer = Renderer::from_config(&config)?.with_title(format!(
        "{} (started at {})",
        config.table.title,
        started.format("%Y-%m-%d %H:%M:%S")
    ));
    let prober = Arc::new(CommandProber::from_config(&config.probe));
    let dispatcher = Dispatcher::new(prober, hosts, config.probe.timeout())
        .with_max_in_flight(config.probe.max_in_flight());
    let scheduler = Scheduler::new(
        dispatcher,
        renderer,
        SchedulerConfig {
            refresh_interval: config.display.refresh_interval(),
            max_rounds: cli.rounds,
        },
    );
    let topology = if cli.split {
        Topology::Split
    } else {
        Topology::Cooperative
    };

    let mut sink: Box<dyn RenderSink> = if cli.plain || !std::io::stdout().is_terminal() {
        Box::new(PlainSink::new(std::io::stdout()))
    } else {
        Box::new(TerminalSink::stdout().context("opening terminal")?)
    };

    tracing::info!(version = version::VERSION, ?topology, "{} starting", version::NAME);

    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let mut handle =
        tokio::spawn(async move { scheduler.run(topology, sink.as_mut(), run_cancel).await });

    tokio::select! {
        joined = &mut handle => return finish(joined),
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
        }
    }

    cancel.cancel();
    tokio::select! {
        joined = &mut handle => return finish(joined),
        _ = tokio::time::sleep(config.display.shutdown_grace()) => {
            tracing::warn!("shutdown overran its grace period; forcing termination");
        }
        _ = shutdown_signal() => {
            tracing::warn!("second shutdown signal; forcing termination");
        }
    }

    // Aborting the task drops the sink (restoring the terminal) and every probe task
    // (killing their subprocesses).
    handle.abort();
    let _ = handle.await;
    Ok(ExitCode::from(EXIT_FORCED))
}

fn finish(
    joined: std::result::Result<std::result::Result<StopReason, HostwatchError>, JoinError>,
) -> Result<ExitCode> {
    let reason = joined.context("scheduler task")??;
    tracing::debug!(?reason, "run finished");
    Ok(ExitCode::from(reason.exit_status()))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
