use std::path::Path;
use std::time::Duration;

use crossterm::style::Color;
use serde::Deserialize;

use crate::error::HostwatchError;
use crate::renderer::{LossPolicy, Palette};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Host list file, one host per line. Ignored when `hosts` is set.
    #[serde(default = "default_hosts_file")]
    pub hosts_file: String,
    #[serde(default)]
    pub hosts: Option<Vec<String>>,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub table: TableConfig,
    #[serde(default)]
    pub colors: ColorConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

fn default_hosts_file() -> String {
    "hosts.txt".into()
}

/// Which number in the ping output feeds the RTT AVG column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RttSource {
    /// The `min/avg/max` summary line.
    #[default]
    Summary,
    /// The per-reply `time=` field.
    Reply,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_ms: u64,
    pub program: String,
    /// Placeholders: `{host}`, `{timeout_secs}`, `{timeout_ms}`.
    pub args: Vec<String>,
    /// Max concurrent probes per round; 0 = one per host.
    pub max_in_flight: usize,
    pub rtt_source: RttSource,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            program: "ping".into(),
            args: default_ping_args(),
            max_in_flight: 0,
            rtt_source: RttSource::Summary,
        }
    }
}

fn default_ping_args() -> Vec<String> {
    let args: &[&str] = if cfg!(windows) {
        &["-n", "1", "-w", "{timeout_ms}", "{host}"]
    } else {
        &["-c", "1", "-W", "{timeout_secs}", "{host}"]
    };
    args.iter().map(|a| a.to_string()).collect()
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn max_in_flight(&self) -> Option<usize> {
        (self.max_in_flight > 0).then_some(self.max_in_flight)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub title: String,
    /// Status column width W: number of past outcomes kept per host.
    pub window_width: usize,
    pub success_glyph: String,
    pub failure_glyph: String,
    /// Loss above this is at least "warn".
    pub loss_warn_percent: f64,
    /// Loss at or above this is "critical".
    pub loss_critical_percent: f64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            title: "Hostwatcher".into(),
            window_width: 40,
            success_glyph: "!".into(),
            failure_glyph: ".".into(),
            loss_warn_percent: 0.0,
            loss_critical_percent: 20.0,
        }
    }
}

impl TableConfig {
    pub fn loss_policy(&self) -> LossPolicy {
        LossPolicy {
            warn_above: self.loss_warn_percent,
            critical_at: self.loss_critical_percent,
        }
    }
}

/// Color names as understood by crossterm ("green", "dark_yellow", ...).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub ok: String,
    pub warn: String,
    pub critical: String,
    pub success_glyph: String,
    pub failure_glyph: String,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            ok: "green".into(),
            warn: "dark_yellow".into(),
            critical: "red".into(),
            success_glyph: "green".into(),
            failure_glyph: "red".into(),
        }
    }
}

impl ColorConfig {
    pub fn palette(&self) -> anyhow::Result<Palette> {
        Ok(Palette {
            ok: parse_color("colors.ok", &self.ok)?,
            warn: parse_color("colors.warn", &self.warn)?,
            critical: parse_color("colors.critical", &self.critical)?,
            success_glyph: parse_color("colors.success_glyph", &self.success_glyph)?,
            failure_glyph: parse_color("colors.failure_glyph", &self.failure_glyph)?,
        })
    }
}

fn parse_color(key: &str, name: &str) -> anyhow::Result<Color> {
    Color::try_from(name).map_err(|_| anyhow::anyhow!("{} has unknown color {:?}", key, name))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Split topology: how often the render unit drains and redraws.
    pub refresh_interval_ms: u64,
    /// How long an interrupted run may take to stop before it is forcibly terminated.
    pub shutdown_grace_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 250,
            shutdown_grace_ms: 3000,
        }
    }
}

impl DisplayConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.probe.timeout_ms > 0,
            "probe.timeout_ms must be > 0, got {}",
            self.probe.timeout_ms
        );
        anyhow::ensure!(
            !self.probe.program.trim().is_empty(),
            "probe.program must be non-empty"
        );
        anyhow::ensure!(
            self.probe.args.iter().any(|a| a.contains("{host}")),
            "probe.args must contain a {{host}} placeholder"
        );
        anyhow::ensure!(
            self.table.window_width > 0,
            "table.window_width must be > 0, got {}",
            self.table.window_width
        );
        anyhow::ensure!(
            !self.table.success_glyph.is_empty(),
            "table.success_glyph must be non-empty"
        );
        anyhow::ensure!(
            !self.table.failure_glyph.is_empty(),
            "table.failure_glyph must be non-empty"
        );
        let warn = self.table.loss_warn_percent;
        let critical = self.table.loss_critical_percent;
        anyhow::ensure!(
            (0.0..=100.0).contains(&warn),
            "table.loss_warn_percent must be between 0 and 100, got {}",
            warn
        );
        anyhow::ensure!(
            (0.0..=100.0).contains(&critical),
            "table.loss_critical_percent must be between 0 and 100, got {}",
            critical
        );
        anyhow::ensure!(
            warn <= critical,
            "table.loss_warn_percent ({}) must not exceed table.loss_critical_percent ({})",
            warn,
            critical
        );
        anyhow::ensure!(
            self.display.refresh_interval_ms > 0,
            "display.refresh_interval_ms must be > 0, got {}",
            self.display.refresh_interval_ms
        );
        anyhow::ensure!(
            self.display.shutdown_grace_ms > 0,
            "display.shutdown_grace_ms must be > 0, got {}",
            self.display.shutdown_grace_ms
        );
        self.colors.palette()?;
        if let Some(hosts) = &self.hosts {
            anyhow::ensure!(!hosts.is_empty(), "hosts must not be an empty list");
        }
        Ok(())
    }

    /// Host list for the run: `override_file`, else inline `hosts`, else `hosts_file`.
    pub fn resolve_hosts(&self, override_file: Option<&Path>) -> Result<Vec<String>, HostwatchError> {
        let hosts = match (override_file, &self.hosts) {
            (Some(path), _) => load_hosts_file(path)?,
            (None, Some(inline)) => parse_hosts(&inline.join("\n")),
            (None, None) => load_hosts_file(Path::new(&self.hosts_file))?,
        };
        if hosts.is_empty() {
            return Err(HostwatchError::Config("host list is empty".into()));
        }
        Ok(hosts)
    }
}

pub fn load_hosts_file(path: &Path) -> Result<Vec<String>, HostwatchError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| HostwatchError::Config(format!("reading {}: {}", path.display(), e)))?;
    Ok(parse_hosts(&text))
}

/// One host per line; blank lines and `#` comments skipped; duplicates keep the first position.
pub fn parse_hosts(text: &str) -> Vec<String> {
    let mut hosts: Vec<String> = Vec::new();
    for line in text.lines() {
        let host = line.split('#').next().unwrap_or("").trim();
        if host.is_empty() {
            continue;
        }
        if hosts.iter().any(|h| h == host) {
            tracing::warn!(host, "duplicate host in host list; keeping first");
            continue;
        }
        hosts.push(host.to_string());
    }
    hosts
}
