// Pure projection of aggregator snapshots into a table model. Never touches aggregator state.

use crossterm::style::Color;

use crate::config::AppConfig;
use crate::models::{HostSnapshot, Outcome};

pub const COLUMNS: [&str; 6] = ["Host", "RTT AVG", "TIME AVG", "LOSS", "SEQ", "Status"];
pub const PLACEHOLDER: &str = "Collecting data. Please wait...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Ok,
    Warn,
    Critical,
}

/// Two-threshold loss tiering. Setting both thresholds equal gives a two-tier scheme.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossPolicy {
    pub warn_above: f64,
    pub critical_at: f64,
}

impl LossPolicy {
    pub fn classify(&self, loss_percent: f64) -> Severity {
        if loss_percent <= 0.0 {
            Severity::Ok
        } else if loss_percent >= self.critical_at {
            Severity::Critical
        } else if loss_percent > self.warn_above {
            Severity::Warn
        } else {
            Severity::Ok
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub ok: Color,
    pub warn: Color,
    pub critical: Color,
    pub success_glyph: Color,
    pub failure_glyph: Color,
}

impl Palette {
    pub fn severity(&self, severity: Severity) -> Color {
        match severity {
            Severity::Ok => self.ok,
            Severity::Warn => self.warn,
            Severity::Critical => self.critical,
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            ok: Color::Green,
            warn: Color::DarkYellow,
            critical: Color::Red,
            success_glyph: Color::Green,
            failure_glyph: Color::Red,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableModel {
    /// Nothing merged yet.
    Placeholder(String),
    Table(TableView),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableView {
    pub title: String,
    pub columns: [&'static str; 6],
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub host: String,
    pub rtt_avg: String,
    pub time_avg: String,
    pub loss: LossCell,
    pub seq: String,
    /// Exactly `window_width` cells, oldest outcome leftmost.
    pub status: Vec<StatusCell>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LossCell {
    pub text: String,
    pub severity: Severity,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusCell {
    Glyph { glyph: String, color: Color },
    Blank,
}

impl StatusCell {
    pub fn text(&self) -> &str {
        match self {
            StatusCell::Glyph { glyph, .. } => glyph,
            StatusCell::Blank => " ",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Renderer {
    pub title: String,
    pub window_width: usize,
    pub success_glyph: String,
    pub failure_glyph: String,
    pub policy: LossPolicy,
    pub palette: Palette,
}

impl Renderer {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            title: config.table.title.clone(),
            window_width: config.table.window_width,
            success_glyph: config.table.success_glyph.clone(),
            failure_glyph: config.table.failure_glyph.clone(),
            policy: config.table.loss_policy(),
            palette: config.colors.palette()?,
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn render(&self, snapshot: &[HostSnapshot]) -> TableModel {
        if snapshot.is_empty() {
            return TableModel::Placeholder(PLACEHOLDER.to_string());
        }
        TableModel::Table(TableView {
            title: self.title.clone(),
            columns: COLUMNS,
            rows: snapshot.iter().map(|h| self.row(h)).collect(),
        })
    }

    fn row(&self, host: &HostSnapshot) -> TableRow {
        let severity = self.policy.classify(host.loss_percent);
        TableRow {
            host: host.host.clone(),
            rtt_avg: format!("{:.1}ms", host.avg_rtt_ms),
            time_avg: format!("{:.1}ms", host.avg_latency_ms),
            loss: LossCell {
                text: format!("{:.1}%", host.loss_percent),
                severity,
                color: self.palette.severity(severity),
            },
            seq: host.rounds.to_string(),
            status: self.status_cells(&host.window),
        }
    }

    fn status_cells(&self, window: &[Outcome]) -> Vec<StatusCell> {
        let skip = window.len().saturating_sub(self.window_width);
        let mut cells: Vec<StatusCell> = window[skip..]
            .iter()
            .map(|outcome| match outcome {
                Outcome::Success => StatusCell::Glyph {
                    glyph: self.success_glyph.clone(),
                    color: self.palette.success_glyph,
                },
                Outcome::Failure => StatusCell::Glyph {
                    glyph: self.failure_glyph.clone(),
                    color: self.palette.failure_glyph,
                },
            })
            .collect();
        cells.resize(self.window_width, StatusCell::Blank);
        cells
    }
}
