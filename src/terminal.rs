// Rendering sinks: crossterm live view and a plain-text writer for non-TTY output.

use std::io::{self, Write};

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::style::{Color, Print, PrintStyledContent, Stylize};
use crossterm::terminal::{Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, queue};

use crate::renderer::{StatusCell, TableModel};

const COLUMN_GAP: &str = "  ";

/// Where table frames go. `restore` must be safe to call more than once.
pub trait RenderSink: Send {
    fn draw(&mut self, frame: &TableModel) -> io::Result<()>;
    fn restore(&mut self) -> io::Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub text: String,
    pub color: Option<Color>,
    pub bold: bool,
}

impl Span {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: None,
            bold: false,
        }
    }

    fn bold(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: None,
            bold: true,
        }
    }

    fn colored(text: impl Into<String>, color: Color) -> Self {
        Self {
            text: text.into(),
            color: Some(color),
            bold: false,
        }
    }
}

pub type Line = Vec<Span>;

/// Lays a table model out as styled lines: title, header, one line per row.
/// Columns are left-aligned and as wide as their widest cell.
pub fn format_lines(frame: &TableModel) -> Vec<Line> {
    let view = match frame {
        TableModel::Placeholder(text) => return vec![vec![Span::plain(text.clone())]],
        TableModel::Table(view) => view,
    };

    let cells: Vec<[&str; 5]> = view
        .rows
        .iter()
        .map(|r| {
            [
                r.host.as_str(),
                r.rtt_avg.as_str(),
                r.time_avg.as_str(),
                r.loss.text.as_str(),
                r.seq.as_str(),
            ]
        })
        .collect();
    let mut widths = [0usize; 5];
    for (i, width) in widths.iter_mut().enumerate() {
        *width = cells
            .iter()
            .map(|c| c[i].chars().count())
            .chain(std::iter::once(view.columns[i].chars().count()))
            .max()
            .unwrap_or(0);
    }

    let mut lines = Vec::with_capacity(view.rows.len() + 2);
    lines.push(vec![Span::bold(view.title.clone())]);

    let mut header = Vec::with_capacity(6);
    for (i, width) in widths.iter().enumerate() {
        header.push(Span::bold(pad(view.columns[i], *width)));
        header.push(Span::plain(COLUMN_GAP));
    }
    header.push(Span::bold(view.columns[5]));
    lines.push(header);

    for (row, texts) in view.rows.iter().zip(&cells) {
        let mut line = Vec::with_capacity(10 + row.status.len());
        for (i, width) in widths.iter().enumerate() {
            let text = pad(texts[i], *width);
            if i == 3 {
                line.push(Span::colored(text, row.loss.color));
            } else {
                line.push(Span::plain(text));
            }
            line.push(Span::plain(COLUMN_GAP));
        }
        for cell in &row.status {
            match cell {
                StatusCell::Glyph { glyph, color } => line.push(Span::colored(glyph.clone(), *color)),
                StatusCell::Blank => line.push(Span::plain(" ")),
            }
        }
        lines.push(line);
    }
    lines
}

fn pad(text: &str, width: usize) -> String {
    format!("{:<width$}", text, width = width)
}

/// Live view on the alternate screen. Restores the terminal on drop.
pub struct TerminalSink<W: Write + Send> {
    out: W,
    active: bool,
}

impl TerminalSink<io::Stdout> {
    pub fn stdout() -> io::Result<Self> {
        Self::open(io::stdout())
    }
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn open(mut out: W) -> io::Result<Self> {
        execute!(out, EnterAlternateScreen, Hide)?;
        Ok(Self { out, active: true })
    }
}

impl<W: Write + Send> RenderSink for TerminalSink<W> {
    fn draw(&mut self, frame: &TableModel) -> io::Result<()> {
        queue!(self.out, MoveTo(0, 0), Clear(ClearType::All))?;
        for line in format_lines(frame) {
            for span in line {
                match (span.color, span.bold) {
                    (Some(color), true) => {
                        queue!(self.out, PrintStyledContent(span.text.with(color).bold()))?
                    }
                    (Some(color), false) => {
                        queue!(self.out, PrintStyledContent(span.text.with(color)))?
                    }
                    (None, true) => queue!(self.out, PrintStyledContent(span.text.bold()))?,
                    (None, false) => queue!(self.out, Print(span.text))?,
                }
            }
            queue!(self.out, Print("\r\n"))?;
        }
        self.out.flush()
    }

    fn restore(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        execute!(self.out, Show, LeaveAlternateScreen)
    }
}

impl<W: Write + Send> Drop for TerminalSink<W> {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            tracing::warn!(error = %e, "failed to restore terminal");
        }
    }
}

/// Writes each frame as plain text followed by a blank line.
pub struct PlainSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> PlainSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> RenderSink for PlainSink<W> {
    fn draw(&mut self, frame: &TableModel) -> io::Result<()> {
        for line in format_lines(frame) {
            let text: String = line.iter().map(|s| s.text.as_str()).collect();
            writeln!(self.out, "{}", text.trim_end())?;
        }
        writeln!(self.out)?;
        self.out.flush()
    }

    fn restore(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
