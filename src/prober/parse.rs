// Extract reply time and summary RTT from ping output (Linux, BSD/macOS and Windows formats).

use crate::config::RttSource;

/// Numbers found in one probe's output; `None` when the field is missing or unparseable.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParsedTimes {
    /// Per-reply `time=` value.
    pub reply_ms: Option<f64>,
    /// First value of the `min/avg/max` summary line.
    pub summary_ms: Option<f64>,
}

/// Probe-output adapter: swap it to support another tool's format.
pub trait OutputParser: Send + Sync + 'static {
    fn parse(&self, stdout: &str) -> ParsedTimes;
}

impl ParsedTimes {
    /// Maps parsed numbers to `(rtt_ms, latency_ms)`; missing values become 0.
    pub fn resolve(self, rtt_source: RttSource) -> (f64, f64) {
        let rtt = match rtt_source {
            RttSource::Summary => self.summary_ms,
            RttSource::Reply => self.reply_ms,
        };
        (rtt.unwrap_or(0.0), self.reply_ms.unwrap_or(0.0))
    }
}

/// Parser for the system `ping` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct PingOutputParser;

impl OutputParser for PingOutputParser {
    fn parse(&self, stdout: &str) -> ParsedTimes {
        ParsedTimes {
            reply_ms: stdout.lines().find_map(parse_reply_time),
            summary_ms: stdout.lines().find_map(parse_summary),
        }
    }
}

/// `64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=12.3 ms`, Windows `time=12ms` / `time<1ms`.
fn parse_reply_time(line: &str) -> Option<f64> {
    let lower = line.to_ascii_lowercase();
    let idx = lower.find("time=").or_else(|| lower.find("time<"))?;
    let rest = &line[idx + "time=".len()..];
    leading_number(rest)
}

/// `rtt min/avg/max/mdev = 12.3/12.3/12.3/0.000 ms` or `round-trip min/avg/max/stddev = ...`.
fn parse_summary(line: &str) -> Option<f64> {
    if !line.contains("min/avg/max") {
        return None;
    }
    let values = line.split('=').nth(1)?.trim();
    let first = values.split('/').next()?;
    first.trim().parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

fn leading_number(s: &str) -> Option<f64> {
    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}
