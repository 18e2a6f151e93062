//! CI job log cleanup for failure reports.
//!
//! Raw job traces carry terminal escape codes and machine-readable section
//! markers (`section_start:<unix-ts>:<name>` / `section_end:<unix-ts>:<name>`).
//! Reports show a plain tail of the log with the markers turned into readable
//! "Start"/"End" lines.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B[@-_][0-?]*[ -/]*[@-~]").expect("ANSI escape pattern is valid")
});

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r\n|\n|\r").expect("line break pattern is valid"));

const SECTION_START: &str = "section_start:";
const SECTION_END: &str = "section_end:";

/// Remove ANSI escape control sequences.
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Parse `<unix-ts>:<name>[options]` following a section prefix.
fn parse_marker(rest: &str) -> Option<(i64, &str)> {
    let (timestamp, name) = rest.split_once(':')?;
    let timestamp = timestamp.trim().parse::<i64>().ok()?;
    // Options such as `[collapsed=true]` follow the name
    let name = name.split('[').next().unwrap_or(name).trim();
    Some((timestamp, name))
}

/// Format a duration in seconds as `mm:ss`. Minutes do not wrap at the hour.
fn format_elapsed(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Summary line for a section end, with the elapsed time when it is known.
fn section_end_line(name: &str, started: Option<i64>, ended: i64) -> String {
    match started.and_then(|started| ended.checked_sub(started)) {
        Some(elapsed) => format!("End of {name}, time - {}", format_elapsed(elapsed)),
        None => format!("End of {name}"),
    }
}

/// Replace section markers by readable summaries.
///
/// An end marker without a matching start is reported without elapsed time.
pub fn summarize_sections(lines: Vec<String>) -> Vec<String> {
    let mut starts: HashMap<String, i64> = HashMap::new();
    lines
        .into_iter()
        .map(|line| {
            if let Some(rest) = line.strip_prefix(SECTION_START)
                && let Some((timestamp, name)) = parse_marker(rest)
            {
                starts.insert(name.to_string(), timestamp);
                return format!("Start {name}");
            }
            if let Some(rest) = line.strip_prefix(SECTION_END)
                && let Some((timestamp, name)) = parse_marker(rest)
            {
                return section_end_line(name, starts.remove(name), timestamp);
            }
            line
        })
        .collect()
}

/// Keep the last `max_lines` lines, or all of them if there are fewer.
pub fn tail(lines: Vec<String>, max_lines: usize) -> Vec<String> {
    let skip = lines.len().saturating_sub(max_lines);
    lines.into_iter().skip(skip).collect()
}

/// Turn a raw job trace into the text posted with a failure report.
pub fn summarize_log(raw: &[u8], max_lines: usize) -> String {
    let text = strip_ansi(&String::from_utf8_lossy(raw));
    let mut lines: Vec<String> = LINE_BREAK.split(&text).map(str::to_string).collect();
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    tail(summarize_sections(lines), max_lines).join("\n")
}
