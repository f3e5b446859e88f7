//! Report rendering
//!
//! Renderers only read a finished [`ProbeReport`]; results are already
//! scrubbed of secrets by the engine.

use crate::report::{ProbeReport, Status};
use std::fmt::Write;

/// Turns a report into text for a terminal, a file, or another tool.
pub trait Renderer {
    fn render(&self, report: &ProbeReport) -> String;
}

/// Aligned table, one row per check with its data indented below,
/// followed by a one-line summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextRenderer;

/// Pretty-printed JSON of the whole report.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl Renderer for TextRenderer {
    fn render(&self, report: &ProbeReport) -> String {
        let mut out = String::new();
        if report.is_empty() {
            out.push_str("No checks registered.\n");
            return out;
        }

        let _ = writeln!(
            out,
            "{:<8} {:<24} {:<12} {:>7}  {}",
            "Status", "Check", "Target", "Time", "Detail"
        );
        let _ = writeln!(out, "{}", "-".repeat(100));
        for result in &report.results {
            let status = match result.status {
                Status::Ok => "OK",
                Status::Failed => "FAIL",
                Status::Skipped => "SKIP",
            };
            let detail = match result.error {
                Some(kind) => format!("[{kind}] {}", result.detail),
                None => result.detail.clone(),
            };
            let _ = writeln!(
                out,
                "{:<8} {:<24} {:<12} {:>5}ms  {}",
                status,
                truncate(&result.id, 24),
                truncate(&result.target, 12),
                result.duration.as_millis(),
                detail,
            );
            if let Some(data) = &result.data {
                let _ = writeln!(out, "{:>8} {data}", "");
            }
        }

        let _ = writeln!(
            out,
            "\n{} check(s): {} ok, {} failed, {} skipped in {}ms",
            report.len(),
            report.count(Status::Ok),
            report.count(Status::Failed),
            report.count(Status::Skipped),
            report.elapsed.as_millis(),
        );
        out
    }
}

impl Renderer for JsonRenderer {
    fn render(&self, report: &ProbeReport) -> String {
        serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut cut: String = s.chars().take(max.saturating_sub(3)).collect();
        cut.push_str("...");
        cut
    }
}
