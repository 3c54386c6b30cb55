//! Report rendering
//!
//! One renderer produces the human-readable summary consumed by both the
//! PR comment and the ticket comment, so the two surfaces never drift.
//! Blocks are CRLF-joined to render cleanly in both hosts; lines within a
//! block use bare LF.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::orchestrate::RunResult;

/// Renders the per-directory file listing.
///
/// One block per target, in input order: `Directory: '<label>'` followed by
/// `Files: NA` for an empty applied list, or a `Files:` header with one
/// indented bullet per applied unit in engine (version) order.
#[must_use]
pub fn render_directory_listing(result: &RunResult) -> String {
    let blocks: Vec<String> = result
        .outcomes
        .iter()
        .map(|outcome| {
            if outcome.applied.is_empty() {
                format!("Directory: '{}'\n  Files: NA", outcome.directory)
            } else {
                let mut block = format!("Directory: '{}'\n  Files:", outcome.directory);
                for unit in &outcome.applied {
                    block.push_str("\n    - ");
                    block.push_str(unit);
                }
                block
            }
        })
        .collect();
    blocks.join("\r\n")
}

/// Renders the full run comment: original command text, status banner with
/// timestamp and execution link (plus `: <reason>` on failure), then the
/// per-directory listing.
#[must_use]
pub fn render_run_comment(
    command: &str,
    result: &RunResult,
    run_link: &str,
    at: DateTime<Utc>,
) -> String {
    let timestamp = at.to_rfc3339_opts(SecondsFormat::Secs, true);
    let banner = match &result.combined_error {
        None => format!("**Migrations successful** at {timestamp} ([execution]({run_link}))"),
        Some(reason) => format!(
            "**Migrations failed** at {timestamp} ([execution]({run_link})): {reason}"
        ),
    };
    format!(
        "{command}\r\n\r\n{banner}\r\n\r\n{}",
        render_directory_listing(result)
    )
}

/// Renders the rejection comment posted when the gate refuses a command.
/// No migration ran, so there is no listing.
#[must_use]
pub fn render_rejection_comment(command: &str, reason: &str) -> String {
    format!("{command}\r\n\r\n**Migrations failed**: {reason}")
}
