//! Snapshot rendering for the reporter sink.
//!
//! The engine owns what is tracked; this module only decides how a
//! point-in-time snapshot looks on the wire. One metric line per
//! tracked path, or a single JSON object per target.

use std::fmt::Write;

use fsmon_engine::Snapshot;
use serde::Serialize;

/// Render a snapshot as metric lines:
/// `<target>|<path>|size=<bytes>|modified=<rfc3339>|changes=<n>`.
pub fn render(target: &str, snapshot: &Snapshot) -> String {
    let mut out = String::new();
    for (path, record) in snapshot {
        let _ = writeln!(
            out,
            "{target}|{}|size={}|modified={}|changes={}",
            path.display(),
            record.size,
            record.modified.to_rfc3339(),
            record.changes,
        );
    }
    out
}

/// Render a snapshot as one JSON object keyed by path.
pub fn render_json(target: &str, snapshot: &Snapshot) -> serde_json::Result<String> {
    #[derive(Serialize)]
    struct Report<'a> {
        target: &'a str,
        files: &'a Snapshot,
    }

    serde_json::to_string(&Report {
        target,
        files: snapshot,
    })
}
