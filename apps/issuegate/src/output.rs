//! Output rendering for check results and span listings.
//!
//! Supports `human` (default) and `json` outputs. Human output groups the
//! remaining issues per checked file, followed by statistics and the
//! verdict line. The JSON form carries per-outcome issues and defects plus
//! the summary and verdict.

use crate::error::{GateError, Result};
use crate::models::{Issue, RunResult, Severity, Summary};
use crate::spans::ElementSpan;
use owo_colors::OwoColorize;
use serde_json::json;
use serde_json::Value as JsonVal;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct PrintOptions {
    pub output: String,
    pub verbosity: Severity,
    pub color: bool,
    /// File paths under this directory are shown relative to it.
    pub root: Option<PathBuf>,
}

/// Colors apply to human output only, on request, unless `NO_COLOR` is set.
pub fn use_colors(output: &str, colorize: bool) -> bool {
    colorize && output != "json" && std::env::var_os("NO_COLOR").is_none()
}

/// Colors for stderr diagnostics follow the resolved `(output, colorize)`
/// settings; before settings are resolved diagnostics stay plain.
pub fn diagnostic_colors(settings: Option<(&str, bool)>) -> bool {
    settings.is_some_and(|(output, colorize)| use_colors(output, colorize))
}

pub fn error_prefix(color: bool) -> String {
    if color {
        "error:".red().bold().to_string()
    } else {
        "error:".to_string()
    }
}

pub fn note_prefix(color: bool) -> String {
    if color {
        "note:".cyan().bold().to_string()
    } else {
        "note:".to_string()
    }
}

fn severity_label(sev: Severity, color: bool) -> String {
    let s = sev.as_str();
    if !color {
        return s.to_string();
    }
    match sev {
        Severity::Fatal | Severity::Error => s.red().bold().to_string(),
        Severity::Warning => s.yellow().bold().to_string(),
        Severity::Information => s.blue().bold().to_string(),
    }
}

fn display_path(file: &str, root: Option<&Path>) -> String {
    let Some(root) = root else {
        return file.to_string();
    };
    let p = Path::new(file);
    if !p.is_absolute() {
        return file.to_string();
    }
    match pathdiff::diff_paths(p, root) {
        Some(rel) if !rel.starts_with("..") => rel.to_string_lossy().to_string(),
        _ => file.to_string(),
    }
}

fn render_issue(is: &Issue, color: bool) -> String {
    format!(
        "  -  {} at {} {}:\n     {}",
        severity_label(is.severity, color),
        is.expression,
        is.location_label(),
        is.message
    )
}

/// Render the human report (pure, for testing).
pub fn render_human(res: &RunResult, opts: &PrintOptions) -> String {
    let color = opts.color;
    let mut out = String::new();
    for o in &res.outcomes {
        if o.is_clean() {
            continue;
        }
        let mut header = format!("== {}", display_path(&o.file, opts.root.as_deref()));
        if let Some(id) = &o.resource_id {
            header.push_str(&format!(" ({})", id));
        }
        out.push_str(&header);
        out.push('\n');
        for is in o.all_issues() {
            if is.severity.at_least(opts.verbosity) {
                out.push_str(&render_issue(&is, color));
                out.push('\n');
            }
        }
        out.push('\n');
    }

    let stats: Vec<String> = Severity::ALL
        .iter()
        .filter(|s| res.summary.count(**s) > 0)
        .map(|s| format!("- {} {} messages", res.summary.count(*s), s))
        .collect();
    if !stats.is_empty() {
        let title = "+++ Statistics +++";
        if color {
            out.push_str(&title.bold().to_string());
        } else {
            out.push_str(title);
        }
        out.push('\n');
        out.push_str(&stats.join("\n"));
        out.push_str("\n\n");
    }

    if res.success {
        let line = "All well";
        out.push_str(&if color { line.green().bold().to_string() } else { line.to_string() });
    } else {
        let line = "There were errors below your threshold!";
        out.push_str(&if color { line.red().bold().to_string() } else { line.to_string() });
    }
    out
}

/// Compose the JSON report (pure). Issues below `verbosity` are omitted;
/// the summary always counts everything.
pub fn compose_run_json(res: &RunResult, verbosity: Severity) -> JsonVal {
    let outcomes: Vec<_> = res
        .outcomes
        .iter()
        .map(|o| {
            let issues: Vec<_> = o
                .kept
                .iter()
                .filter(|is| is.severity.at_least(verbosity))
                .collect();
            json!({
                "file": o.file,
                "resourceId": o.resource_id,
                "issues": issues,
                "defects": o.defects,
            })
        })
        .collect();
    json!({
        "outcomes": outcomes,
        "summary": res.summary,
        "failAt": res.fail_at,
        "success": res.success,
    })
}

/// Print check results in the requested format.
pub fn print_run(res: &RunResult, opts: &PrintOptions) {
    match opts.output.as_str() {
        "json" => println!(
            "{}",
            serde_json::to_string_pretty(&compose_run_json(res, opts.verbosity))
                .unwrap_or_default()
        ),
        _ => println!("{}", render_human(res, opts)),
    }
}

/// Write per-severity counts as a JSON object.
pub fn write_stats(path: &Path, summary: &Summary) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| GateError::io(path, e))?;
    serde_json::to_writer(file, summary).map_err(|e| GateError::io(path, e.into()))
}

/// Print element spans, one per line (human) or as a JSON array.
pub fn print_spans(spans: &[ElementSpan], output: &str) {
    match output {
        "json" => println!("{}", serde_json::to_string_pretty(spans).unwrap_or_default()),
        _ => {
            for s in spans {
                println!(
                    "{}:{}-{}:{}\t{}",
                    s.start.line, s.start.column, s.end.line, s.end.column, s.id
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Defect, OutcomeResult, Position};

    fn sample() -> RunResult {
        RunResult::new(
            vec![
                OutcomeResult {
                    file: "/repo/data/p1.json".into(),
                    resource_id: Some("p1".into()),
                    kept: vec![
                        Issue::new(Some(Position::new(3, 5)), Severity::Error, "Bad code", "Patient.code"),
                        Issue::new(None, Severity::Information, "Just saying", ""),
                    ],
                    defects: vec![Defect::stale("p1", "Patient.name", "Missing")],
                },
                OutcomeResult {
                    file: "/repo/data/ok.json".into(),
                    resource_id: None,
                    kept: vec![],
                    defects: vec![],
                },
            ],
            Severity::Error,
        )
    }

    fn opts(verbosity: Severity) -> PrintOptions {
        PrintOptions {
            output: "human".into(),
            verbosity,
            color: false,
            root: Some(PathBuf::from("/repo")),
        }
    }

    #[test]
    fn human_groups_by_file_and_filters_by_verbosity() {
        let out = render_human(&sample(), &opts(Severity::Warning));
        assert!(out.contains("== data/p1.json (p1)\n"));
        assert!(out.contains("  -  error at Patient.code (3, 5):\n     Bad code"));
        assert!(out.contains("fatal at Patient.name (?, ?)"));
        assert!(!out.contains("Just saying"));
        assert!(!out.contains("ok.json"));
        assert!(out.contains("- 1 fatal messages"));
        assert!(out.contains("- 1 information messages"));
        assert!(out.ends_with("There were errors below your threshold!"));
    }

    #[test]
    fn json_shape() {
        let out = compose_run_json(&sample(), Severity::Information);
        assert_eq!(out["success"], false);
        assert_eq!(out["failAt"], "error");
        assert_eq!(out["summary"]["error"], 1);
        assert_eq!(out["outcomes"][0]["issues"][0]["severity"], "error");
        assert_eq!(out["outcomes"][0]["defects"][0]["kind"], "stale_suppression");
        assert_eq!(out["outcomes"][1]["resourceId"], JsonVal::Null);
    }

    #[test]
    fn stats_file_holds_counts() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("stats.json");
        write_stats(&p, &sample().summary).unwrap();
        let v: JsonVal = serde_json::from_str(&std::fs::read_to_string(&p).unwrap()).unwrap();
        assert_eq!(v["fatal"], 1);
        assert_eq!(v["error"], 1);
        assert_eq!(v["warning"], 0);
        assert_eq!(v["information"], 1);
    }

    #[test]
    fn stats_write_failure_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("missing").join("stats.json");
        match write_stats(&p, &Summary::default()).unwrap_err() {
            GateError::Io { path, .. } => assert_eq!(path, p),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn colors_respect_output_mode() {
        assert!(!use_colors("json", true));
        assert!(!use_colors("human", false));
    }

    #[test]
    fn diagnostics_follow_resolved_settings() {
        assert!(!diagnostic_colors(None));
        assert!(!diagnostic_colors(Some(("human", false))));
        assert!(!diagnostic_colors(Some(("json", true))));
        assert!(!error_prefix(false).contains('\u{1b}'));
    }
}
