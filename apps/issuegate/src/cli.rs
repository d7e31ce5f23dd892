//! CLI argument parsing via `clap`.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "issuegate",
    version,
    about = "Reconcile FHIR validator reports with declared suppressions",
    long_about = "Issuegate reads a validator report (OperationOutcome XML/JSON), drops the issues declared in ignored-issues YAML files, reports unjustified or stale suppressions, and decides whether the run passes.\n\nConfiguration precedence: CLI > issuegate.toml > defaults.",
    after_help = "Examples:\n  issuegate check validation.xml --ignored-issues 'ignored/*.yaml'\n  issuegate check report.json --fail-at warning --output json\n  issuegate spans resources/Patient-p1.xml",
    arg_required_else_help = true
)]
/// Top-level CLI options and subcommands.
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show version
    #[command(about = "Show version", long_about = "Print the current issuegate version.")]
    Version,
    /// Check a validator report against suppression rules
    #[command(
        about = "Check a validator report",
        long_about = "Filter the issues of every outcome in the report through the suppression rules. The run fails when an issue at or above the fail level remains, or when a suppression is unjustified or stale.",
        after_help = "Examples:\n  issuegate check validation.xml -a warning -v information\n  issuegate check validation.xml --ignored-issues a.yaml --ignored-issues b.yaml --stats-file stats.json"
    )]
    Check {
        #[arg(help = "Validator report (XML or JSON)")]
        report: String,
        #[arg(long, help = "Repository root (default: current dir)")]
        repo_root: Option<String>,
        #[arg(short = 'a', long, help = "Lowest severity that fails the run: fatal|error|warning|information (default: error)")]
        fail_at: Option<String>,
        #[arg(short = 'v', long = "verbosity-level", help = "Lowest severity printed (default: information)")]
        verbosity: Option<String>,
        #[arg(short = 'c', long, action = clap::ArgAction::SetTrue, help = "Colorize human output")]
        colorize: bool,
        #[arg(long, help = "Output mode: human|json (default: human)")]
        output: Option<String>,
        #[arg(long, help = "Write per-severity counts as JSON to this file")]
        stats_file: Option<String>,
        #[arg(long, action = clap::ArgAction::Append, help = "Ignored-issues YAML file or glob (repeatable)")]
        ignored_issues: Vec<String>,
        #[arg(long, help = "Identified elements to map: any|element-only (default: any)")]
        span_mode: Option<String>,
    },
    /// Print the element spans of a resource file
    #[command(
        about = "List element spans",
        long_about = "Map every identified element of an XML or JSON resource to its inclusive line/column extent.",
        after_help = "Examples:\n  issuegate spans Patient-p1.xml\n  issuegate spans StructureDefinition-x.xml --span-mode element-only --output json"
    )]
    Spans {
        #[arg(help = "Resource file (.xml or .json)")]
        file: String,
        #[arg(long, help = "Identified elements to map: any|element-only (default: any)")]
        span_mode: Option<String>,
        #[arg(long, help = "Output mode: human|json (default: human)")]
        output: Option<String>,
    },
}
