//! Issuegate CLI binary entry point.
//! Delegates to the library for checks and span listings and prints results.

use clap::Parser;
use issuegate::cli::{Cli, Commands};
use issuegate::config::{self, Overrides};
use issuegate::error::{GateError, Result};
use issuegate::output::{self, PrintOptions};
use issuegate::rules::RuleSet;
use issuegate::run::{self, RunSettings};
use issuegate::spans::{self, SpanMode};
use std::io::IsTerminal;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let mut resolved: Option<(String, bool)> = None;
    match execute(cli, &mut resolved) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            let color = std::io::stderr().is_terminal()
                && output::diagnostic_colors(resolved.as_ref().map(|(o, c)| (o.as_str(), *c)));
            eprintln!("{} {}", output::error_prefix(color), e);
            ExitCode::from(2)
        }
    }
}

/// Run one subcommand; `Ok(false)` is a failing verdict. `resolved`
/// receives the output settings once configuration is known.
fn execute(cli: Cli, resolved: &mut Option<(String, bool)>) -> Result<bool> {
    match cli.cmd {
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(true)
        }
        Commands::Check {
            report,
            repo_root,
            fail_at,
            verbosity,
            colorize,
            output,
            stats_file,
            ignored_issues,
            span_mode,
        } => {
            let eff = config::resolve_effective(&Overrides {
                repo_root,
                fail_at,
                verbosity,
                output,
                colorize: if colorize { Some(true) } else { None },
                ignored_issues,
                stats_file,
                span_mode,
            })?;
            *resolved = Some((eff.output.clone(), eff.colorize));
            let color = output::use_colors(&eff.output, eff.colorize);
            if eff.rule_sources.is_empty() && eff.output != "json" {
                eprintln!(
                    "{} No ignored-issues files configured; every issue is kept.",
                    output::note_prefix(color)
                );
            }
            let rules = RuleSet::load(&eff.rule_sources)?;
            let settings = RunSettings {
                fail_at: eff.fail_at,
                span_mode: eff.span_mode,
            };
            let res = run::run_check(Path::new(&report), &rules, &settings)?;
            output::print_run(
                &res,
                &PrintOptions {
                    output: eff.output.clone(),
                    verbosity: eff.verbosity,
                    color,
                    root: std::fs::canonicalize(&eff.repo_root).ok(),
                },
            );
            if let Some(path) = &eff.stats_file {
                output::write_stats(path, &res.summary)?;
            }
            Ok(res.success)
        }
        Commands::Spans {
            file,
            span_mode,
            output,
        } => {
            let mode = match span_mode.as_deref() {
                Some(s) => s.parse::<SpanMode>().map_err(GateError::Configuration)?,
                None => SpanMode::Any,
            };
            let found = spans::map_spans(Path::new(&file), mode)?;
            output::print_spans(&found, output.as_deref().unwrap_or("human"));
            Ok(true)
        }
    }
}
