//! Configuration discovery and effective settings resolution.
//!
//! Issuegate reads `issuegate.toml|yaml|yml` from the repository root (or
//! closest ancestor) and merges it with CLI flags to produce an `Effective`
//! config. Defaults:
//! - `fail_at`: `error`
//! - `verbosity`: `information`
//! - `output`: `human`
//! - `colorize`: false
//! - `ignored_issues`: none
//! - `span_mode`: `any`
//!
//! Overrides precedence: CLI > config file > defaults. Ignored-issues
//! sources from both places are combined.

use crate::error::{GateError, Result};
use crate::models::Severity;
use crate::spans::SpanMode;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_NAMES: [&str; 3] = ["issuegate.toml", "issuegate.yaml", "issuegate.yml"];

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
/// Root configuration loaded from `issuegate.toml|yaml`.
pub struct GateConfig {
    pub fail_at: Option<String>,
    pub verbosity: Option<String>,
    pub output: Option<String>,
    pub colorize: Option<bool>,
    /// Paths or glob patterns, relative to the repository root.
    #[serde(default)]
    pub ignored_issues: Vec<String>,
    pub stats_file: Option<String>,
    pub span_mode: Option<String>,
}

#[derive(Debug, Default, Clone)]
/// Values supplied on the command line; `None` defers to config/defaults.
pub struct Overrides {
    pub repo_root: Option<String>,
    pub fail_at: Option<String>,
    pub verbosity: Option<String>,
    pub output: Option<String>,
    pub colorize: Option<bool>,
    /// Taken relative to the working directory.
    pub ignored_issues: Vec<String>,
    pub stats_file: Option<String>,
    pub span_mode: Option<String>,
}

#[derive(Debug, Clone)]
/// Fully-resolved configuration used by commands after applying precedence.
pub struct Effective {
    pub repo_root: PathBuf,
    pub config_file: Option<PathBuf>,
    pub fail_at: Severity,
    pub verbosity: Severity,
    pub output: String,
    pub colorize: bool,
    pub rule_sources: Vec<PathBuf>,
    pub stats_file: Option<PathBuf>,
    pub span_mode: SpanMode,
}

/// Walk upward from `start` to detect the repository root.
///
/// Stops when an `issuegate.toml|yaml|yml` or a `.git` directory is found.
pub fn detect_repo_root(start: &Path) -> PathBuf {
    let mut cur = start;
    loop {
        if CONFIG_NAMES.iter().any(|n| cur.join(n).exists()) || cur.join(".git").exists() {
            return cur.to_path_buf();
        }
        match cur.parent() {
            Some(p) => cur = p,
            None => return start.to_path_buf(),
        }
    }
}

pub fn find_config_file(root: &Path) -> Option<PathBuf> {
    CONFIG_NAMES
        .iter()
        .map(|n| root.join(n))
        .find(|p| p.is_file())
}

/// Load `GateConfig` from the first config file present in `root`.
pub fn load_config(root: &Path) -> Result<Option<(PathBuf, GateConfig)>> {
    let Some(path) = find_config_file(root) else {
        return Ok(None);
    };
    let s = fs::read_to_string(&path).map_err(|e| {
        GateError::Configuration(format!("cannot read {}: {}", path.display(), e))
    })?;
    let is_toml = path.extension().is_some_and(|e| e == "toml");
    let cfg: GateConfig = if is_toml {
        toml::from_str(&s).map_err(|e| GateError::Configuration(format!("{}: {}", path.display(), e)))?
    } else {
        serde_yaml::from_str(&s)
            .map_err(|e| GateError::Configuration(format!("{}: {}", path.display(), e)))?
    };
    Ok(Some((path, cfg)))
}

fn parse_severity(value: &str, what: &str) -> Result<Severity> {
    value.parse().map_err(|_| {
        GateError::Configuration(format!(
            "invalid {} '{}' (expected fatal|error|warning|information)",
            what, value
        ))
    })
}

/// Reject a verbosity threshold that would hide issues failing the run.
pub fn check_thresholds(fail_at: Severity, verbosity: Severity) -> Result<()> {
    if verbosity > fail_at {
        return Err(GateError::Configuration(format!(
            "verbosity level '{}' would silence issues at fail level '{}'",
            verbosity, fail_at
        )));
    }
    Ok(())
}

fn has_glob_meta(s: &str) -> bool {
    s.contains(|c: char| matches!(c, '*' | '?' | '['))
}

/// Expand rule source patterns relative to `base`. A glob that matches no
/// file is an error; plain paths are left for the loader to read.
fn expand_sources(base: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for pat in patterns {
        let full = base.join(pat);
        if !has_glob_meta(pat) {
            out.push(full);
            continue;
        }
        let pattern = full.to_string_lossy().to_string();
        let mut matched: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| GateError::Configuration(format!("bad glob pattern '{}': {}", pat, e)))?
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
            .collect();
        if matched.is_empty() {
            return Err(GateError::Configuration(format!(
                "ignored issues pattern '{}' matched no files",
                pat
            )));
        }
        matched.sort();
        out.extend(matched);
    }
    Ok(out)
}

/// Resolve `Effective` by merging CLI flags, discovered config, and defaults.
pub fn resolve_effective(cli: &Overrides) -> Result<Effective> {
    let start = PathBuf::from(cli.repo_root.as_deref().unwrap_or("."));
    let repo_root = detect_repo_root(&start);
    let (config_file, cfg) = match load_config(&repo_root)? {
        Some((p, c)) => (Some(p), c),
        None => (None, GateConfig::default()),
    };

    let fail_at = parse_severity(
        cli.fail_at.as_deref().or(cfg.fail_at.as_deref()).unwrap_or("error"),
        "fail level",
    )?;
    let verbosity = parse_severity(
        cli.verbosity
            .as_deref()
            .or(cfg.verbosity.as_deref())
            .unwrap_or("information"),
        "verbosity level",
    )?;
    check_thresholds(fail_at, verbosity)?;

    let output = cli
        .output
        .clone()
        .or(cfg.output)
        .unwrap_or_else(|| "human".to_string());
    if output != "human" && output != "json" {
        return Err(GateError::Configuration(format!(
            "invalid output mode '{}' (expected human|json)",
            output
        )));
    }

    let colorize = cli.colorize.or(cfg.colorize).unwrap_or(false);

    let span_mode = match cli.span_mode.as_deref().or(cfg.span_mode.as_deref()) {
        Some(s) => s.parse::<SpanMode>().map_err(GateError::Configuration)?,
        None => SpanMode::Any,
    };

    let mut rule_sources = expand_sources(&repo_root, &cfg.ignored_issues)?;
    rule_sources.extend(expand_sources(Path::new(""), &cli.ignored_issues)?);

    let stats_file = cli
        .stats_file
        .as_ref()
        .map(PathBuf::from)
        .or_else(|| cfg.stats_file.map(|s| repo_root.join(s)));

    Ok(Effective {
        repo_root,
        config_file,
        fail_at,
        verbosity,
        output,
        colorize,
        rule_sources,
        stats_file,
        span_mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn at(root: &Path) -> Overrides {
        Overrides {
            repo_root: root.to_str().map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_without_config() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        let eff = resolve_effective(&at(dir.path())).unwrap();
        assert_eq!(eff.fail_at, Severity::Error);
        assert_eq!(eff.verbosity, Severity::Information);
        assert_eq!(eff.output, "human");
        assert!(!eff.colorize);
        assert!(eff.rule_sources.is_empty());
        assert!(eff.config_file.is_none());
        assert_eq!(eff.span_mode, SpanMode::Any);
    }

    #[test]
    fn detect_and_load_toml_with_globbed_sources() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("ignored")).unwrap();
        fs::write(root.join("ignored/b.yaml"), "").unwrap();
        fs::write(root.join("ignored/a.yaml"), "").unwrap();
        let mut f = fs::File::create(root.join("issuegate.toml")).unwrap();
        writeln!(
            f,
            "{}",
            r#"
fail_at = "warning"
verbosity = "information"
output = "json"
ignored_issues = ["ignored/*.yaml"]
span_mode = "element-only"
stats_file = "stats.json"
    "#
        )
        .unwrap();

        let eff = resolve_effective(&at(root)).unwrap();
        assert_eq!(eff.fail_at, Severity::Warning);
        assert_eq!(eff.output, "json");
        assert_eq!(eff.span_mode, SpanMode::ElementOnly);
        assert_eq!(
            eff.rule_sources,
            vec![root.join("ignored/a.yaml"), root.join("ignored/b.yaml")]
        );
        assert_eq!(eff.stats_file, Some(root.join("stats.json")));
    }

    #[test]
    fn cli_takes_precedence_over_yaml() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("issuegate.yaml"),
            "fail_at: warning\ncolorize: true\n",
        )
        .unwrap();
        let cli = Overrides {
            fail_at: Some("fatal".into()),
            verbosity: Some("error".into()),
            colorize: Some(false),
            ..at(root)
        };
        let eff = resolve_effective(&cli).unwrap();
        assert_eq!(eff.fail_at, Severity::Fatal);
        assert_eq!(eff.verbosity, Severity::Error);
        assert!(!eff.colorize);
    }

    #[test]
    fn verbosity_must_not_hide_failing_issues() {
        assert!(check_thresholds(Severity::Error, Severity::Information).is_ok());
        assert!(check_thresholds(Severity::Error, Severity::Error).is_ok());
        assert!(check_thresholds(Severity::Warning, Severity::Error).is_err());
        assert!(check_thresholds(Severity::Information, Severity::Fatal).is_err());
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join(".git")).unwrap();
        for cli in [
            Overrides {
                fail_at: Some("loud".into()),
                ..at(root)
            },
            Overrides {
                output: Some("xml".into()),
                ..at(root)
            },
            Overrides {
                span_mode: Some("all".into()),
                ..at(root)
            },
            Overrides {
                ignored_issues: vec![root.join("none/*.yaml").to_string_lossy().to_string()],
                ..at(root)
            },
        ] {
            assert!(matches!(
                resolve_effective(&cli),
                Err(GateError::Configuration(_))
            ));
        }
    }

    #[test]
    fn malformed_config_file_is_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("issuegate.toml"), "fail_at = [").unwrap();
        assert!(matches!(
            resolve_effective(&at(dir.path())),
            Err(GateError::Configuration(_))
        ));
    }
}
