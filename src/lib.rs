//! Helmsman: the decision core of a behavior-based vehicle helm.
//!
//! Independent behaviors each describe what they want as a weighted
//! piecewise-linear objective function over a shared decision space
//! (course, speed, depth, ...). Every cycle the helm finds the single point
//! maximizing the weighted sum of the active functions, without ever
//! materializing their combined function, and publishes it as the decision.
//!
//! # Architecture
//!
//! ## Decision core
//!
//! - `core::domain`: decision variables and their discretization
//! - `core::piece`, `core::function`, `core::grid`: piecewise-linear
//!   functions in index space and the spatial index over their pieces
//! - `core::reflector`, `core::extract`, `core::zaic`: function builders
//! - `core::solver`: branch-and-bound over aligned functions
//! - `core::encoding`: text form of functions and problem files
//!
//! ## The helm
//!
//! - `plugins::behavior_set`, `plugins::mode`: behavior life cycle and
//!   mode-conditioned activation
//! - `plugins::engine`: one decision from the running behaviors
//! - `plugins::helm`: the arbitration loop with its status machine and
//!   standby failover
//! - `registry`: behavior kinds available to configurations
//!
//! # Examples
//!
//! ```bash
//! # Solve a problem file
//! helmsman solve problem.txt
//!
//! # Compare pruned and exhaustive search on many problems
//! helmsman verify problems/*.txt
//!
//! # Validate a helm configuration
//! helmsman check helm.toml
//!
//! # Drive the helm from a scripted bus
//! helmsman run helm.toml --cycles 40 --script mission.txt
//! ```

pub mod core;
pub mod plugins;
pub mod registry;

mod cli;

use crate::cli::{Cli, Command};
use crate::core::config::HelmConfig;
use crate::core::encoding::parse_problem;
use crate::core::error::HelmError;
use crate::core::output::{format_value, warning_digest};
use crate::core::time::{Clock, ManualClock, report_envelope};
use crate::plugins::bus::BusMessage;
use crate::plugins::helm::{Helm, HelmStatus};
use crate::registry::BehaviorRegistry;
use clap::Parser;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub fn run() -> Result<(), HelmError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Solve {
            file,
            full_tree,
            thresh,
            format,
        } => run_solve(&file, full_tree, thresh, &format),
        Command::Verify { files, epsilon } => run_verify(&files, epsilon),
        Command::Check { config, format } => run_check(&config, &format),
        Command::Run {
            config,
            cycles,
            script,
            step,
        } => run_sim(&config, cycles, script.as_deref(), step),
    }
}

fn run_solve(file: &Path, full_tree: bool, thresh: f64, format: &str) -> Result<(), HelmError> {
    use colored::Colorize;

    let text = fs::read_to_string(file)?;
    let mut problem = parse_problem(&text)?;
    problem.set_thresh(thresh)?;
    problem.set_full_tree(full_tree);
    let solution = problem.solve()?;
    let decision: BTreeMap<String, f64> = solution.values(problem.domain()).into_iter().collect();

    if format == "json" {
        let envelope = report_envelope(
            "solve",
            "ok",
            serde_json::json!({
                "file": file.display().to_string(),
                "decision": decision,
                "value": solution.value,
                "functions": problem.function_count(),
                "stats": problem.stats(),
            }),
        );
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        return Ok(());
    }

    println!("{} {}", "✓".bright_green(), file.display().to_string().bright_white());
    for (name, value) in &decision {
        println!("  {} = {}", name.bright_cyan(), format_value(*value));
    }
    let stats = problem.stats();
    println!(
        "  value {}  nodes {}  leaves {}  prunes {}",
        format_value(solution.value),
        stats.nodes_expanded,
        stats.leaves_visited,
        stats.bound_prunes
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct VerifyResult {
    file: String,
    pruned: Option<f64>,
    full: Option<f64>,
    agree: bool,
    error: Option<String>,
}

fn verify_one(file: &Path, epsilon: f64) -> VerifyResult {
    let solve = |full_tree: bool| -> Result<f64, HelmError> {
        let text = fs::read_to_string(file)?;
        let mut problem = parse_problem(&text)?;
        problem.set_full_tree(full_tree);
        Ok(problem.solve()?.value)
    };
    let file_name = file.display().to_string();
    match (solve(false), solve(true)) {
        (Ok(pruned), Ok(full)) => VerifyResult {
            file: file_name,
            pruned: Some(pruned),
            full: Some(full),
            agree: (pruned - full).abs() <= epsilon,
            error: None,
        },
        (Err(e), _) | (_, Err(e)) => VerifyResult {
            file: file_name,
            pruned: None,
            full: None,
            agree: false,
            error: Some(e.to_string()),
        },
    }
}

fn run_verify(files: &[PathBuf], epsilon: f64) -> Result<(), HelmError> {
    let results: Vec<VerifyResult> = files.par_iter().map(|f| verify_one(f, epsilon)).collect();
    let failed = results.iter().filter(|r| !r.agree).count();
    let status = if failed == 0 { "ok" } else { "failed" };
    let envelope = report_envelope(
        "verify",
        status,
        serde_json::json!({ "checked": results.len(), "failed": failed, "results": results }),
    );
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    if failed > 0 {
        return Err(HelmError::ValidationError(format!(
            "{} of {} problems disagree between pruned and full search",
            failed,
            results.len()
        )));
    }
    Ok(())
}

fn run_check(path: &Path, format: &str) -> Result<(), HelmError> {
    use colored::Colorize;

    let config = HelmConfig::load(path)?;
    let helm = Helm::new(config, BehaviorRegistry::builtin(), Box::new(ManualClock::new(0.0)));
    let warnings = helm.config_warnings().to_vec();
    let behaviors = helm.behavior_set().map(|s| s.names()).unwrap_or_default();
    let templates = helm.behavior_set().map(|s| s.template_names()).unwrap_or_default();

    if format == "json" {
        let status = if warnings.is_empty() { "ok" } else { "malconfig" };
        let envelope = report_envelope(
            "check",
            status,
            serde_json::json!({
                "config": path.display().to_string(),
                "domain": helm.domain().to_string(),
                "behaviors": behaviors,
                "templates": templates,
                "warnings": warnings,
            }),
        );
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else if warnings.is_empty() {
        println!("{} {}", "✓".bright_green(), path.display());
        println!("  domain    {}", helm.domain().to_string().bright_cyan());
        println!("  behaviors {}", behaviors.join(", "));
        if !templates.is_empty() {
            println!("  templates {}", templates.join(", "));
        }
    } else {
        println!("{} {} {}", "✗".bright_red(), path.display(), HelmStatus::Malconfig.as_str().red());
        for w in &warnings {
            println!("  {}", w);
        }
    }

    if warnings.is_empty() {
        Ok(())
    } else {
        Err(HelmError::ConfigError(warning_digest(&warnings, 3, 160)))
    }
}

/// `<cycle>: KEY=value` lines, grouped by cycle.
fn parse_script(text: &str) -> Result<BTreeMap<u64, Vec<String>>, HelmError> {
    let mut script: BTreeMap<u64, Vec<String>> = BTreeMap::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.split("//").next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let (cycle, msg) = line.split_once(':').ok_or_else(|| {
            HelmError::ConfigError(format!("script line {}: expected '<cycle>: KEY=value'", lineno + 1))
        })?;
        let cycle: u64 = cycle.trim().parse().map_err(|_| {
            HelmError::ConfigError(format!("script line {}: bad cycle '{}'", lineno + 1, cycle.trim()))
        })?;
        script.entry(cycle).or_default().push(msg.trim().to_string());
    }
    Ok(script)
}

fn run_sim(path: &Path, cycles: u64, script: Option<&Path>, step: f64) -> Result<(), HelmError> {
    let config = HelmConfig::load(path)?;
    let script = match script {
        Some(p) => parse_script(&fs::read_to_string(p)?)?,
        None => BTreeMap::new(),
    };
    let clock = ManualClock::new(0.0);
    let mut helm = Helm::new(config, BehaviorRegistry::builtin(), Box::new(clock.clone()));

    for cycle in 1..=cycles {
        clock.advance(step);
        for line in script.get(&cycle).into_iter().flatten() {
            match BusMessage::parse_line(line, "script", clock.now()) {
                Some(msg) => helm.deliver(msg),
                None => tracing::warn!(cycle, line = %line, "ignoring malformed script line"),
            }
        }
        let output = helm.iterate();
        for publication in &output.publications {
            let line = serde_json::json!({
                "cycle": cycle,
                "key": publication.key,
                "value": publication.value,
            });
            println!("{}", serde_json::to_string(&line)?);
        }
    }

    let envelope = report_envelope(
        "run",
        "ok",
        serde_json::json!({
            "cycles": cycles,
            "status": helm.status().as_str(),
            "has_control": helm.has_control(),
        }),
    );
    println!("{}", serde_json::to_string(&envelope)?);
    Ok(())
}
