//! One decision: collect contributions, solve, classify the outcome.
//!
//! Contributions are expanded onto the union of the variables they cover
//! (in helm domain order) and handed to the solver. A contribution that
//! cannot be aligned is dropped with a warning. A decision is complete when
//! every non-optional variable of the helm domain received a value.

use crate::core::domain::DecisionDomain;
use crate::core::error::HelmError;
use crate::core::info::InfoBuffer;
use crate::core::solver::Problem;
use crate::plugins::behavior_set::BehaviorSet;
use crate::plugins::report::{AllStopReason, HelmReport};
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct HelmEngine {
    thresh: f64,
    goals_mandatory: bool,
}

impl HelmEngine {
    pub fn new(thresh: f64) -> Self {
        HelmEngine {
            thresh,
            goals_mandatory: false,
        }
    }

    pub fn with_goals_mandatory(mut self, mandatory: bool) -> Self {
        self.goals_mandatory = mandatory;
        self
    }

    pub fn determine_next_decision(
        &self,
        set: &mut BehaviorSet,
        info: &InfoBuffer,
        iteration: u64,
        time: f64,
    ) -> HelmReport {
        let create_start = Instant::now();
        let collection = set.update(info, iteration, time);
        let domain = set.domain().clone();

        let mut report = HelmReport {
            iteration,
            time,
            mode: collection.mode,
            running: collection.running,
            idle: collection.idle,
            completed: collection.completed,
            active: collection.active,
            life_events: collection.life_events,
            warnings: collection.warnings,
            errors: collection.errors,
            posts: collection.posts,
            ..HelmReport::default()
        };
        let had_errors = !report.errors.is_empty();

        if collection.contributions.is_empty() {
            report.create_secs = create_start.elapsed().as_secs_f64();
            report.all_stop = Some(escalate(AllStopReason::NothingToDo, had_errors));
            return report;
        }
        if self.goals_mandatory && !collection.contributions.iter().any(|c| c.goal) {
            report.create_secs = create_start.elapsed().as_secs_f64();
            report.all_stop = Some(escalate(AllStopReason::NoActiveGoalBehavior, had_errors));
            return report;
        }

        let joint = match joint_domain(&domain, collection.contributions.iter().map(|c| c.function.domain())) {
            Ok(joint) => joint,
            Err(e) => {
                report.warnings.push(e.to_string());
                report.all_stop = Some(escalate(AllStopReason::NothingToDo, had_errors));
                return report;
            }
        };

        let mut problem = Problem::new(joint.clone());
        if let Err(e) = problem.set_thresh(self.thresh) {
            report.warnings.push(e.to_string());
        }
        for contribution in collection.contributions {
            match contribution.function.expand_to(&joint) {
                Ok(expanded) => {
                    report.pieces += expanded.size();
                    if problem.add_function(expanded) {
                        report.ofnum += 1;
                    }
                }
                Err(e) => {
                    warn!(behavior = %contribution.behavior, error = %e, "contribution dropped");
                    report
                        .warnings
                        .push(format!("{}: {}", contribution.behavior, e));
                    report.active.retain(|a| a != &contribution.behavior);
                }
            }
        }
        report.create_secs = create_start.elapsed().as_secs_f64();

        let solve_start = Instant::now();
        let solved = problem.solve();
        report.solve_secs = solve_start.elapsed().as_secs_f64();
        report.stats = problem.stats();

        match solved {
            Ok(solution) => {
                report.solution_value = Some(solution.value);
                report.decisions = solution.values(&joint).into_iter().collect();
            }
            Err(HelmError::NothingToDecide) => {}
            Err(e) => report.warnings.push(e.to_string()),
        }
        debug!(
            iteration,
            ofnum = report.ofnum,
            pieces = report.pieces,
            solve_secs = report.solve_secs,
            "decision solved"
        );

        report.all_stop = classify(&domain, &report);
        if let Some(reason) = report.all_stop.take() {
            report.all_stop = Some(escalate(reason, had_errors));
        }
        report
    }
}

/// The helm-domain variables any of `domains` mention, in helm order.
fn joint_domain<'a>(
    domain: &DecisionDomain,
    domains: impl Iterator<Item = &'a DecisionDomain>,
) -> Result<DecisionDomain, HelmError> {
    let mut covered = vec![false; domain.len()];
    for d in domains {
        for name in d.names() {
            if let Some(ix) = domain.index_of(name) {
                covered[ix] = true;
            }
        }
    }
    let names: Vec<&str> = domain
        .names()
        .zip(&covered)
        .filter(|(_, c)| **c)
        .map(|(n, _)| n)
        .collect();
    if names.is_empty() {
        return Err(HelmError::DomainMismatch(
            "no contribution covers a helm decision variable".to_string(),
        ));
    }
    domain.subdomain(&names)
}

fn classify(domain: &DecisionDomain, report: &HelmReport) -> Option<AllStopReason> {
    if report.ofnum == 0 || report.solution_value.is_none() {
        return Some(AllStopReason::NothingToDo);
    }
    let missing: Vec<String> = domain
        .vars()
        .iter()
        .filter(|v| !v.is_optional() && !report.decisions.contains_key(v.name()))
        .map(|v| v.name().to_string())
        .collect();
    (!missing.is_empty()).then_some(AllStopReason::MissingDecVars(missing))
}

/// A failed behavior takes precedence over any other decision failure.
fn escalate(reason: AllStopReason, had_errors: bool) -> AllStopReason {
    if had_errors && reason.is_decision_failure() {
        AllStopReason::BehaviorError
    } else {
        reason
    }
}
