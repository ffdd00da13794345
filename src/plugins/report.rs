//! Per-cycle helm report and the typed all-stop reasons.

use crate::core::output::{format_value, name_list};
use crate::core::info::InfoValue;
use crate::core::solver::SolveStats;
use crate::plugins::behavior_set::LifeEvent;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllStopReason {
    NothingToDo,
    MissingDecVars(Vec<String>),
    NoActiveGoalBehavior,
    BehaviorError,
    ManualOverride,
    DisabledByStandbyHelm,
}

impl AllStopReason {
    /// Reasons raised by the decision itself, as opposed to control loss.
    pub fn is_decision_failure(&self) -> bool {
        !matches!(self, AllStopReason::ManualOverride | AllStopReason::DisabledByStandbyHelm)
    }
}

impl fmt::Display for AllStopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllStopReason::NothingToDo => write!(f, "NothingToDo"),
            AllStopReason::MissingDecVars(vars) => write!(f, "MissingDecVars:{}", vars.join(",")),
            AllStopReason::NoActiveGoalBehavior => write!(f, "NoActiveGoalBehavior"),
            AllStopReason::BehaviorError => write!(f, "BehaviorError"),
            AllStopReason::ManualOverride => write!(f, "ManualOverride"),
            AllStopReason::DisabledByStandbyHelm => write!(f, "DisabledByStandbyHelm"),
        }
    }
}

impl Serialize for AllStopReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HelmReport {
    pub iteration: u64,
    pub time: f64,
    pub mode: String,
    pub decisions: BTreeMap<String, f64>,
    pub all_stop: Option<AllStopReason>,
    pub active: Vec<String>,
    pub running: Vec<String>,
    pub idle: Vec<String>,
    pub completed: Vec<String>,
    /// Functions handed to the solver.
    pub ofnum: usize,
    pub pieces: usize,
    pub create_secs: f64,
    pub solve_secs: f64,
    pub solution_value: Option<f64>,
    pub stats: SolveStats,
    pub life_events: Vec<LifeEvent>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    #[serde(skip)]
    pub posts: Vec<(String, InfoValue)>,
}

impl HelmReport {
    pub fn is_complete(&self) -> bool {
        self.all_stop.is_none()
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        let decisions = self
            .decisions
            .iter()
            .map(|(k, v)| format!("{}={}", k, format_value(*v)))
            .collect::<Vec<_>>()
            .join(":");
        vec![
            ("mode", self.mode.clone()),
            ("decision", decisions),
            (
                "allstop",
                self.all_stop
                    .as_ref()
                    .map_or_else(|| "clear".to_string(), ToString::to_string),
            ),
            ("active", name_list(&self.active)),
            ("running", name_list(&self.running)),
            ("idle", name_list(&self.idle)),
            ("ofnum", self.ofnum.to_string()),
            ("pieces", self.pieces.to_string()),
        ]
    }

    /// `iter=..,utc=..,` followed by every field.
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("iter={}", self.iteration),
            format!("utc={}", format_value(self.time)),
        ];
        parts.extend(self.fields().into_iter().map(|(k, v)| format!("{}={}", k, v)));
        parts.join(",")
    }

    /// Like `summary`, but only fields that differ from `prev`.
    pub fn summary_delta(&self, prev: &HelmReport) -> String {
        let before = prev.fields();
        let mut parts = vec![
            format!("iter={}", self.iteration),
            format!("utc={}", format_value(self.time)),
        ];
        for ((key, now), (_, then)) in self.fields().into_iter().zip(before) {
            if now != then {
                parts.push(format!("{}={}", key, now));
            }
        }
        parts.join(",")
    }
}
