//! The set of configured behaviors and their life cycle.
//!
//! Every behavior moves `spawning -> running -> {idle, completing}`, with
//! `idle <-> running` as its mode and conditions come and go. Completing
//! behaviors are removed by the helm after the cycle that completed them.
//! Each transition is recorded as a `LifeEvent`.
//!
//! A behavior that fails is isolated: its contribution for the cycle is
//! dropped and one error is recorded. The rest of the set is unaffected.

use crate::core::config::{BehaviorDecl, ModeDecl};
use crate::core::domain::DecisionDomain;
use crate::core::error::HelmError;
use crate::core::function::ObjectiveFunction;
use crate::core::info::{CycleContext, InfoBuffer, InfoValue};
use crate::core::output::format_value;
use crate::plugins::behavior::{Behavior, BehaviorSpec};
use crate::plugins::condition::all_hold;
use crate::plugins::mode::{ModeSet, mode_matches};
use crate::registry::BehaviorRegistry;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifeState {
    Spawning,
    Running,
    Idle,
    Completing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifeEvent {
    pub time: f64,
    pub iteration: u64,
    pub behavior: String,
    pub kind: String,
    /// `spawn`, `run`, `idle` or `complete`.
    pub event: String,
    pub spawn_params: String,
    pub posting_index: u64,
}

impl LifeEvent {
    /// As published in `IVPHELM_LIFE_EVENT`.
    pub fn to_posting(&self) -> String {
        format!(
            "time={},iter={},bname={},btype={},event={},seed={},posting_index={}",
            format_value(self.time),
            self.iteration,
            self.behavior,
            self.kind,
            self.event,
            self.spawn_params,
            self.posting_index
        )
    }
}

#[derive(Debug)]
pub struct Contribution {
    pub behavior: String,
    pub function: ObjectiveFunction,
    pub goal: bool,
}

/// Everything one `update` produced.
#[derive(Debug, Default)]
pub struct CycleCollection {
    pub contributions: Vec<Contribution>,
    pub running: Vec<String>,
    pub idle: Vec<String>,
    pub completed: Vec<String>,
    /// Behaviors that contributed a function this cycle.
    pub active: Vec<String>,
    pub life_events: Vec<LifeEvent>,
    pub warnings: Vec<String>,
    /// One entry per failed behavior.
    pub errors: Vec<String>,
    /// Flags and behavior posts, in the order they were produced.
    pub posts: Vec<(String, InfoValue)>,
    pub mode: String,
}

struct Slot {
    spec: BehaviorSpec,
    behavior: Box<dyn Behavior>,
    state: LifeState,
    run_time: f64,
    last_run: Option<f64>,
}

pub struct BehaviorSet {
    domain: DecisionDomain,
    registry: BehaviorRegistry,
    modes: ModeSet,
    slots: Vec<Slot>,
    templates: Vec<BehaviorDecl>,
    mode: String,
    posting_index: u64,
}

impl BehaviorSet {
    pub fn new(domain: DecisionDomain) -> Self {
        BehaviorSet {
            domain,
            registry: BehaviorRegistry::builtin(),
            modes: ModeSet::default(),
            slots: Vec::new(),
            templates: Vec::new(),
            mode: String::new(),
            posting_index: 0,
        }
    }

    /// Build the set from declarations. Every problem found is gathered
    /// into one configuration error.
    pub fn build(
        decls: &[BehaviorDecl],
        modes: &[ModeDecl],
        registry: &BehaviorRegistry,
        domain: &DecisionDomain,
    ) -> Result<BehaviorSet, HelmError> {
        let mut set = BehaviorSet::new(domain.clone());
        set.registry = registry.clone();
        let mut problems = Vec::new();

        match ModeSet::from_decls(modes) {
            Ok(m) => set.modes = m,
            Err(e) => problems.push(e.to_string()),
        }

        for decl in decls {
            if decl.name.trim().is_empty() {
                problems.push(format!("behavior of kind '{}' has no name", decl.kind));
                continue;
            }
            if set.has_name(&decl.name) || set.templates.iter().any(|t| t.name == decl.name) {
                problems.push(format!("duplicate behavior name '{}'", decl.name));
                continue;
            }
            if decl.is_template() {
                if decl.updates.as_deref().is_none_or(str::is_empty) {
                    problems.push(format!("template '{}' needs an updates variable", decl.name));
                } else if let Err(e) = registry.create(&decl.kind) {
                    problems.push(e.to_string());
                } else {
                    set.templates.push(decl.clone());
                }
                continue;
            }
            match set.instantiate(decl, &decl.name, &[], String::new()) {
                Ok(slot) => set.slots.push(slot),
                Err(e) => problems.push(format!("behavior '{}': {}", decl.name, e)),
            }
        }

        if !problems.is_empty() {
            return Err(HelmError::ConfigError(problems.join("; ")));
        }
        debug!(
            behaviors = set.slots.len(),
            templates = set.templates.len(),
            "behavior set built"
        );
        Ok(set)
    }

    fn instantiate(
        &self,
        decl: &BehaviorDecl,
        name: &str,
        extra: &[(String, String)],
        spawn_params: String,
    ) -> Result<Slot, HelmError> {
        let mut behavior = self.registry.create(&decl.kind)?;
        for (param, value) in decl.param_strings().iter().chain(extra) {
            behavior.set_param(param, value)?;
        }
        behavior.on_configured(&self.domain)?;
        let mut spec = BehaviorSpec::from_decl(decl)?;
        spec.name = name.to_string();
        spec.spawn_params = spawn_params;
        Ok(Slot {
            spec,
            behavior,
            state: LifeState::Spawning,
            run_time: 0.0,
            last_run: None,
        })
    }

    /// Add an already-configured behavior.
    pub fn insert(&mut self, spec: BehaviorSpec, mut behavior: Box<dyn Behavior>) -> Result<(), HelmError> {
        if self.has_name(&spec.name) {
            return Err(HelmError::ConfigError(format!("duplicate behavior name '{}'", spec.name)));
        }
        behavior.on_configured(&self.domain)?;
        self.slots.push(Slot {
            spec,
            behavior,
            state: LifeState::Spawning,
            run_time: 0.0,
            last_run: None,
        });
        Ok(())
    }

    pub fn set_modes(&mut self, modes: ModeSet) {
        self.modes = modes;
    }

    pub fn modes(&self) -> &ModeSet {
        &self.modes
    }

    /// Recompute the mode string from the buffer.
    pub fn evaluate_mode(&mut self, info: &InfoBuffer) -> &str {
        self.mode = self.modes.evaluate(info);
        &self.mode
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn domain(&self) -> &DecisionDomain {
        &self.domain
    }

    /// Apply `updates` messages written since the buffer's deltas were last
    /// cleared. A template's updates variable carrying `name=<instance>#...`
    /// spawns that instance, or updates it if it already exists. Returns
    /// warnings for messages that could not be applied.
    pub fn process_updates(&mut self, info: &InfoBuffer) -> Vec<String> {
        let mut warnings = Vec::new();
        for key in info.deltas() {
            let Some(raw) = info.value(key).map(InfoValue::to_string) else {
                continue;
            };
            let pairs = parse_update(&raw);

            let template = self
                .templates
                .iter()
                .find(|t| t.updates.as_deref() == Some(key.as_str()))
                .cloned();
            if let Some(template) = template {
                let Some(name) = pairs.iter().find(|(k, _)| k == "name").map(|(_, v)| v.clone()) else {
                    warnings.push(format!("{}: spawn request without name=", key));
                    continue;
                };
                let params: Vec<(String, String)> = pairs.into_iter().filter(|(k, _)| k != "name").collect();
                if self.has_name(&name) {
                    warnings.extend(self.apply_params(&name, &params));
                    continue;
                }
                match self.instantiate(&template, &name, &params, raw.clone()) {
                    Ok(slot) => {
                        debug!(behavior = %name, template = %template.name, "spawned behavior");
                        self.slots.push(slot);
                    }
                    Err(e) => warnings.push(format!("spawn of '{}' from '{}' failed: {}", name, template.name, e)),
                }
                continue;
            }

            let targets: Vec<String> = self
                .slots
                .iter()
                .filter(|s| s.spec.updates.as_deref() == Some(key.as_str()))
                .map(|s| s.spec.name.clone())
                .collect();
            for name in targets {
                let params: Vec<(String, String)> = pairs.iter().filter(|(k, _)| k != "name").cloned().collect();
                warnings.extend(self.apply_params(&name, &params));
            }
        }
        warnings
    }

    fn apply_params(&mut self, name: &str, params: &[(String, String)]) -> Vec<String> {
        let mut warnings = Vec::new();
        let Some(slot) = self.slots.iter_mut().find(|s| s.spec.name == name) else {
            return warnings;
        };
        for (param, value) in params {
            let result = match param.as_str() {
                "priority" => value
                    .parse::<f64>()
                    .map(|p| slot.spec.priority = p)
                    .map_err(|_| HelmError::ConfigError(format!("bad priority '{}'", value))),
                _ => slot.behavior.set_param(param, value),
            };
            if let Err(e) = result {
                warnings.push(format!("update of '{}': {}", name, e));
            }
        }
        warnings
    }

    /// Run one cycle over every behavior.
    pub fn update(&mut self, info: &InfoBuffer, iteration: u64, time: f64) -> CycleCollection {
        let mut out = CycleCollection {
            mode: self.mode.clone(),
            ..CycleCollection::default()
        };
        let ctx = CycleContext {
            info,
            domain: &self.domain,
            iteration,
            time,
        };

        for slot in &mut self.slots {
            let mut events: Vec<&str> = Vec::new();
            if slot.state == LifeState::Spawning {
                events.push("spawn");
            }

            let in_mode = slot
                .spec
                .mode
                .as_deref()
                .is_none_or(|m| mode_matches(&self.mode, m));
            let wanted = in_mode && all_hold(&slot.spec.conditions, info);

            if wanted {
                if slot.state != LifeState::Running {
                    events.push("run");
                    out.posts.extend(slot.spec.runflag.iter().cloned());
                    slot.state = LifeState::Running;
                }
                if let Some(last) = slot.last_run {
                    slot.run_time += (time - last).max(0.0);
                }
                slot.last_run = Some(time);
                out.running.push(slot.spec.name.clone());

                let mut complete = slot.spec.duration.is_some_and(|d| slot.run_time >= d);
                match slot.behavior.on_run(&ctx) {
                    Ok(result) => {
                        out.posts.extend(result.posts);
                        complete |= result.complete;
                        if let Some(mut function) = result.function {
                            let priority = result.priority.unwrap_or(slot.spec.priority);
                            if priority > 0.0 {
                                function.set_priority(priority);
                                function.set_source(&slot.spec.name);
                                out.active.push(slot.spec.name.clone());
                                out.contributions.push(Contribution {
                                    behavior: slot.spec.name.clone(),
                                    function,
                                    goal: slot.spec.goal,
                                });
                            }
                        }
                    }
                    Err(e) => {
                        let err = HelmError::behavior(&slot.spec.name, e.to_string());
                        warn!(behavior = %slot.spec.name, error = %e, "behavior failed, contribution dropped");
                        out.errors.push(err.to_string());
                    }
                }
                if complete {
                    events.push("complete");
                    out.posts.extend(slot.spec.endflag.iter().cloned());
                    out.completed.push(slot.spec.name.clone());
                    slot.state = LifeState::Completing;
                }
            } else {
                if slot.state != LifeState::Idle {
                    events.push("idle");
                    out.posts.extend(slot.spec.idleflag.iter().cloned());
                    slot.state = LifeState::Idle;
                }
                slot.last_run = None;
                slot.behavior.on_idle(&ctx);
                out.idle.push(slot.spec.name.clone());
            }

            for event in events {
                self.posting_index += 1;
                out.life_events.push(LifeEvent {
                    time,
                    iteration,
                    behavior: slot.spec.name.clone(),
                    kind: slot.spec.kind.clone(),
                    event: event.to_string(),
                    spawn_params: slot.spec.spawn_params.clone(),
                    posting_index: self.posting_index,
                });
            }
        }
        out
    }

    /// Drop behaviors that completed. Returns their names.
    pub fn remove_completed(&mut self) -> Vec<String> {
        let mut removed = Vec::new();
        self.slots.retain(|s| {
            if s.state == LifeState::Completing {
                removed.push(s.spec.name.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn state(&self, name: &str) -> Option<LifeState> {
        self.slots.iter().find(|s| s.spec.name == name).map(|s| s.state)
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.slots.iter().any(|s| s.spec.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.spec.name.clone()).collect()
    }

    pub fn template_names(&self) -> Vec<String> {
        self.templates.iter().map(|t| t.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// `name=a#k=v#k=v` into pairs; fields without `=` are skipped.
fn parse_update(raw: &str) -> Vec<(String, String)> {
    raw.split('#')
        .filter_map(|field| field.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}
