//! The behavior seam.
//!
//! A behavior is configured once from string parameters, then asked once
//! per cycle to run (when its mode and conditions hold) or to idle. While
//! running it may contribute one objective function over a sub-domain of
//! the helm's decision domain. Behaviors only see the shared buffer through
//! the borrowed `CycleContext`.

use crate::core::config::BehaviorDecl;
use crate::core::domain::DecisionDomain;
use crate::core::error::HelmError;
use crate::core::function::ObjectiveFunction;
use crate::core::info::{CycleContext, InfoValue};
use crate::plugins::condition::LogicCondition;

pub trait Behavior: Send {
    /// Registry key, e.g. `"waypoint"`.
    fn kind(&self) -> &'static str;

    /// Apply one parameter. Unknown parameters are errors.
    fn set_param(&mut self, param: &str, value: &str) -> Result<(), HelmError>;

    /// Called once after all parameters are set.
    fn on_configured(&mut self, _domain: &DecisionDomain) -> Result<(), HelmError> {
        Ok(())
    }

    fn on_run(&mut self, ctx: &CycleContext<'_>) -> Result<BehaviorOutput, HelmError>;

    fn on_idle(&mut self, _ctx: &CycleContext<'_>) {}
}

#[derive(Debug, Default)]
pub struct BehaviorOutput {
    pub function: Option<ObjectiveFunction>,
    /// Variables to write back into the buffer and publish.
    pub posts: Vec<(String, InfoValue)>,
    pub complete: bool,
    /// Overrides the configured priority for this cycle.
    pub priority: Option<f64>,
}

impl BehaviorOutput {
    pub fn with_function(function: ObjectiveFunction) -> Self {
        BehaviorOutput {
            function: Some(function),
            ..BehaviorOutput::default()
        }
    }

    pub fn completed() -> Self {
        BehaviorOutput {
            complete: true,
            ..BehaviorOutput::default()
        }
    }

    pub fn post(mut self, key: &str, value: impl Into<InfoValue>) -> Self {
        self.posts.push((key.to_string(), value.into()));
        self
    }
}

/// Helm-side settings shared by every behavior kind.
#[derive(Debug, Clone)]
pub struct BehaviorSpec {
    pub name: String,
    pub kind: String,
    pub priority: f64,
    pub mode: Option<String>,
    pub conditions: Vec<LogicCondition>,
    pub duration: Option<f64>,
    pub goal: bool,
    pub updates: Option<String>,
    pub runflag: Vec<(String, InfoValue)>,
    pub idleflag: Vec<(String, InfoValue)>,
    pub endflag: Vec<(String, InfoValue)>,
    /// Parameters given at spawn time, recorded in the life event.
    pub spawn_params: String,
}

impl BehaviorSpec {
    pub fn new(name: &str, kind: &str) -> Self {
        BehaviorSpec {
            name: name.to_string(),
            kind: kind.to_string(),
            priority: 100.0,
            mode: None,
            conditions: Vec::new(),
            duration: None,
            goal: false,
            updates: None,
            runflag: Vec::new(),
            idleflag: Vec::new(),
            endflag: Vec::new(),
            spawn_params: String::new(),
        }
    }

    pub fn from_decl(decl: &BehaviorDecl) -> Result<Self, HelmError> {
        let conditions = decl
            .conditions
            .iter()
            .map(|c| LogicCondition::parse(c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BehaviorSpec {
            name: decl.name.clone(),
            kind: decl.kind.clone(),
            priority: decl.priority,
            mode: decl.mode.clone().filter(|m| !m.is_empty()),
            conditions,
            duration: decl.duration,
            goal: decl.goal,
            updates: decl.updates.clone().filter(|u| !u.is_empty()),
            runflag: parse_flags(&decl.runflag)?,
            idleflag: parse_flags(&decl.idleflag)?,
            endflag: parse_flags(&decl.endflag)?,
            spawn_params: String::new(),
        })
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_mode(mut self, mode: &str) -> Self {
        self.mode = Some(mode.to_string());
        self
    }

    pub fn with_condition(mut self, condition: &str) -> Result<Self, HelmError> {
        self.conditions.push(LogicCondition::parse(condition)?);
        Ok(self)
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn as_goal(mut self) -> Self {
        self.goal = true;
        self
    }

    pub fn with_updates(mut self, var: &str) -> Self {
        self.updates = Some(var.to_string());
        self
    }

    pub fn with_endflag(mut self, flag: &str) -> Result<Self, HelmError> {
        self.endflag.push(parse_flag(flag)?);
        Ok(self)
    }
}

/// `VAR=value`
pub fn parse_flag(text: &str) -> Result<(String, InfoValue), HelmError> {
    match text.split_once('=') {
        Some((var, value)) if !var.trim().is_empty() => {
            Ok((var.trim().to_string(), InfoValue::parse(value.trim())))
        }
        _ => Err(HelmError::ConfigError(format!("malformed flag '{}', expected VAR=value", text))),
    }
}

fn parse_flags(flags: &[String]) -> Result<Vec<(String, InfoValue)>, HelmError> {
    flags.iter().map(|f| parse_flag(f)).collect()
}
