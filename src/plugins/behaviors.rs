//! Reference behaviors shipped with the helm.
//!
//! `peak` prefers one value of one variable. `waypoint` steers through a list
//! of points: it reads `NAV_X`/`NAV_Y` from the buffer, prefers the bearing to
//! the current point and a cruise speed, and completes after the last point
//! is captured.

use crate::core::domain::DecisionDomain;
use crate::core::error::HelmError;
use crate::core::function::ObjectiveFunction;
use crate::core::info::CycleContext;
use crate::core::reflector::{Reflector, ValueFn};
use crate::core::zaic::PeakUtility;
use crate::plugins::behavior::{Behavior, BehaviorOutput};

fn parse_num(param: &str, value: &str) -> Result<f64, HelmError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| HelmError::ConfigError(format!("parameter {}: '{}' is not a number", param, value)))
}

fn parse_bool(param: &str, value: &str) -> Result<bool, HelmError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(HelmError::ConfigError(format!("parameter {}: '{}' is not a boolean", param, value))),
    }
}

fn unknown_param(kind: &str, param: &str) -> HelmError {
    HelmError::ConfigError(format!("{} behavior has no parameter '{}'", kind, param))
}

// ===== peak =====

#[derive(Debug, Default)]
pub struct PeakBehavior {
    var: Option<String>,
    summit_var: Option<String>,
    shape: PeakUtility,
}

impl PeakBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed() -> Box<dyn Behavior> {
        Box::new(Self::new())
    }
}

impl Behavior for PeakBehavior {
    fn kind(&self) -> &'static str {
        "peak"
    }

    fn set_param(&mut self, param: &str, value: &str) -> Result<(), HelmError> {
        match param {
            "var" => self.var = Some(value.trim().to_string()),
            "summit_var" => self.summit_var = Some(value.trim().to_string()),
            "summit" => self.shape.summit = parse_num(param, value)?,
            "peak_width" => self.shape.peak_width = parse_num(param, value)?,
            "base_width" => self.shape.base_width = parse_num(param, value)?,
            "summit_delta" => self.shape.summit_delta = parse_num(param, value)?,
            "min_util" => self.shape.min_util = parse_num(param, value)?,
            "max_util" => self.shape.max_util = parse_num(param, value)?,
            "wrap" => self.shape.wrap = parse_bool(param, value)?,
            _ => return Err(unknown_param(self.kind(), param)),
        }
        Ok(())
    }

    fn on_configured(&mut self, domain: &DecisionDomain) -> Result<(), HelmError> {
        let var = self
            .var
            .as_deref()
            .ok_or_else(|| HelmError::ConfigError("peak behavior needs 'var'".to_string()))?;
        if !domain.has_var(var) {
            return Err(HelmError::ConfigError(format!("peak variable '{}' is not in the domain", var)));
        }
        self.shape.validate()
    }

    fn on_run(&mut self, ctx: &CycleContext<'_>) -> Result<BehaviorOutput, HelmError> {
        let var = self
            .var
            .as_deref()
            .ok_or_else(|| HelmError::ConfigError("peak behavior needs 'var'".to_string()))?;
        let mut shape = self.shape.clone();
        if let Some(summit_var) = &self.summit_var {
            shape.summit = ctx
                .info
                .num(summit_var)
                .ok_or_else(|| HelmError::NotFound(format!("summit variable {}", summit_var)))?;
        }
        Ok(BehaviorOutput::with_function(shape.build(ctx.domain, var)?))
    }
}

// ===== waypoint =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildMethod {
    Exact,
    Reflector,
}

#[derive(Debug)]
pub struct WaypointBehavior {
    points: Vec<(f64, f64)>,
    current: usize,
    speed: f64,
    capture_radius: f64,
    course_var: String,
    speed_var: String,
    method: BuildMethod,
    reflector_params: String,
}

impl Default for WaypointBehavior {
    fn default() -> Self {
        WaypointBehavior {
            points: Vec::new(),
            current: 0,
            speed: 1.0,
            capture_radius: 3.0,
            course_var: "course".to_string(),
            speed_var: "speed".to_string(),
            method: BuildMethod::Exact,
            reflector_params: "uniform_piece=course:10".to_string(),
        }
    }
}

impl WaypointBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed() -> Box<dyn Behavior> {
        Box::new(Self::new())
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    fn parse_points(value: &str) -> Result<Vec<(f64, f64)>, HelmError> {
        value
            .split(':')
            .filter(|p| !p.trim().is_empty())
            .map(|pair| {
                let (x, y) = pair
                    .split_once(',')
                    .ok_or_else(|| HelmError::ConfigError(format!("bad waypoint '{}', expected x,y", pair)))?;
                Ok((parse_num("points", x)?, parse_num("points", y)?))
            })
            .collect()
    }

    fn course_shape(bearing: f64) -> PeakUtility {
        PeakUtility {
            wrap: true,
            ..PeakUtility::new(bearing, 0.0, 180.0)
        }
    }

    fn speed_shape(&self, domain: &DecisionDomain) -> Option<PeakUtility> {
        let var = domain.var_by_name(&self.speed_var)?;
        Some(PeakUtility::new(self.speed, 0.0, (var.high() - var.low()).max(var.delta())))
    }

    fn build_exact(&self, domain: &DecisionDomain, bearing: f64) -> Result<ObjectiveFunction, HelmError> {
        let course_fn = Self::course_shape(bearing).build(domain, &self.course_var)?;
        let Some(speed) = self.speed_shape(domain) else {
            return Ok(course_fn);
        };
        let joint = domain.subdomain(&[self.course_var.as_str(), self.speed_var.as_str()])?;
        let speed_fn = speed.build(domain, &self.speed_var)?;
        course_fn.expand_to(&joint)?.add(&speed_fn)
    }

    fn build_reflected(&self, domain: &DecisionDomain, bearing: f64) -> Result<ObjectiveFunction, HelmError> {
        let course = Self::course_shape(bearing);
        let speed = self.speed_shape(domain);
        let names: Vec<&str> = match speed {
            Some(_) => vec![self.course_var.as_str(), self.speed_var.as_str()],
            None => vec![self.course_var.as_str()],
        };
        let sub = domain.subdomain(&names)?;
        let circumference = sub.vars()[0].high() - sub.vars()[0].low() + sub.vars()[0].delta();
        let aof = ValueFn::new(sub, |v: &[f64]| {
            let mut total = course.utility(v[0], Some(circumference));
            if let (Some(s), Some(x)) = (&speed, v.get(1)) {
                total += s.utility(*x, None);
            }
            total
        });
        let mut reflector = Reflector::new(&aof);
        if !reflector.set_params(&self.reflector_params) {
            return Err(HelmError::ConfigError(reflector.warnings().join("; ")));
        }
        reflector.extract(false)
    }
}

impl Behavior for WaypointBehavior {
    fn kind(&self) -> &'static str {
        "waypoint"
    }

    fn set_param(&mut self, param: &str, value: &str) -> Result<(), HelmError> {
        match param {
            "points" => {
                self.points = Self::parse_points(value)?;
                self.current = 0;
            }
            "speed" => self.speed = parse_num(param, value)?,
            "capture_radius" => self.capture_radius = parse_num(param, value)?.max(0.0),
            "course_var" => self.course_var = value.trim().to_string(),
            "speed_var" => self.speed_var = value.trim().to_string(),
            "build" => {
                self.method = match value.trim() {
                    "exact" => BuildMethod::Exact,
                    "reflector" => BuildMethod::Reflector,
                    other => {
                        return Err(HelmError::ConfigError(format!(
                            "build must be 'exact' or 'reflector', not '{}'",
                            other
                        )));
                    }
                }
            }
            "reflector" => self.reflector_params = value.to_string(),
            _ => return Err(unknown_param(self.kind(), param)),
        }
        Ok(())
    }

    fn on_configured(&mut self, domain: &DecisionDomain) -> Result<(), HelmError> {
        if self.points.is_empty() {
            return Err(HelmError::ConfigError("waypoint behavior needs 'points'".to_string()));
        }
        if !domain.has_var(&self.course_var) {
            return Err(HelmError::ConfigError(format!(
                "waypoint course variable '{}' is not in the domain",
                self.course_var
            )));
        }
        Ok(())
    }

    fn on_run(&mut self, ctx: &CycleContext<'_>) -> Result<BehaviorOutput, HelmError> {
        let (Some(x), Some(y)) = (ctx.info.num("NAV_X"), ctx.info.num("NAV_Y")) else {
            return Err(HelmError::NotFound("ownship position NAV_X/NAV_Y".to_string()));
        };
        while let Some(&(px, py)) = self.points.get(self.current) {
            if (px - x).hypot(py - y) > self.capture_radius {
                break;
            }
            self.current += 1;
        }
        let Some(&(px, py)) = self.points.get(self.current) else {
            return Ok(BehaviorOutput::completed().post("WPT_INDEX", self.current as f64));
        };
        let bearing = (px - x).atan2(py - y).to_degrees().rem_euclid(360.0);
        let function = match self.method {
            BuildMethod::Exact => self.build_exact(ctx.domain, bearing)?,
            BuildMethod::Reflector => self.build_reflected(ctx.domain, bearing)?,
        };
        Ok(BehaviorOutput::with_function(function).post("WPT_INDEX", self.current as f64))
    }
}
