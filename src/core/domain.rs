//! Decision domain: the ordered set of discretized decision variables.
//!
//! Every objective function, search box and decision is expressed in the
//! index space of a `DecisionDomain`. A variable `{name, low, high, points}`
//! spans `points` evenly spaced values from `low` to `high` inclusive.

use crate::core::error::HelmError;
use crate::core::piece::{IndexBox, Interval};
use std::fmt;
use std::str::FromStr;

/// Tolerance used when a real value lands (numerically) on a grid point.
const SNAP_EPS: f64 = 1e-9;

/// How a real value is mapped onto a discrete domain index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapPolicy {
    /// Largest index whose value is `<=` the input.
    Floor,
    /// Smallest index whose value is `>=` the input.
    Ceil,
    /// Closest index; exact midpoints round down.
    Nearest,
}

#[derive(Debug, Clone)]
pub struct DomainVar {
    name: String,
    low: f64,
    high: f64,
    points: u32,
    delta: f64,
    optional: bool,
}

impl DomainVar {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Optional variables may be left undecided without forcing an all-stop.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Value of index `j`, if in range.
    pub fn value(&self, j: u32) -> Option<f64> {
        if j >= self.points {
            return None;
        }
        if j == self.points - 1 {
            return Some(self.high);
        }
        Some(self.low + self.delta * j as f64)
    }
}

/// Two variables describe the same axis when name, range and resolution match.
/// The `optional` flag is a helm-level concern and does not take part.
impl PartialEq for DomainVar {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.low == other.low
            && self.high == other.high
            && self.points == other.points
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionDomain {
    vars: Vec<DomainVar>,
}

impl DecisionDomain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a variable. Rejects duplicate names, inverted ranges, zero
    /// points, and single-point variables whose range is not degenerate.
    pub fn add_var(&mut self, name: &str, low: f64, high: f64, points: u32) -> Result<(), HelmError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HelmError::DomainError("variable name is empty".to_string()));
        }
        if self.index_of(name).is_some() {
            return Err(HelmError::DomainError(format!("duplicate variable '{}'", name)));
        }
        if !low.is_finite() || !high.is_finite() {
            return Err(HelmError::DomainError(format!("variable '{}' has a non-finite bound", name)));
        }
        if low > high {
            return Err(HelmError::DomainError(format!(
                "variable '{}' has low {} above high {}",
                name, low, high
            )));
        }
        if points < 1 {
            return Err(HelmError::DomainError(format!("variable '{}' has no points", name)));
        }
        if points == 1 && low != high {
            return Err(HelmError::DomainError(format!(
                "variable '{}' has one point but low {} != high {}",
                name, low, high
            )));
        }
        let delta = if points > 1 {
            (high - low) / (points - 1) as f64
        } else {
            0.0
        };
        self.vars.push(DomainVar {
            name: name.to_string(),
            low,
            high,
            points,
            delta,
            optional: false,
        });
        Ok(())
    }

    /// Append a variable given its spacing rather than its point count.
    /// `high` is pulled down onto the last whole step.
    pub fn add_var_with_delta(&mut self, name: &str, low: f64, high: f64, delta: f64) -> Result<(), HelmError> {
        if !(delta > 0.0) {
            return Err(HelmError::DomainError(format!(
                "variable '{}' has non-positive delta {}",
                name, delta
            )));
        }
        if low > high {
            return Err(HelmError::DomainError(format!(
                "variable '{}' has low {} above high {}",
                name, low, high
            )));
        }
        let steps = ((high - low) / delta + SNAP_EPS).floor() as u32;
        let high = low + delta * steps as f64;
        self.add_var(name, low, high, steps + 1)
    }

    /// Copy one variable (with its optional flag) from another domain.
    pub fn add_var_from(&mut self, other: &DecisionDomain, name: &str) -> Result<(), HelmError> {
        let var = other
            .var_by_name(name)
            .ok_or_else(|| HelmError::NotFound(format!("domain variable '{}'", name)))?;
        self.add_var(&var.name, var.low, var.high, var.points)?;
        self.set_optional(&var.name, var.optional)
    }

    pub fn set_optional(&mut self, name: &str, optional: bool) -> Result<(), HelmError> {
        let var = self
            .vars
            .iter_mut()
            .find(|v| v.name == name)
            .ok_or_else(|| HelmError::NotFound(format!("domain variable '{}'", name)))?;
        var.optional = optional;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn vars(&self) -> &[DomainVar] {
        &self.vars
    }

    pub fn var(&self, ix: usize) -> Option<&DomainVar> {
        self.vars.get(ix)
    }

    pub fn var_by_name(&self, name: &str) -> Option<&DomainVar> {
        self.vars.iter().find(|v| v.name == name)
    }

    pub fn var_name(&self, ix: usize) -> Option<&str> {
        self.vars.get(ix).map(|v| v.name.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.vars.iter().position(|v| v.name == name)
    }

    pub fn has_var(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.iter().map(|v| v.name.as_str())
    }

    /// True when the domain consists of exactly the named variable(s),
    /// in any order.
    pub fn has_only_vars(&self, first: &str, second: Option<&str>) -> bool {
        match second {
            None => self.vars.len() == 1 && self.vars[0].name == first,
            Some(second) => {
                first != second && self.vars.len() == 2 && self.has_var(first) && self.has_var(second)
            }
        }
    }

    /// Number of points in the full joint space (saturating).
    pub fn total_points(&self) -> u64 {
        self.vars
            .iter()
            .fold(1u64, |acc, v| acc.saturating_mul(v.points as u64))
    }

    /// Value of index `j` on variable `ix`.
    pub fn value(&self, ix: usize, j: u32) -> Option<f64> {
        self.vars.get(ix)?.value(j)
    }

    /// Snap a real value to an index of variable `ix`. Values at or beyond
    /// the range ends clamp to the first/last index.
    pub fn discrete_index(&self, ix: usize, val: f64, snap: SnapPolicy) -> Option<u32> {
        let var = self.vars.get(ix)?;
        if val <= var.low {
            return Some(0);
        }
        if val >= var.high {
            return Some(var.points - 1);
        }
        let shifted = match snap {
            SnapPolicy::Nearest => val - var.delta / 2.0,
            SnapPolicy::Floor | SnapPolicy::Ceil => val,
        };
        let dval = (shifted - var.low) / var.delta;
        let rounded = dval.round();
        let index = if snap != SnapPolicy::Nearest && (dval - rounded).abs() < SNAP_EPS {
            rounded
        } else {
            match snap {
                SnapPolicy::Floor => dval.floor(),
                SnapPolicy::Ceil | SnapPolicy::Nearest => dval.ceil(),
            }
        };
        Some(index.clamp(0.0, (var.points - 1) as f64) as u32)
    }

    pub fn snap_value(&self, ix: usize, val: f64, snap: SnapPolicy) -> Option<f64> {
        let j = self.discrete_index(ix, val, snap)?;
        self.value(ix, j)
    }

    /// Snap `val`, then step one index down. At index 0 the result is
    /// `high` when wrapping, otherwise `low`.
    pub fn next_lower_value(&self, ix: usize, val: f64, snap: SnapPolicy, wrap: bool) -> Option<f64> {
        let var = self.vars.get(ix)?;
        let j = self.discrete_index(ix, val, snap)?;
        if j > 0 {
            var.value(j - 1)
        } else if wrap {
            Some(var.high)
        } else {
            Some(var.low)
        }
    }

    /// Snap `val`, then step one index up. At the last index the result is
    /// `low` when wrapping, otherwise `high`.
    pub fn next_higher_value(&self, ix: usize, val: f64, snap: SnapPolicy, wrap: bool) -> Option<f64> {
        let var = self.vars.get(ix)?;
        let j = self.discrete_index(ix, val, snap)?;
        if j + 1 < var.points {
            var.value(j + 1)
        } else if wrap {
            Some(var.low)
        } else {
            Some(var.high)
        }
    }

    pub fn eq_or_lower_value(&self, ix: usize, val: f64) -> Option<f64> {
        self.snap_value(ix, val, SnapPolicy::Floor)
    }

    pub fn eq_or_higher_value(&self, ix: usize, val: f64) -> Option<f64> {
        self.snap_value(ix, val, SnapPolicy::Ceil)
    }

    /// Domain restricted to the named variables, in the given order.
    pub fn subdomain(&self, names: &[&str]) -> Result<DecisionDomain, HelmError> {
        let mut sub = DecisionDomain::new();
        for name in names {
            sub.add_var_from(self, name)?;
        }
        Ok(sub)
    }

    /// The box covering every point of the domain.
    pub fn universe(&self) -> IndexBox {
        IndexBox::from_intervals(
            self.vars
                .iter()
                .map(|v| Interval::new(0, v.points - 1))
                .collect(),
        )
    }

    /// Snap a full vector of real values to a point (nearest policy).
    pub fn point_of(&self, values: &[f64]) -> Option<Vec<u32>> {
        if values.len() != self.vars.len() {
            return None;
        }
        values
            .iter()
            .enumerate()
            .map(|(ix, v)| self.discrete_index(ix, *v, SnapPolicy::Nearest))
            .collect()
    }

    /// Parse one configuration declaration:
    /// `name:low:high:points[:optional]` or `name:low:high:delta=D[:optional]`.
    pub fn add_declaration(&mut self, decl: &str) -> Result<(), HelmError> {
        let fields: Vec<&str> = decl.split(':').map(str::trim).collect();
        if fields.len() < 4 || fields.len() > 5 {
            return Err(HelmError::DomainError(format!("malformed domain declaration '{}'", decl)));
        }
        let optional = match fields.get(4) {
            None => false,
            Some(flag) if flag.eq_ignore_ascii_case("optional") => true,
            Some(flag) => {
                return Err(HelmError::DomainError(format!(
                    "unknown domain flag '{}' in '{}'",
                    flag, decl
                )));
            }
        };
        let name = fields[0];
        let low = parse_f64(fields[1], decl)?;
        let high = parse_f64(fields[2], decl)?;
        if let Some(delta) = fields[3].strip_prefix("delta=") {
            self.add_var_with_delta(name, low, high, parse_f64(delta, decl)?)?;
        } else {
            let points = fields[3]
                .parse::<u32>()
                .map_err(|_| HelmError::DomainError(format!("bad point count in '{}'", decl)))?;
            self.add_var(name, low, high, points)?;
        }
        self.set_optional(name, optional)
    }
}

fn parse_f64(raw: &str, context: &str) -> Result<f64, HelmError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| HelmError::DomainError(format!("bad number '{}' in '{}'", raw, context)))
}

/// Renders as `course,0,359,360:speed,0,5,51`.
impl fmt::Display for DecisionDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.vars.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{},{},{},{}", v.name, v.low, v.high, v.points)?;
        }
        Ok(())
    }
}

impl FromStr for DecisionDomain {
    type Err = HelmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut domain = DecisionDomain::new();
        for part in s.split(':').filter(|p| !p.trim().is_empty()) {
            let fields: Vec<&str> = part.split(',').map(str::trim).collect();
            if fields.len() != 4 {
                return Err(HelmError::DomainError(format!("malformed domain variable '{}'", part)));
            }
            let points = fields[3]
                .parse::<u32>()
                .map_err(|_| HelmError::DomainError(format!("bad point count in '{}'", part)))?;
            domain.add_var(fields[0], parse_f64(fields[1], part)?, parse_f64(fields[2], part)?, points)?;
        }
        Ok(domain)
    }
}
