//! Peak utility generator for one decision variable.
//!
//! Utility is `max_util` at the summit, falls by `summit_delta` across
//! `peak_width` on each side, then falls linearly to `min_util` across
//! `base_width`. With wrapping (headings), distance is measured around
//! the circle.

use crate::core::domain::DecisionDomain;
use crate::core::error::HelmError;
use crate::core::extract::extract_pieces;
use crate::core::function::ObjectiveFunction;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PeakUtility {
    pub summit: f64,
    pub peak_width: f64,
    pub base_width: f64,
    pub summit_delta: f64,
    pub min_util: f64,
    pub max_util: f64,
    pub wrap: bool,
}

impl Default for PeakUtility {
    fn default() -> Self {
        PeakUtility {
            summit: 0.0,
            peak_width: 0.0,
            base_width: 0.0,
            summit_delta: 0.0,
            min_util: 0.0,
            max_util: 100.0,
            wrap: false,
        }
    }
}

impl PeakUtility {
    pub fn new(summit: f64, peak_width: f64, base_width: f64) -> Self {
        PeakUtility {
            summit,
            peak_width,
            base_width,
            ..PeakUtility::default()
        }
    }

    pub fn validate(&self) -> Result<(), HelmError> {
        if self.peak_width < 0.0 || self.base_width < 0.0 {
            return Err(HelmError::ValidationError("peak widths must be non-negative".to_string()));
        }
        if self.min_util > self.max_util {
            return Err(HelmError::ValidationError(format!(
                "min_util {} exceeds max_util {}",
                self.min_util, self.max_util
            )));
        }
        if self.summit_delta < 0.0 || self.summit_delta > self.max_util - self.min_util {
            return Err(HelmError::ValidationError(format!(
                "summit_delta {} outside [0, {}]",
                self.summit_delta,
                self.max_util - self.min_util
            )));
        }
        Ok(())
    }

    /// Utility at `x`. `circumference` is the wrap length, if wrapping.
    pub fn utility(&self, x: f64, circumference: Option<f64>) -> f64 {
        let mut dist = (x - self.summit).abs();
        if let Some(c) = circumference.filter(|c| *c > 0.0) {
            dist %= c;
            dist = dist.min(c - dist);
        }
        let shoulder = self.max_util - self.summit_delta;
        if dist <= self.peak_width {
            if self.peak_width == 0.0 {
                return self.max_util;
            }
            return self.max_util - self.summit_delta * dist / self.peak_width;
        }
        let past = dist - self.peak_width;
        if past < self.base_width {
            return shoulder - (shoulder - self.min_util) * past / self.base_width;
        }
        self.min_util
    }

    /// Exact piecewise function over variable `var` of `domain`.
    pub fn build(&self, domain: &DecisionDomain, var: &str) -> Result<ObjectiveFunction, HelmError> {
        self.validate()?;
        let sub = domain.subdomain(&[var])?;
        let axis = &sub.vars()[0];
        let circumference = self
            .wrap
            .then(|| axis.high() - axis.low() + axis.delta());
        let samples: Vec<f64> = (0..axis.points())
            .map(|j| self.utility(axis.value(j).unwrap_or(axis.high()), circumference))
            .collect();
        extract_pieces(&sub, &samples, 1e-6)
    }
}
