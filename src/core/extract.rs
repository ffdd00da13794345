//! Exact one-dimensional piecewise-linear builders.
//!
//! `extract_pieces` walks a sampled function and merges consecutive points
//! into the longest linear runs it can. `from_breakpoints` builds the pieces
//! straight from (index, value) vertices.

use crate::core::domain::DecisionDomain;
use crate::core::error::HelmError;
use crate::core::function::ObjectiveFunction;
use crate::core::piece::{IndexBox, Piece};

/// Floor on the tolerance so exactly-linear runs survive rounding noise.
const MIN_TOLERANCE: f64 = 1e-9;

/// Build a function over the one-variable `domain` from one sample per
/// index. A run ends where a sample drifts more than `tolerance` from the
/// line through the run's first two samples, or where the local slope
/// changes sign against the run.
pub fn extract_pieces(
    domain: &DecisionDomain,
    samples: &[f64],
    tolerance: f64,
) -> Result<ObjectiveFunction, HelmError> {
    let points = single_axis_points(domain)?;
    if samples.len() != points as usize {
        return Err(HelmError::ValidationError(format!(
            "expected {} samples, got {}",
            points,
            samples.len()
        )));
    }
    if samples.iter().any(|v| !v.is_finite()) {
        return Err(HelmError::ValidationError("sample is not finite".to_string()));
    }
    let tolerance = tolerance.max(MIN_TOLERANCE);

    let n = samples.len();
    let mut pieces = Vec::new();
    let mut start = 0usize;
    while start < n {
        if start + 1 == n {
            pieces.push(Piece::constant(
                IndexBox::new(&[(start as u32, start as u32)])?,
                samples[start],
            ));
            break;
        }
        let slope = samples[start + 1] - samples[start];
        let mut end = start + 1;
        while end + 1 < n {
            let next = end + 1;
            let projected = samples[start] + slope * (next - start) as f64;
            let local = samples[next] - samples[end];
            if (projected - samples[next]).abs() > tolerance || local * slope < 0.0 {
                break;
            }
            end = next;
        }
        let intercept = samples[start] - slope * start as f64;
        pieces.push(Piece::new(
            IndexBox::new(&[(start as u32, end as u32)])?,
            vec![slope, intercept],
        )?);
        start = end + 1;
    }
    ObjectiveFunction::new(domain.clone(), pieces)
}

/// Build a function through `(index, value)` vertices. The first vertex must
/// sit at index 0, the last at the final index, and indices must increase.
/// Each piece owns its left vertex; the last piece owns both ends.
pub fn from_breakpoints(domain: &DecisionDomain, vertices: &[(u32, f64)]) -> Result<ObjectiveFunction, HelmError> {
    let points = single_axis_points(domain)?;
    let last = points - 1;
    match (vertices.first(), vertices.last()) {
        (Some((0, _)), Some((end, _))) if *end == last => {}
        _ => {
            return Err(HelmError::ValidationError(format!(
                "breakpoints must span index 0 to {}",
                last
            )));
        }
    }
    if vertices.windows(2).any(|w| w[0].0 >= w[1].0) {
        return Err(HelmError::ValidationError("breakpoint indices must increase".to_string()));
    }
    if vertices.len() == 1 {
        return ObjectiveFunction::new(
            domain.clone(),
            vec![Piece::constant(domain.universe(), vertices[0].1)],
        );
    }

    let mut pieces = Vec::with_capacity(vertices.len() - 1);
    for (i, w) in vertices.windows(2).enumerate() {
        let ((x0, y0), (x1, y1)) = (w[0], w[1]);
        let slope = (y1 - y0) / (x1 - x0) as f64;
        let hi = if i + 2 == vertices.len() { x1 } else { x1 - 1 };
        pieces.push(Piece::new(IndexBox::new(&[(x0, hi)])?, vec![slope, y0 - slope * x0 as f64])?);
    }
    ObjectiveFunction::new(domain.clone(), pieces)
}

fn single_axis_points(domain: &DecisionDomain) -> Result<u32, HelmError> {
    match domain.vars() {
        [var] => Ok(var.points()),
        _ => Err(HelmError::DomainError(format!(
            "one-dimensional builder given domain {}",
            domain
        ))),
    }
}
