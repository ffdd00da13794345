//! Builds piecewise-linear approximations of analytic functions.
//!
//! Construction runs in stages:
//! 1. uniform tiling of the universe,
//! 2. directed refinement inside declared regions,
//! 3. a linear fit of every piece,
//! 4. smart refinement, which spends an extra piece budget on the pieces
//!    the `RefineMetric` ranks worst, splitting each along its longest axis.
//!
//! Parameters are set by name (`uniform_piece`, `refine_region`, ...) so a
//! behavior can pass its own configuration strings straight through.

use crate::core::domain::{DecisionDomain, SnapPolicy};
use crate::core::error::HelmError;
use crate::core::function::ObjectiveFunction;
use crate::core::piece::{IndexBox, Interval, Piece};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Axis count above which only axis extremes are sampled, not all corners.
const MAX_CORNER_DIMS: usize = 6;

/// A function that can be evaluated at any index point of its domain.
pub trait AnalyticFunction {
    fn domain(&self) -> &DecisionDomain;
    fn eval(&self, point: &[u32]) -> f64;
}

/// Wraps a closure over real-valued coordinates.
pub struct ValueFn<F> {
    domain: DecisionDomain,
    f: F,
}

impl<F: Fn(&[f64]) -> f64> ValueFn<F> {
    pub fn new(domain: DecisionDomain, f: F) -> Self {
        ValueFn { domain, f }
    }
}

impl<F: Fn(&[f64]) -> f64> AnalyticFunction for ValueFn<F> {
    fn domain(&self) -> &DecisionDomain {
        &self.domain
    }

    fn eval(&self, point: &[u32]) -> f64 {
        let values: Vec<f64> = point
            .iter()
            .enumerate()
            .map(|(ix, j)| self.domain.value(ix, *j).unwrap_or(f64::NAN))
            .collect();
        (self.f)(&values)
    }
}

/// How well one piece's linear fit matches the sampled function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PieceFit {
    /// Largest absolute residual over the samples.
    pub error: f64,
    /// Spread (max - min) of the sampled values.
    pub span: f64,
}

/// Ranks pieces for smart refinement. Higher is refined first.
pub trait RefineMetric {
    fn priority(&self, bounds: &IndexBox, fit: &PieceFit) -> f64;
}

/// Worst residual first.
#[derive(Debug, Default, Clone, Copy)]
pub struct FitError;

impl RefineMetric for FitError {
    fn priority(&self, _bounds: &IndexBox, fit: &PieceFit) -> f64 {
        fit.error
    }
}

/// Widest value spread first; useful when the fit is exact on coarse
/// pieces but resolution is still wanted where the function moves.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValueSpan;

impl RefineMetric for ValueSpan {
    fn priority(&self, _bounds: &IndexBox, fit: &PieceFit) -> f64 {
        fit.span
    }
}

#[derive(Debug, Clone, Default)]
struct Params {
    uniform_amount: usize,
    uniform_piece: Option<Vec<u32>>,
    uniform_grid: Option<Vec<u32>>,
    refine_regions: Vec<(IndexBox, Vec<u32>)>,
    pending_region: Option<IndexBox>,
    smart_amount: usize,
    smart_percent: usize,
    smart_thresh: f64,
}

pub struct Reflector<'a> {
    aof: &'a dyn AnalyticFunction,
    metric: Box<dyn RefineMetric + 'a>,
    params: Params,
    pieces: Vec<Piece>,
    warnings: Vec<String>,
}

impl<'a> Reflector<'a> {
    pub fn new(aof: &'a dyn AnalyticFunction) -> Self {
        Reflector {
            aof,
            metric: Box::new(FitError),
            params: Params {
                uniform_amount: 1,
                ..Params::default()
            },
            pieces: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_metric(mut self, metric: Box<dyn RefineMetric + 'a>) -> Self {
        self.metric = metric;
        self
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Set several parameters from `key=value#key=value`.
    pub fn set_params(&mut self, text: &str) -> bool {
        let mut ok = true;
        for pair in text.split('#').map(str::trim).filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some((k, v)) => ok &= self.set_param(k.trim(), v.trim()),
                None => {
                    self.warnings.push(format!("malformed reflector parameter '{}'", pair));
                    ok = false;
                }
            }
        }
        ok
    }

    /// Set one parameter. Bad values are recorded as warnings and make the
    /// next `create` fail.
    pub fn set_param(&mut self, param: &str, value: &str) -> bool {
        let result = match param.to_ascii_lowercase().as_str() {
            "uniform_amount" => parse_count(value).map(|n| self.params.uniform_amount = n.max(1)),
            "uniform_piece" => self.parse_edges(value).map(|e| self.params.uniform_piece = Some(e)),
            "uniform_grid" => self.parse_edges(value).map(|e| self.params.uniform_grid = Some(e)),
            "refine_region" => {
                if self.params.pending_region.is_some() {
                    Err("refine_region given twice without a refine_piece".to_string())
                } else {
                    self.parse_region(value).map(|r| self.params.pending_region = Some(r))
                }
            }
            "refine_piece" => match self.params.pending_region.take() {
                None => Err("refine_piece given without a preceding refine_region".to_string()),
                Some(region) => self.parse_edges(value).and_then(|edge| {
                    if region
                        .intervals()
                        .iter()
                        .zip(&edge)
                        .any(|(iv, e)| *e > iv.width())
                    {
                        Err(format!("refine_piece '{}' is larger than its region", value))
                    } else {
                        self.params.refine_regions.push((region, edge));
                        Ok(())
                    }
                }),
            },
            "smart_amount" => parse_count(value).map(|n| self.params.smart_amount = n),
            "smart_percent" => parse_count(value).map(|n| self.params.smart_percent = n),
            "smart_thresh" => value
                .parse::<f64>()
                .map_err(|_| format!("bad number '{}'", value))
                .map(|t| self.params.smart_thresh = t),
            _ => Err("unknown parameter".to_string()),
        };
        match result {
            Ok(()) => true,
            Err(reason) => {
                self.warnings
                    .push(format!("reflector parameter {}={}: {}", param, value, reason));
                false
            }
        }
    }

    /// Build the pieces. Returns the piece count.
    pub fn create(&mut self) -> Result<usize, HelmError> {
        if self.params.pending_region.is_some() {
            self.warnings
                .push("refine_region given without a refine_piece".to_string());
            self.params.pending_region = None;
        }
        if !self.warnings.is_empty() {
            return Err(HelmError::ConfigError(self.warnings.join("; ")));
        }
        let domain = self.aof.domain();
        if domain.is_empty() {
            return Err(HelmError::DomainError("reflector domain is empty".to_string()));
        }
        let universe = domain.universe();

        let edge = match &self.params.uniform_piece {
            Some(edge) => edge.clone(),
            None => uniform_edge(&universe, self.params.uniform_amount),
        };
        let mut boxes = universe.tile(&edge);

        for (region, piece_edge) in &self.params.refine_regions {
            let mut next: Vec<IndexBox> = boxes.iter().flat_map(|b| b.subtract(region)).collect();
            next.extend(region.tile(piece_edge));
            boxes = next;
        }

        let mut fitted: Vec<(Piece, PieceFit)> = boxes.into_iter().map(|b| self.fit(b)).collect();

        let budget = self
            .params
            .smart_amount
            .max(fitted.len() * self.params.smart_percent / 100);
        if budget > 0 {
            self.smart_refine(&mut fitted, budget);
        }

        self.pieces = fitted.into_iter().map(|(p, _)| p).collect();
        Ok(self.pieces.len())
    }

    /// The built function, optionally normalized to `[0, 100]`.
    pub fn extract(&mut self, normalize: bool) -> Result<ObjectiveFunction, HelmError> {
        if self.pieces.is_empty() {
            self.create()?;
        }
        let mut function =
            ObjectiveFunction::new(self.aof.domain().clone(), std::mem::take(&mut self.pieces))?;
        function.set_grid_cell(self.params.uniform_grid.clone());
        if normalize {
            function.normalize(0.0, 100.0);
        }
        Ok(function)
    }

    fn smart_refine(&self, fitted: &mut Vec<(Piece, PieceFit)>, budget: usize) {
        let mut queue: BinaryHeap<Ranked> = fitted
            .iter()
            .enumerate()
            .filter(|(_, (p, _))| !p.bounds().is_point())
            .map(|(ix, (p, fit))| Ranked {
                priority: self.metric.priority(p.bounds(), fit),
                index: ix,
            })
            .collect();

        let mut remaining = budget;
        while remaining > 0 {
            let Some(top) = queue.pop() else {
                break;
            };
            if top.priority <= self.params.smart_thresh {
                break;
            }
            let bounds = fitted[top.index].0.bounds().clone();
            let Some((left, right)) = bounds.split(bounds.longest_dim()) else {
                continue;
            };
            let left = self.fit(left);
            let right = self.fit(right);
            let right_ix = fitted.len();
            for (ix, (piece, fit)) in [(top.index, &left), (right_ix, &right)] {
                if !piece.bounds().is_point() {
                    queue.push(Ranked {
                        priority: self.metric.priority(piece.bounds(), fit),
                        index: ix,
                    });
                }
            }
            fitted[top.index] = left;
            fitted.push(right);
            remaining -= 1;
        }
    }

    /// Linear fit by central differences through the box midpoint.
    fn fit(&self, bounds: IndexBox) -> (Piece, PieceFit) {
        let center = bounds.center();
        let f_center = self.aof.eval(&center);
        let dim = bounds.dim();

        let mut coefs = Vec::with_capacity(dim + 1);
        let mut sample = center.clone();
        for d in 0..dim {
            let iv = bounds.interval(d);
            if iv.lo == iv.hi {
                coefs.push(0.0);
                continue;
            }
            sample[d] = iv.hi;
            let hi = self.aof.eval(&sample);
            sample[d] = iv.lo;
            let lo = self.aof.eval(&sample);
            sample[d] = center[d];
            coefs.push((hi - lo) / (iv.hi - iv.lo) as f64);
        }
        let offset: f64 = coefs.iter().zip(&center).map(|(c, x)| c * *x as f64).sum();
        coefs.push(f_center - offset);

        let samples = if dim <= MAX_CORNER_DIMS {
            bounds.corners()
        } else {
            axis_extremes(&bounds)
        };
        let (mut error, mut lo, mut hi) = (0.0f64, f_center, f_center);
        for point in &samples {
            let actual = self.aof.eval(point);
            let predicted: f64 =
                coefs[..dim].iter().zip(point).map(|(c, x)| c * *x as f64).sum::<f64>() + coefs[dim];
            error = error.max((actual - predicted).abs());
            lo = lo.min(actual);
            hi = hi.max(actual);
        }
        if !coefs.iter().all(|c| c.is_finite()) {
            coefs.iter_mut().for_each(|c| *c = 0.0);
            error = f64::INFINITY;
        }
        (Piece::from_parts(bounds, coefs), PieceFit { error, span: hi - lo })
    }

    fn parse_edges(&self, text: &str) -> Result<Vec<u32>, String> {
        let domain = self.aof.domain();
        let mut edges: Vec<u32> = domain.vars().iter().map(|v| v.points()).collect();
        for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, size) = part
                .split_once(':')
                .ok_or_else(|| format!("expected name:size, got '{}'", part))?;
            let ix = domain
                .index_of(name.trim())
                .ok_or_else(|| format!("unknown variable '{}'", name))?;
            let size = parse_count(size.trim())?;
            if size == 0 {
                return Err(format!("piece size for '{}' must be positive", name));
            }
            edges[ix] = size as u32;
        }
        Ok(edges)
    }

    /// `name:low:high,...` in real values; unnamed axes span their range.
    fn parse_region(&self, text: &str) -> Result<IndexBox, String> {
        let domain = self.aof.domain();
        let mut region = domain.universe();
        for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let fields: Vec<&str> = part.split(':').map(str::trim).collect();
            let [name, low, high] = fields[..] else {
                return Err(format!("expected name:low:high, got '{}'", part));
            };
            let ix = domain
                .index_of(name)
                .ok_or_else(|| format!("unknown variable '{}'", name))?;
            let var = &domain.vars()[ix];
            let low: f64 = low.parse().map_err(|_| format!("bad number '{}'", low))?;
            let high: f64 = high.parse().map_err(|_| format!("bad number '{}'", high))?;
            if low > high || low < var.low() || high > var.high() {
                return Err(format!("region '{}' falls outside the domain", part));
            }
            let lo = domain.discrete_index(ix, low, SnapPolicy::Floor).unwrap_or(0);
            let hi = domain.discrete_index(ix, high, SnapPolicy::Ceil).unwrap_or(0);
            region.set_interval(ix, Interval::new(lo, hi));
        }
        Ok(region)
    }
}

fn parse_count(text: &str) -> Result<usize, String> {
    text.parse::<usize>()
        .map_err(|_| format!("bad count '{}'", text))
}

/// Edge lengths giving roughly `amount` uniform pieces.
fn uniform_edge(universe: &IndexBox, amount: usize) -> Vec<u32> {
    let per_axis = (amount.max(1) as f64).powf(1.0 / universe.dim() as f64).round().max(1.0) as u32;
    universe
        .intervals()
        .iter()
        .map(|iv| iv.width().div_ceil(per_axis.min(iv.width())))
        .collect()
}

fn axis_extremes(bounds: &IndexBox) -> Vec<Vec<u32>> {
    let center = bounds.center();
    let mut out = Vec::with_capacity(bounds.dim() * 2);
    for (d, iv) in bounds.intervals().iter().enumerate() {
        for x in [iv.lo, iv.hi] {
            let mut p = center.clone();
            p[d] = x;
            out.push(p);
        }
    }
    out
}

#[derive(Debug, Clone, Copy)]
struct Ranked {
    priority: f64,
    index: usize,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Highest priority first; ties favor the older piece.
impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.index.cmp(&self.index))
    }
}
