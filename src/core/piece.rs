//! Index-space boxes and the linear pieces defined over them.

use crate::core::error::HelmError;

/// Inclusive integer range on one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    pub lo: u32,
    pub hi: u32,
}

impl Interval {
    pub fn new(lo: u32, hi: u32) -> Self {
        Interval { lo, hi }
    }

    pub fn width(&self) -> u32 {
        self.hi - self.lo + 1
    }

    pub fn contains(&self, x: u32) -> bool {
        self.lo <= x && x <= self.hi
    }
}

/// Axis-aligned box in index space, inclusive on every side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct IndexBox {
    dims: Vec<Interval>,
}

impl IndexBox {
    pub fn new(bounds: &[(u32, u32)]) -> Result<Self, HelmError> {
        if let Some((lo, hi)) = bounds.iter().find(|(lo, hi)| lo > hi) {
            return Err(HelmError::ValidationError(format!(
                "box interval [{}, {}] is inverted",
                lo, hi
            )));
        }
        Ok(IndexBox {
            dims: bounds.iter().map(|(lo, hi)| Interval::new(*lo, *hi)).collect(),
        })
    }

    pub(crate) fn from_intervals(dims: Vec<Interval>) -> Self {
        IndexBox { dims }
    }

    pub fn point(coords: &[u32]) -> Self {
        IndexBox {
            dims: coords.iter().map(|x| Interval::new(*x, *x)).collect(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dims.len()
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.dims
    }

    pub fn interval(&self, d: usize) -> Interval {
        self.dims[d]
    }

    pub fn lo(&self, d: usize) -> u32 {
        self.dims[d].lo
    }

    pub fn hi(&self, d: usize) -> u32 {
        self.dims[d].hi
    }

    pub(crate) fn set_interval(&mut self, d: usize, iv: Interval) {
        self.dims[d] = iv;
    }

    pub fn is_point(&self) -> bool {
        self.dims.iter().all(|iv| iv.lo == iv.hi)
    }

    /// Number of index points inside the box (saturating).
    pub fn size(&self) -> u64 {
        self.dims
            .iter()
            .fold(1u64, |acc, iv| acc.saturating_mul(iv.width() as u64))
    }

    pub fn contains_point(&self, point: &[u32]) -> bool {
        point.len() == self.dims.len() && self.dims.iter().zip(point).all(|(iv, x)| iv.contains(*x))
    }

    pub fn contains(&self, other: &IndexBox) -> bool {
        other.dims.len() == self.dims.len()
            && self
                .dims
                .iter()
                .zip(&other.dims)
                .all(|(a, b)| a.lo <= b.lo && b.hi <= a.hi)
    }

    pub fn intersects(&self, other: &IndexBox) -> bool {
        self.dims.len() == other.dims.len()
            && self
                .dims
                .iter()
                .zip(&other.dims)
                .all(|(a, b)| a.lo <= b.hi && b.lo <= a.hi)
    }

    pub fn intersection(&self, other: &IndexBox) -> Option<IndexBox> {
        let mut out = IndexBox::default();
        self.intersect_into(other, &mut out).then_some(out)
    }

    /// Write the intersection into `out`, reusing its allocation.
    /// Returns false (leaving `out` unspecified) when the boxes are disjoint.
    pub fn intersect_into(&self, other: &IndexBox, out: &mut IndexBox) -> bool {
        if self.dims.len() != other.dims.len() {
            return false;
        }
        out.dims.clear();
        for (a, b) in self.dims.iter().zip(&other.dims) {
            let lo = a.lo.max(b.lo);
            let hi = a.hi.min(b.hi);
            if lo > hi {
                return false;
            }
            out.dims.push(Interval::new(lo, hi));
        }
        true
    }

    /// Widest axis; ties go to the lowest axis index.
    pub fn longest_dim(&self) -> usize {
        let mut best = 0;
        for (d, iv) in self.dims.iter().enumerate() {
            if iv.width() > self.dims[best].width() {
                best = d;
            }
        }
        best
    }

    /// Cut in half along axis `d`. None when that axis is a single index.
    pub fn split(&self, d: usize) -> Option<(IndexBox, IndexBox)> {
        let iv = *self.dims.get(d)?;
        if iv.lo == iv.hi {
            return None;
        }
        let mid = iv.lo + (iv.hi - iv.lo) / 2;
        let mut left = self.clone();
        let mut right = self.clone();
        left.dims[d] = Interval::new(iv.lo, mid);
        right.dims[d] = Interval::new(mid + 1, iv.hi);
        Some((left, right))
    }

    /// The parts of `self` not covered by `hole`, as disjoint boxes.
    pub fn subtract(&self, hole: &IndexBox) -> Vec<IndexBox> {
        if !self.intersects(hole) {
            return vec![self.clone()];
        }
        let mut rest = Vec::new();
        let mut core = self.clone();
        for d in 0..self.dims.len() {
            let (c, h) = (core.dims[d], hole.dims[d]);
            if c.lo < h.lo {
                let mut part = core.clone();
                part.dims[d] = Interval::new(c.lo, h.lo - 1);
                rest.push(part);
                core.dims[d].lo = h.lo;
            }
            if c.hi > h.hi {
                let mut part = core.clone();
                part.dims[d] = Interval::new(h.hi + 1, c.hi);
                rest.push(part);
                core.dims[d].hi = h.hi;
            }
        }
        rest
    }

    /// Integer midpoint on every axis.
    pub fn center(&self) -> Vec<u32> {
        self.dims.iter().map(|iv| iv.lo + (iv.hi - iv.lo) / 2).collect()
    }

    /// Distinct corner points. Degenerate axes contribute one coordinate.
    pub fn corners(&self) -> Vec<Vec<u32>> {
        let mut out: Vec<Vec<u32>> = vec![Vec::with_capacity(self.dims.len())];
        for iv in &self.dims {
            let mut next = Vec::with_capacity(out.len() * 2);
            for prefix in &out {
                let mut a = prefix.clone();
                a.push(iv.lo);
                next.push(a);
                if iv.hi != iv.lo {
                    let mut b = prefix.clone();
                    b.push(iv.hi);
                    next.push(b);
                }
            }
            out = next;
        }
        out
    }

    /// Tile the box with boxes of at most `edge[d]` indices per axis.
    pub fn tile(&self, edge: &[u32]) -> Vec<IndexBox> {
        let mut out = vec![IndexBox::default()];
        for (d, iv) in self.dims.iter().enumerate() {
            let step = edge.get(d).copied().unwrap_or(iv.width()).max(1);
            let mut next = Vec::new();
            for prefix in &out {
                let mut lo = iv.lo;
                loop {
                    let hi = lo.saturating_add(step - 1).min(iv.hi);
                    let mut b = prefix.clone();
                    b.dims.push(Interval::new(lo, hi));
                    next.push(b);
                    if hi == iv.hi {
                        break;
                    }
                    lo = hi + 1;
                }
            }
            out = next;
        }
        out
    }
}

/// Maximum of `Σ c_d·x_d + c` over `region`, and the corner attaining it.
/// Ties on a zero slope resolve to the low end.
pub fn affine_argmax(coefs: &[f64], region: &IndexBox) -> (f64, Vec<u32>) {
    let mut value = coefs.last().copied().unwrap_or(0.0);
    let mut point = Vec::with_capacity(region.dim());
    for (d, iv) in region.intervals().iter().enumerate() {
        let x = if coefs[d] > 0.0 { iv.hi } else { iv.lo };
        value += coefs[d] * x as f64;
        point.push(x);
    }
    (value, point)
}

/// `affine_argmax` without building the point.
pub fn affine_max(coefs: &[f64], region: &IndexBox) -> f64 {
    let mut value = coefs.last().copied().unwrap_or(0.0);
    for (d, iv) in region.intervals().iter().enumerate() {
        let x = if coefs[d] > 0.0 { iv.hi } else { iv.lo };
        value += coefs[d] * x as f64;
    }
    value
}

pub fn affine_min(coefs: &[f64], region: &IndexBox) -> f64 {
    let mut value = coefs.last().copied().unwrap_or(0.0);
    for (d, iv) in region.intervals().iter().enumerate() {
        let x = if coefs[d] < 0.0 { iv.hi } else { iv.lo };
        value += coefs[d] * x as f64;
    }
    value
}

/// A box together with the linear function `Σ c_d·x_d + c` it carries.
/// `coefs` holds one slope per axis followed by the intercept.
#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    bounds: IndexBox,
    coefs: Vec<f64>,
}

impl Piece {
    pub fn new(bounds: IndexBox, coefs: Vec<f64>) -> Result<Self, HelmError> {
        if coefs.len() != bounds.dim() + 1 {
            return Err(HelmError::ValidationError(format!(
                "piece over {} axes needs {} coefficients, got {}",
                bounds.dim(),
                bounds.dim() + 1,
                coefs.len()
            )));
        }
        if coefs.iter().any(|c| !c.is_finite()) {
            return Err(HelmError::ValidationError("piece coefficient is not finite".to_string()));
        }
        Ok(Piece { bounds, coefs })
    }

    pub fn constant(bounds: IndexBox, value: f64) -> Self {
        let mut coefs = vec![0.0; bounds.dim()];
        coefs.push(value);
        Piece { bounds, coefs }
    }

    pub fn bounds(&self) -> &IndexBox {
        &self.bounds
    }

    pub fn coefs(&self) -> &[f64] {
        &self.coefs
    }

    pub fn slope(&self, d: usize) -> f64 {
        self.coefs[d]
    }

    pub fn intercept(&self) -> f64 {
        self.coefs[self.bounds.dim()]
    }

    pub fn is_constant(&self) -> bool {
        self.coefs[..self.bounds.dim()].iter().all(|c| *c == 0.0)
    }

    pub fn eval(&self, point: &[u32]) -> f64 {
        self.coefs[..self.bounds.dim()]
            .iter()
            .zip(point)
            .map(|(c, x)| c * *x as f64)
            .sum::<f64>()
            + self.intercept()
    }

    pub fn max_value(&self) -> f64 {
        affine_max(&self.coefs, &self.bounds)
    }

    pub fn min_value(&self) -> f64 {
        affine_min(&self.coefs, &self.bounds)
    }

    pub fn argmax(&self) -> (f64, Vec<u32>) {
        affine_argmax(&self.coefs, &self.bounds)
    }

    pub(crate) fn coefs_mut(&mut self) -> &mut [f64] {
        &mut self.coefs
    }

    /// Caller guarantees `coefs.len() == bounds.dim() + 1`.
    pub(crate) fn from_parts(bounds: IndexBox, coefs: Vec<f64>) -> Self {
        debug_assert_eq!(coefs.len(), bounds.dim() + 1);
        Piece { bounds, coefs }
    }
}
