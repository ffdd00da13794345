//! Piecewise-linear objective functions.
//!
//! An `ObjectiveFunction` partitions its domain into disjoint boxes, each
//! carrying a linear form in index space. Functions are owned values: a
//! behavior builds one per cycle and the solver drops it when the cycle ends.

use crate::core::domain::DecisionDomain;
use crate::core::error::HelmError;
use crate::core::grid::Grid;
use crate::core::piece::{IndexBox, Interval, Piece};

/// Highest polynomial degree the solver can evaluate.
pub const MAX_DEGREE: u32 = 1;

#[derive(Debug, Clone)]
pub struct ObjectiveFunction {
    domain: DecisionDomain,
    pieces: Vec<Piece>,
    priority: f64,
    degree: u32,
    grid_cell: Option<Vec<u32>>,
    source: String,
}

impl ObjectiveFunction {
    /// Linear function over `domain`. Every piece must lie inside the
    /// domain's universe; disjointness is checked by `check_partition`.
    pub fn new(domain: DecisionDomain, pieces: Vec<Piece>) -> Result<Self, HelmError> {
        Self::with_degree(domain, pieces, MAX_DEGREE)
    }

    pub fn with_degree(domain: DecisionDomain, pieces: Vec<Piece>, degree: u32) -> Result<Self, HelmError> {
        if degree > MAX_DEGREE {
            return Err(HelmError::DegreeError(degree));
        }
        if domain.is_empty() {
            return Err(HelmError::DomainError("objective function has an empty domain".to_string()));
        }
        let universe = domain.universe();
        for piece in &pieces {
            if !universe.contains(piece.bounds()) {
                return Err(HelmError::ValidationError(format!(
                    "piece {:?} lies outside domain {}",
                    piece.bounds().intervals(),
                    domain
                )));
            }
            if degree == 0 && !piece.is_constant() {
                return Err(HelmError::ValidationError(
                    "degree-0 function carries a non-constant piece".to_string(),
                ));
            }
        }
        Ok(ObjectiveFunction {
            domain,
            pieces,
            priority: 100.0,
            degree,
            grid_cell: None,
            source: String::new(),
        })
    }

    /// Single-piece function with the same value everywhere.
    pub fn constant(domain: DecisionDomain, value: f64) -> Result<Self, HelmError> {
        let universe = domain.universe();
        Self::with_degree(domain, vec![Piece::constant(universe, value)], 0)
    }

    pub fn domain(&self) -> &DecisionDomain {
        &self.domain
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    pub fn size(&self) -> usize {
        self.pieces.len()
    }

    pub fn dim(&self) -> usize {
        self.domain.len()
    }

    pub fn degree(&self) -> u32 {
        self.degree
    }

    pub fn priority(&self) -> f64 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: f64) {
        self.priority = priority;
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn set_source(&mut self, source: &str) {
        self.source = source.to_string();
    }

    /// Cell edge lengths for the grid built over this function.
    pub fn grid_cell(&self) -> Option<&[u32]> {
        self.grid_cell.as_deref()
    }

    pub fn set_grid_cell(&mut self, cell: Option<Vec<u32>>) {
        self.grid_cell = cell;
    }

    pub fn piece_at(&self, point: &[u32]) -> Option<&Piece> {
        self.pieces.iter().find(|p| p.bounds().contains_point(point))
    }

    /// Value at an index point, or None when no piece covers it.
    pub fn eval(&self, point: &[u32]) -> Option<f64> {
        self.piece_at(point).map(|p| p.eval(point))
    }

    /// Value at a real-valued point, snapped to the nearest grid point.
    pub fn eval_values(&self, values: &[f64]) -> Option<f64> {
        let point = self.domain.point_of(values)?;
        self.eval(&point)
    }

    /// (min, max) over every piece's vertices.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.pieces.iter().fold(None, |acc, p| {
            let (lo, hi) = (p.min_value(), p.max_value());
            match acc {
                None => Some((lo, hi)),
                Some((a, b)) => Some((a.min(lo), b.max(hi))),
            }
        })
    }

    /// Linearly map the value range onto `[base, base + range]`.
    /// A flat function becomes the constant `base`.
    pub fn normalize(&mut self, base: f64, range: f64) {
        let Some((min, max)) = self.value_range() else {
            return;
        };
        let span = max - min;
        let dim = self.dim();
        for piece in &mut self.pieces {
            let coefs = piece.coefs_mut();
            if span <= 0.0 {
                coefs.iter_mut().for_each(|c| *c = 0.0);
                coefs[dim] = base;
                continue;
            }
            let scale = range / span;
            coefs.iter_mut().for_each(|c| *c *= scale);
            coefs[dim] += base - min * scale;
        }
    }

    pub fn apply_weight(&mut self, weight: f64) {
        for piece in &mut self.pieces {
            piece.coefs_mut().iter_mut().for_each(|c| *c *= weight);
        }
    }

    /// Best point over all pieces; ties go to the earliest piece.
    pub fn max_point(&self) -> Option<(Vec<u32>, f64)> {
        let mut best: Option<(Vec<u32>, f64)> = None;
        for piece in &self.pieces {
            let (value, point) = piece.argmax();
            if best.as_ref().is_none_or(|(_, b)| value > *b) {
                best = Some((point, value));
            }
        }
        best
    }

    /// Re-express this function over `joint`: axes are reordered to the
    /// joint order and missing variables are filled in as flat axes.
    pub fn expand_to(&self, joint: &DecisionDomain) -> Result<ObjectiveFunction, HelmError> {
        let mut source_axis = Vec::with_capacity(joint.len());
        for var in joint.vars() {
            match self.domain.index_of(var.name()) {
                Some(k) => {
                    let own = &self.domain.vars()[k];
                    if own != var {
                        return Err(HelmError::DomainMismatch(format!(
                            "variable '{}' is {},{},{} here but {},{},{} in the joint domain",
                            var.name(),
                            own.low(),
                            own.high(),
                            own.points(),
                            var.low(),
                            var.high(),
                            var.points()
                        )));
                    }
                    source_axis.push(Some(k));
                }
                None => source_axis.push(None),
            }
        }
        if let Some(extra) = self.domain.names().find(|n| !joint.has_var(n)) {
            return Err(HelmError::DomainMismatch(format!(
                "variable '{}' is not in the joint domain {}",
                extra, joint
            )));
        }

        let dim = self.dim();
        let mut pieces = Vec::with_capacity(self.pieces.len());
        for piece in &self.pieces {
            let mut intervals = Vec::with_capacity(joint.len());
            let mut coefs = Vec::with_capacity(joint.len() + 1);
            for (j, src) in source_axis.iter().enumerate() {
                match src {
                    Some(k) => {
                        intervals.push(piece.bounds().interval(*k));
                        coefs.push(piece.coefs()[*k]);
                    }
                    None => {
                        intervals.push(Interval::new(0, joint.vars()[j].points() - 1));
                        coefs.push(0.0);
                    }
                }
            }
            coefs.push(piece.coefs()[dim]);
            pieces.push(Piece::new(IndexBox::from_intervals(intervals), coefs)?);
        }

        let grid_cell = self.grid_cell.as_ref().map(|cell| {
            source_axis
                .iter()
                .enumerate()
                .map(|(j, src)| match src {
                    Some(k) => cell.get(*k).copied().unwrap_or(1),
                    None => joint.vars()[j].points(),
                })
                .collect()
        });

        let mut expanded = ObjectiveFunction::with_degree(joint.clone(), pieces, self.degree)?;
        expanded.priority = self.priority;
        expanded.grid_cell = grid_cell;
        expanded.source = self.source.clone();
        Ok(expanded)
    }

    /// Pointwise sum with `other`, which is first aligned (and, if it covers
    /// fewer variables, expanded) to this function's domain. The result keeps
    /// this function's priority and source.
    pub fn add(&self, other: &ObjectiveFunction) -> Result<ObjectiveFunction, HelmError> {
        if other.domain.names().any(|n| !self.domain.has_var(n)) {
            return Err(HelmError::DomainMismatch(format!(
                "cannot sum functions over {} and {}",
                self.domain, other.domain
            )));
        }
        let aligned = other.expand_to(&self.domain)?;
        let grid = aligned.build_grid();
        let mut pieces = Vec::new();
        for piece in &self.pieces {
            for ix in grid.candidates(piece.bounds()) {
                let theirs = &aligned.pieces[ix];
                if let Some(bounds) = piece.bounds().intersection(theirs.bounds()) {
                    let coefs = piece
                        .coefs()
                        .iter()
                        .zip(theirs.coefs())
                        .map(|(a, b)| a + b)
                        .collect();
                    pieces.push(Piece::new(bounds, coefs)?);
                }
            }
        }
        let mut sum = ObjectiveFunction::with_degree(
            self.domain.clone(),
            pieces,
            self.degree.max(other.degree),
        )?;
        sum.priority = self.priority;
        sum.grid_cell = self.grid_cell.clone();
        sum.source = self.source.clone();
        Ok(sum)
    }

    pub fn build_grid(&self) -> Grid<'_> {
        Grid::build(self)
    }

    /// Verify the pieces are pairwise disjoint and cover the universe.
    pub fn check_partition(&self) -> Result<(), HelmError> {
        for (i, a) in self.pieces.iter().enumerate() {
            if let Some(j) = self.pieces[i + 1..]
                .iter()
                .position(|b| a.bounds().intersects(b.bounds()))
            {
                return Err(HelmError::ValidationError(format!(
                    "pieces {} and {} overlap",
                    i,
                    i + 1 + j
                )));
            }
        }
        let covered: u64 = self.pieces.iter().map(|p| p.bounds().size()).sum();
        if covered != self.domain.total_points() {
            return Err(HelmError::ValidationError(format!(
                "pieces cover {} of {} points",
                covered,
                self.domain.total_points()
            )));
        }
        Ok(())
    }

    /// Mean piece size in index points.
    pub fn piece_avg(&self) -> f64 {
        if self.pieces.is_empty() {
            return 0.0;
        }
        self.pieces.iter().map(|p| p.bounds().size() as f64).sum::<f64>() / self.pieces.len() as f64
    }

    pub(crate) fn retain_pieces(&mut self, keep: impl FnMut(&Piece) -> bool) {
        self.pieces.retain(keep);
    }
}
