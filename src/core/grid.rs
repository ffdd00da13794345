//! Uniform spatial index over one function's pieces.
//!
//! The universe is cut into equal cells. Each cell lists the pieces touching
//! it and the best value any of them reaches inside the cell, which gives a
//! cheap upper bound for any query box: the max over the cells it touches.
//! A larger box touches a superset of cells, so the bound is monotone.

use crate::core::function::ObjectiveFunction;
use crate::core::piece::{IndexBox, Interval, Piece, affine_max};

/// Target number of cells along each axis, indexed by dimension count.
const CELLS_PER_AXIS: [u32; 5] = [1, 64, 24, 10, 6];

#[derive(Debug, Clone)]
struct Cell {
    pieces: Vec<usize>,
    max_value: f64,
}

#[derive(Debug, Clone)]
pub struct Grid<'f> {
    pieces: &'f [Piece],
    universe: IndexBox,
    edge: Vec<u32>,
    counts: Vec<u32>,
    cells: Vec<Cell>,
}

impl<'f> Grid<'f> {
    pub fn build(function: &'f ObjectiveFunction) -> Grid<'f> {
        let universe = function.domain().universe();
        let edge = match function.grid_cell() {
            Some(cell) if cell.len() == universe.dim() => cell.iter().map(|e| (*e).max(1)).collect(),
            _ => default_edge(&universe),
        };
        Self::with_edge(universe, function.pieces(), edge)
    }

    pub fn with_edge(universe: IndexBox, pieces: &'f [Piece], edge: Vec<u32>) -> Grid<'f> {
        let counts: Vec<u32> = universe
            .intervals()
            .iter()
            .zip(&edge)
            .map(|(iv, e)| iv.width().div_ceil(*e))
            .collect();
        let total = counts.iter().map(|c| *c as usize).product::<usize>();
        let mut grid = Grid {
            pieces,
            universe,
            edge,
            counts,
            cells: vec![
                Cell {
                    pieces: Vec::new(),
                    max_value: f64::NEG_INFINITY,
                };
                total
            ],
        };
        let mut scratch = IndexBox::default();
        for (ix, piece) in pieces.iter().enumerate() {
            let Some(ranges) = grid.cell_ranges(piece.bounds()) else {
                continue;
            };
            for cell_ix in grid.cell_indices(&ranges) {
                let cell_box = grid.cell_box(cell_ix);
                if piece.bounds().intersect_into(&cell_box, &mut scratch) {
                    let cell = &mut grid.cells[cell_ix];
                    cell.pieces.push(ix);
                    cell.max_value = cell.max_value.max(affine_max(piece.coefs(), &scratch));
                }
            }
        }
        grid
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn edge(&self) -> &[u32] {
        &self.edge
    }

    /// Indices of pieces whose box intersects `query`, ascending.
    pub fn candidates(&self, query: &IndexBox) -> Vec<usize> {
        let Some(ranges) = self.cell_ranges(query) else {
            return Vec::new();
        };
        let mut out: Vec<usize> = self
            .cell_indices(&ranges)
            .into_iter()
            .flat_map(|c| self.cells[c].pieces.iter().copied())
            .filter(|ix| self.pieces[*ix].bounds().intersects(query))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Upper bound on the function over `query`. Negative infinity when no
    /// piece can reach the box.
    pub fn cheap_bound(&self, query: &IndexBox) -> f64 {
        let Some(ranges) = self.cell_ranges(query) else {
            return f64::NEG_INFINITY;
        };
        self.cell_indices(&ranges)
            .into_iter()
            .map(|c| self.cells[c].max_value)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Per-axis inclusive cell-coordinate ranges touched by `query`.
    fn cell_ranges(&self, query: &IndexBox) -> Option<Vec<Interval>> {
        if query.dim() != self.universe.dim() {
            return None;
        }
        let clipped = query.intersection(&self.universe)?;
        Some(
            clipped
                .intervals()
                .iter()
                .zip(self.universe.intervals())
                .zip(&self.edge)
                .map(|((q, u), e)| Interval::new((q.lo - u.lo) / e, (q.hi - u.lo) / e))
                .collect(),
        )
    }

    /// Flat cell indices in row-major order (last axis fastest).
    fn cell_indices(&self, ranges: &[Interval]) -> Vec<usize> {
        let mut out = vec![0usize];
        for (d, r) in ranges.iter().enumerate() {
            let stride = self.counts[d + 1..].iter().map(|c| *c as usize).product::<usize>();
            let mut next = Vec::with_capacity(out.len() * r.width() as usize);
            for base in &out {
                for c in r.lo..=r.hi {
                    next.push(base + c as usize * stride);
                }
            }
            out = next;
        }
        out
    }

    fn cell_box(&self, flat: usize) -> IndexBox {
        let mut rem = flat;
        let mut intervals = vec![Interval::new(0, 0); self.counts.len()];
        for d in (0..self.counts.len()).rev() {
            let c = (rem % self.counts[d] as usize) as u32;
            rem /= self.counts[d] as usize;
            let u = self.universe.interval(d);
            let lo = u.lo + c * self.edge[d];
            intervals[d] = Interval::new(lo, (lo + self.edge[d] - 1).min(u.hi));
        }
        IndexBox::from_intervals(intervals)
    }
}

fn default_edge(universe: &IndexBox) -> Vec<u32> {
    let per_axis = CELLS_PER_AXIS
        .get(universe.dim())
        .copied()
        .unwrap_or(4);
    universe
        .intervals()
        .iter()
        .map(|iv| iv.width().div_ceil(per_axis).max(1))
        .collect()
}
