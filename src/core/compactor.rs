//! Feasibility filters applied around the search.
//!
//! A compactor sees every piece before the grids are built and may veto it,
//! and it gets the final word on each leaf the search reaches.

use crate::core::piece::{IndexBox, Piece, affine_argmax};

pub trait Compactor {
    /// False removes the piece from the search entirely.
    fn admits(&self, _piece: &Piece) -> bool {
        true
    }

    /// Best feasible (value, point) inside a leaf box carrying the summed
    /// linear form `coefs`, or None when nothing in the box is feasible.
    fn leaf_value(&self, bounds: &IndexBox, coefs: &[f64]) -> Option<(f64, Vec<u32>)> {
        Some(affine_argmax(coefs, bounds))
    }
}

/// Accepts everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCompactor;

impl Compactor for NullCompactor {}

/// Forbids every point inside a set of boxes. Pieces lying wholly inside a
/// forbidden box are dropped up front; leaves that only partly overlap one
/// fall back to the best point left after carving the forbidden boxes out.
#[derive(Debug, Default, Clone)]
pub struct ExclusionCompactor {
    forbidden: Vec<IndexBox>,
}

impl ExclusionCompactor {
    pub fn new(forbidden: Vec<IndexBox>) -> Self {
        ExclusionCompactor { forbidden }
    }

    fn is_forbidden(&self, point: &[u32]) -> bool {
        self.forbidden.iter().any(|b| b.contains_point(point))
    }
}

impl Compactor for ExclusionCompactor {
    fn admits(&self, piece: &Piece) -> bool {
        !self.forbidden.iter().any(|b| b.contains(piece.bounds()))
    }

    fn leaf_value(&self, bounds: &IndexBox, coefs: &[f64]) -> Option<(f64, Vec<u32>)> {
        let (value, point) = affine_argmax(coefs, bounds);
        if !self.is_forbidden(&point) {
            return Some((value, point));
        }
        // Carve every forbidden box out of the leaf; an affine function
        // peaks at a corner of each remaining part.
        let mut admissible = vec![bounds.clone()];
        for hole in &self.forbidden {
            admissible = admissible.iter().flat_map(|part| part.subtract(hole)).collect();
            if admissible.is_empty() {
                return None;
            }
        }
        admissible
            .iter()
            .map(|part| affine_argmax(coefs, part))
            .fold(None, |best: Option<(f64, Vec<u32>)>, cand| match best {
                Some(b) if b.0 >= cand.0 => Some(b),
                _ => Some(cand),
            })
    }
}
