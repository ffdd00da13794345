//! Branch-and-bound search for the joint maximum of weighted objective
//! functions.
//!
//! The search walks the functions in priority order. Depth `L` of the tree
//! holds one `SearchNode`: the intersection of one piece from each of the
//! first `L` functions, plus the sum of their linear forms. Descending picks
//! a piece of function `L` that intersects the node. A branch is abandoned
//! when the node's own best value plus the grid bounds of the functions not
//! yet consumed cannot beat the incumbent by more than epsilon.
//!
//! Nodes live in a `Vec` sized once per solve and are overwritten in place
//! as siblings are visited.

use crate::core::compactor::{Compactor, NullCompactor};
use crate::core::domain::DecisionDomain;
use crate::core::error::HelmError;
use crate::core::function::ObjectiveFunction;
use crate::core::grid::Grid;
use crate::core::piece::{IndexBox, affine_max};
use serde::Serialize;
use tracing::debug;

/// Functions whose value range exceeds this are normalized before weighting.
pub const NORMALIZE_SPAN: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    pub point: Vec<u32>,
    pub value: f64,
}

impl Solution {
    /// `(name, value)` for every variable of `domain`.
    pub fn values(&self, domain: &DecisionDomain) -> Vec<(String, f64)> {
        domain
            .vars()
            .iter()
            .zip(&self.point)
            .filter_map(|(v, j)| v.value(*j).map(|x| (v.name().to_string(), x)))
            .collect()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SolveStats {
    pub nodes_expanded: u64,
    pub leaves_visited: u64,
    pub bound_prunes: u64,
    pub empty_intersections: u64,
}

pub struct Problem {
    domain: DecisionDomain,
    functions: Vec<ObjectiveFunction>,
    compactor: Box<dyn Compactor>,
    thresh: f64,
    epsilon: f64,
    full_tree: bool,
    seed: Option<Vec<u32>>,
    seed_from_priority: bool,
    solution: Option<Solution>,
    stats: SolveStats,
}

impl Problem {
    pub fn new(domain: DecisionDomain) -> Self {
        Problem {
            domain,
            functions: Vec::new(),
            compactor: Box::new(NullCompactor),
            thresh: 100.0,
            epsilon: 0.0,
            full_tree: false,
            seed: None,
            seed_from_priority: false,
            solution: None,
            stats: SolveStats::default(),
        }
    }

    pub fn with_compactor(mut self, compactor: Box<dyn Compactor>) -> Self {
        self.compactor = compactor;
        self
    }

    pub fn domain(&self) -> &DecisionDomain {
        &self.domain
    }

    /// Take ownership of a function. Functions with priority `<= 0` are
    /// dropped (returns false). A value range wider than 100 is first
    /// normalized to `[0, 100]`; then the priority is folded into the values.
    pub fn add_function(&mut self, mut function: ObjectiveFunction) -> bool {
        let priority = function.priority();
        if priority <= 0.0 {
            return false;
        }
        if let Some((lo, hi)) = function.value_range()
            && hi - lo > NORMALIZE_SPAN
        {
            function.normalize(0.0, NORMALIZE_SPAN);
        }
        function.apply_weight(priority);
        self.functions.push(function);
        true
    }

    pub fn functions(&self) -> &[ObjectiveFunction] {
        &self.functions
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Expand every function onto the problem domain (reordering axes and
    /// filling missing ones).
    pub fn align_functions(&mut self) -> Result<(), HelmError> {
        for f in &mut self.functions {
            if f.domain() != &self.domain {
                *f = f.expand_to(&self.domain)?;
            }
        }
        Ok(())
    }

    /// Every function must be expressed over exactly the problem domain.
    pub fn universes_in_sync(&self) -> Result<(), HelmError> {
        for f in &self.functions {
            if f.domain() != &self.domain {
                return Err(HelmError::UniverseMismatch(format!(
                    "function from '{}' is over {} but the problem is over {}",
                    f.source(),
                    f.domain(),
                    self.domain
                )));
            }
        }
        Ok(())
    }

    /// Accept a solution within `thresh` percent of optimal. Must lie in
    /// (0, 100]; larger values clip to 100.
    pub fn set_thresh(&mut self, thresh: f64) -> Result<(), HelmError> {
        if !(thresh > 0.0) {
            return Err(HelmError::ConfigError(format!(
                "solver threshold must be in (0, 100], got {}",
                thresh
            )));
        }
        self.thresh = thresh.min(100.0);
        Ok(())
    }

    pub fn thresh(&self) -> f64 {
        self.thresh
    }

    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon.max(0.0);
    }

    /// Visit every combination of intersecting pieces, with no bound pruning.
    pub fn set_full_tree(&mut self, full_tree: bool) {
        self.full_tree = full_tree;
    }

    /// Evaluate `point` before searching; it becomes the first incumbent if
    /// every function covers it.
    pub fn set_seed(&mut self, point: Vec<u32>) {
        self.seed = Some(point);
    }

    /// Seed with the best point of the highest-priority function.
    pub fn set_seed_from_priority(&mut self, enabled: bool) {
        self.seed_from_priority = enabled;
    }

    /// Stable sort, highest priority first.
    pub fn sort_by_priority(&mut self) {
        self.functions
            .sort_by(|a, b| b.priority().total_cmp(&a.priority()));
    }

    pub fn solve(&mut self) -> Result<Solution, HelmError> {
        self.solution = None;
        self.stats = SolveStats::default();
        if self.functions.is_empty() {
            return Err(HelmError::NothingToDecide);
        }
        self.universes_in_sync()?;
        self.sort_by_priority();

        let compactor = &*self.compactor;
        for f in &mut self.functions {
            f.retain_pieces(|p| compactor.admits(p));
        }

        let seed = match (&self.seed, self.seed_from_priority) {
            (Some(point), _) => Some(point.clone()),
            (None, true) => self.functions[0].max_point().map(|(p, _)| p),
            (None, false) => None,
        };

        let (incumbent, stats) = {
            let mut search = Search::new(
                &self.functions,
                &self.domain,
                compactor,
                self.thresh,
                self.epsilon,
                self.full_tree,
            );
            if let Some(point) = seed {
                search.try_seed(&point);
            }
            search.descend(0);
            (search.incumbent, search.stats)
        };

        self.stats = stats;
        debug!(
            functions = self.functions.len(),
            nodes = stats.nodes_expanded,
            leaves = stats.leaves_visited,
            prunes = stats.bound_prunes,
            "solve finished"
        );
        let solution = incumbent
            .ok_or_else(|| HelmError::NotFound("feasible point in the decision space".to_string()))?;
        self.solution = Some(solution.clone());
        Ok(solution)
    }

    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }

    /// Solved value of one variable.
    pub fn result(&self, name: &str) -> Option<f64> {
        let ix = self.domain.index_of(name)?;
        let solution = self.solution.as_ref()?;
        self.domain.value(ix, *solution.point.get(ix)?)
    }

    pub fn stats(&self) -> SolveStats {
        self.stats
    }

    /// Mean piece size over all functions.
    pub fn piece_avg(&self) -> f64 {
        if self.functions.is_empty() {
            return 0.0;
        }
        self.functions.iter().map(ObjectiveFunction::piece_avg).sum::<f64>() / self.functions.len() as f64
    }
}

#[derive(Debug, Clone)]
struct SearchNode {
    bounds: IndexBox,
    coefs: Vec<f64>,
}

struct Search<'p> {
    functions: &'p [ObjectiveFunction],
    grids: Vec<Grid<'p>>,
    compactor: &'p dyn Compactor,
    nodes: Vec<SearchNode>,
    incumbent: Option<Solution>,
    thresh: f64,
    base_epsilon: f64,
    epsilon: f64,
    full_tree: bool,
    stats: SolveStats,
}

impl<'p> Search<'p> {
    fn new(
        functions: &'p [ObjectiveFunction],
        domain: &DecisionDomain,
        compactor: &'p dyn Compactor,
        thresh: f64,
        epsilon: f64,
        full_tree: bool,
    ) -> Self {
        let root = SearchNode {
            bounds: domain.universe(),
            coefs: vec![0.0; domain.len() + 1],
        };
        Search {
            functions,
            grids: functions.iter().map(Grid::build).collect(),
            compactor,
            nodes: vec![root; functions.len() + 1],
            incumbent: None,
            thresh,
            base_epsilon: epsilon,
            epsilon,
            full_tree,
            stats: SolveStats::default(),
        }
    }

    fn try_seed(&mut self, point: &[u32]) {
        if point.len() != self.nodes[0].bounds.dim() {
            return;
        }
        let mut total = 0.0;
        for f in self.functions {
            match f.eval(point) {
                Some(v) => total += v,
                None => return,
            }
        }
        let mut coefs = vec![0.0; point.len()];
        coefs.push(total);
        if let Some((value, point)) = self.compactor.leaf_value(&IndexBox::point(point), &coefs) {
            self.record(point, value);
        }
    }

    fn descend(&mut self, level: usize) {
        if level == self.functions.len() {
            self.stats.leaves_visited += 1;
            let node = &self.nodes[level];
            let leaf = self.compactor.leaf_value(&node.bounds, &node.coefs);
            if let Some((value, point)) = leaf
                && self.incumbent.as_ref().is_none_or(|s| value > s.value)
            {
                self.record(point, value);
            }
            return;
        }

        self.stats.nodes_expanded += 1;
        let functions = self.functions;
        let candidates = self.grids[level].candidates(&self.nodes[level].bounds);
        for ix in candidates {
            let piece = &functions[level].pieces()[ix];
            let (head, tail) = self.nodes.split_at_mut(level + 1);
            let (parent, child) = (&head[level], &mut tail[0]);
            if !parent.bounds.intersect_into(piece.bounds(), &mut child.bounds) {
                self.stats.empty_intersections += 1;
                continue;
            }
            for ((c, p), q) in child.coefs.iter_mut().zip(&parent.coefs).zip(piece.coefs()) {
                *c = p + q;
            }
            if !self.full_tree
                && let Some(best) = &self.incumbent
                && self.upper_bound(level + 1) <= best.value + self.epsilon
            {
                self.stats.bound_prunes += 1;
                continue;
            }
            self.descend(level + 1);
        }
    }

    /// Node's own best plus the cheap bounds of every unconsumed function.
    fn upper_bound(&self, level: usize) -> f64 {
        let node = &self.nodes[level];
        affine_max(&node.coefs, &node.bounds)
            + self.grids[level..]
                .iter()
                .map(|g| g.cheap_bound(&node.bounds))
                .sum::<f64>()
    }

    fn record(&mut self, point: Vec<u32>, value: f64) {
        if self.thresh < 100.0 {
            let slack = (100.0 / self.thresh) * value - value;
            self.epsilon = self.base_epsilon.max(slack);
        }
        self.incumbent = Some(Solution { point, value });
    }
}
