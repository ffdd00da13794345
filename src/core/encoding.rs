//! Text encoding of objective functions and whole problems.
//!
//! A function is one line of `#`-separated `key=value` fields:
//!
//! ```text
//! domain=x,0,99,100#pwt=100#degree=1#src=hdg#grid=10#piece=0,49/1,0#piece=50,99/-1,100
//! ```
//!
//! Each `piece` lists `lo,hi` per axis, then `/`, then one slope per axis and
//! the intercept. Numbers use the shortest form that parses back exactly.
//!
//! A problem file holds one `domain = ...` line and any number of
//! `ipf = ...` lines; `//` starts a comment.

use crate::core::domain::DecisionDomain;
use crate::core::error::HelmError;
use crate::core::function::ObjectiveFunction;
use crate::core::piece::{IndexBox, Piece};
use crate::core::solver::Problem;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use tracing::debug;

pub fn encode_function(function: &ObjectiveFunction) -> String {
    let mut fields = vec![
        format!("domain={}", function.domain()),
        format!("pwt={}", function.priority()),
        format!("degree={}", function.degree()),
    ];
    if !function.source().is_empty() {
        fields.push(format!("src={}", function.source().replace(['#', '='], "_")));
    }
    if let Some(cell) = function.grid_cell() {
        fields.push(format!("grid={}", join(cell.iter())));
    }
    for piece in function.pieces() {
        let bounds = piece
            .bounds()
            .intervals()
            .iter()
            .map(|iv| format!("{},{}", iv.lo, iv.hi))
            .collect::<Vec<_>>()
            .join(",");
        fields.push(format!("piece={}/{}", bounds, join(piece.coefs().iter())));
    }
    fields.join("#")
}

pub fn decode_function(text: &str) -> Result<ObjectiveFunction, HelmError> {
    let mut domain: Option<DecisionDomain> = None;
    let mut priority = 100.0;
    let mut degree = 1u32;
    let mut source = String::new();
    let mut grid: Option<Vec<u32>> = None;
    let mut raw_pieces: Vec<&str> = Vec::new();

    for field in text.trim().split('#').filter(|f| !f.trim().is_empty()) {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| HelmError::EncodingError(format!("field '{}' has no '='", field)))?;
        match key.trim() {
            "domain" => domain = Some(value.parse()?),
            "pwt" => priority = parse_num(value, "pwt")?,
            "degree" => {
                degree = value
                    .trim()
                    .parse()
                    .map_err(|_| HelmError::EncodingError(format!("bad degree '{}'", value)))?
            }
            "src" => source = value.trim().to_string(),
            "grid" => grid = Some(parse_list::<u32>(value, "grid")?),
            "piece" => raw_pieces.push(value),
            other => {
                return Err(HelmError::EncodingError(format!("unknown field '{}'", other)));
            }
        }
    }

    let domain = domain.ok_or_else(|| HelmError::EncodingError("missing domain field".to_string()))?;
    if degree > crate::core::function::MAX_DEGREE {
        return Err(HelmError::DegreeError(degree));
    }
    let dim = domain.len();
    let mut pieces = Vec::with_capacity(raw_pieces.len());
    for raw in raw_pieces {
        let (bounds, coefs) = raw
            .split_once('/')
            .ok_or_else(|| HelmError::EncodingError(format!("piece '{}' has no '/'", raw)))?;
        let bounds = parse_list::<u32>(bounds, "piece bounds")?;
        let coefs = parse_list::<f64>(coefs, "piece coefficients")?;
        if bounds.len() != dim * 2 {
            return Err(HelmError::EncodingError(format!(
                "piece '{}' has {} bounds for {} axes",
                raw,
                bounds.len(),
                dim
            )));
        }
        let pairs: Vec<(u32, u32)> = bounds.chunks(2).map(|c| (c[0], c[1])).collect();
        pieces.push(Piece::new(IndexBox::new(&pairs)?, coefs)?);
    }

    let mut function = ObjectiveFunction::with_degree(domain, pieces, degree)?;
    function.set_priority(priority);
    function.set_source(&source);
    function.set_grid_cell(grid);
    Ok(function)
}

/// Split an encoding into `id,index,total,payload` chunks of at most
/// `max_payload` characters of payload each (index starts at 1).
pub fn encode_chunks(text: &str, id: &str, max_payload: usize) -> Vec<String> {
    let max_payload = max_payload.max(1);
    let chars: Vec<char> = text.chars().collect();
    let parts: Vec<String> = if chars.is_empty() {
        vec![String::new()]
    } else {
        chars.chunks(max_payload).map(|c| c.iter().collect()).collect()
    };
    let total = parts.len();
    parts
        .into_iter()
        .enumerate()
        .map(|(i, payload)| format!("{},{},{},{}", id, i + 1, total, payload))
        .collect()
}

/// Largest chunk count accepted for one id.
pub const MAX_CHUNKS: usize = 10_000;

/// Incomplete ids kept before the oldest is dropped.
pub const MAX_PENDING_IDS: usize = 64;

/// Reassembles chunks produced by `encode_chunks`, in any arrival order.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    pending: FxHashMap<String, Vec<Option<String>>>,
    arrival: VecDeque<String>,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the full text once every chunk of its id has arrived.
    pub fn push(&mut self, chunk: &str) -> Result<Option<String>, HelmError> {
        let mut fields = chunk.splitn(4, ',');
        let (Some(id), Some(index), Some(total), Some(payload)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(HelmError::EncodingError(format!("malformed chunk '{}'", chunk)));
        };
        let index: usize = index
            .parse()
            .map_err(|_| HelmError::EncodingError(format!("bad chunk index '{}'", index)))?;
        let total: usize = total
            .parse()
            .map_err(|_| HelmError::EncodingError(format!("bad chunk total '{}'", total)))?;
        if total == 0 || index == 0 || index > total {
            return Err(HelmError::EncodingError(format!(
                "chunk {} of {} is out of range",
                index, total
            )));
        }
        if total > MAX_CHUNKS {
            return Err(HelmError::EncodingError(format!(
                "chunk total {} exceeds limit of {}",
                total, MAX_CHUNKS
            )));
        }
        // A new total for a known id starts a fresh message.
        if self.pending.get(id).is_some_and(|slots| slots.len() != total) {
            debug!(id, total, "chunked message superseded");
            self.forget(id);
        }
        if !self.pending.contains_key(id) {
            while self.arrival.len() >= MAX_PENDING_IDS {
                let Some(oldest) = self.arrival.pop_front() else { break };
                debug!(id = %oldest, "dropping incomplete chunked message");
                self.pending.remove(&oldest);
            }
            self.pending.insert(id.to_string(), vec![None; total]);
            self.arrival.push_back(id.to_string());
        }
        let Some(slots) = self.pending.get_mut(id) else {
            return Ok(None);
        };
        slots[index - 1] = Some(payload.to_string());
        if slots.iter().all(Option::is_some) {
            let text = self.forget(id).into_iter().flatten().collect();
            return Ok(Some(text));
        }
        Ok(None)
    }

    fn forget(&mut self, id: &str) -> Vec<Option<String>> {
        self.arrival.retain(|pending| pending != id);
        self.pending.remove(id).unwrap_or_default()
    }

    pub fn pending_ids(&self) -> usize {
        self.pending.len()
    }
}

/// Render a problem file.
pub fn write_problem(domain: &DecisionDomain, functions: &[ObjectiveFunction]) -> String {
    let mut out = format!("domain = {}\n", domain);
    for f in functions {
        out.push_str("ipf = ");
        out.push_str(&encode_function(f));
        out.push('\n');
    }
    out
}

/// Parse a problem file into a `Problem` whose functions are added (and
/// weighted) in file order and aligned to the declared domain.
pub fn parse_problem(text: &str) -> Result<Problem, HelmError> {
    let mut domain: Option<DecisionDomain> = None;
    let mut functions = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.split("//").next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            HelmError::EncodingError(format!("line {}: expected key = value", lineno + 1))
        })?;
        match key.trim().to_ascii_lowercase().as_str() {
            "domain" => domain = Some(value.trim().parse()?),
            "ipf" => functions.push(decode_function(value.trim())?),
            other => {
                return Err(HelmError::EncodingError(format!(
                    "line {}: unknown key '{}'",
                    lineno + 1,
                    other
                )));
            }
        }
    }
    let domain = match domain {
        Some(d) => d,
        None => functions
            .first()
            .map(|f| f.domain().clone())
            .ok_or_else(|| HelmError::EncodingError("problem has no domain".to_string()))?,
    };
    let mut problem = Problem::new(domain);
    for f in functions {
        problem.add_function(f);
    }
    problem.align_functions()?;
    Ok(problem)
}

fn join<T: ToString>(items: impl Iterator<Item = T>) -> String {
    items.map(|x| x.to_string()).collect::<Vec<_>>().join(",")
}

fn parse_num(raw: &str, what: &str) -> Result<f64, HelmError> {
    raw.trim()
        .parse()
        .map_err(|_| HelmError::EncodingError(format!("bad {} '{}'", what, raw)))
}

fn parse_list<T: std::str::FromStr>(raw: &str, what: &str) -> Result<Vec<T>, HelmError> {
    raw.split(',')
        .map(|x| {
            x.trim()
                .parse()
                .map_err(|_| HelmError::EncodingError(format!("bad {} entry '{}'", what, x)))
        })
        .collect()
}
