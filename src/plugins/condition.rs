//! Logic conditions over the info buffer.
//!
//! A condition is a disjunction of conjunctions of comparisons:
//! `DEPLOY = true and DEPTH > 10 or RETURN != false`. A comparison against a
//! variable the buffer has never seen is false. Numeric comparison is used
//! when both sides are numbers; otherwise strings compare case-insensitively
//! and only `=`/`==`/`!=` are meaningful.

use crate::core::error::HelmError;
use crate::core::info::{InfoBuffer, InfoValue};
use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn parse(op: &str) -> Option<CompareOp> {
        match op {
            "=" | "==" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::Ne),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            _ => None,
        }
    }

    fn holds(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => ord == Equal,
            CompareOp::Ne => ord != Equal,
            CompareOp::Lt => ord == Less,
            CompareOp::Le => ord != Greater,
            CompareOp::Gt => ord == Greater,
            CompareOp::Ge => ord != Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Comparison {
    var: String,
    op: CompareOp,
    rhs: InfoValue,
}

impl Comparison {
    fn eval(&self, info: &InfoBuffer) -> bool {
        let Some(lhs) = info.value(&self.var) else {
            return false;
        };
        match (lhs, &self.rhs) {
            (InfoValue::Num(a), InfoValue::Num(b)) => match a.partial_cmp(b) {
                Some(ord) => self.op.holds(ord),
                None => false,
            },
            (a, b) => {
                let a = a.to_string().to_ascii_lowercase();
                let b = b.to_string().to_ascii_lowercase();
                match self.op {
                    CompareOp::Eq => a == b,
                    CompareOp::Ne => a != b,
                    op => op.holds(a.cmp(&b)),
                }
            }
        }
    }
}

static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*(==|!=|<=|>=|=|<|>)\s*(.+?)\s*$")
        .expect("static regex")
});

#[derive(Debug, Clone, PartialEq)]
pub struct LogicCondition {
    raw: String,
    any_of: Vec<Vec<Comparison>>,
}

impl LogicCondition {
    pub fn parse(text: &str) -> Result<LogicCondition, HelmError> {
        let mut any_of = Vec::new();
        for clause in split_word(text, "or") {
            let mut all_of = Vec::new();
            for term in split_word(&clause, "and") {
                let caps = COMPARISON.captures(&term).ok_or_else(|| {
                    HelmError::ConfigError(format!("malformed condition '{}'", text.trim()))
                })?;
                let op = CompareOp::parse(&caps[2])
                    .ok_or_else(|| HelmError::ConfigError(format!("bad operator in '{}'", term)))?;
                let rhs = caps[3].trim_matches('"');
                all_of.push(Comparison {
                    var: caps[1].to_string(),
                    op,
                    rhs: InfoValue::parse(rhs),
                });
            }
            any_of.push(all_of);
        }
        if any_of.is_empty() {
            return Err(HelmError::ConfigError("empty condition".to_string()));
        }
        Ok(LogicCondition {
            raw: text.trim().to_string(),
            any_of,
        })
    }

    pub fn eval(&self, info: &InfoBuffer) -> bool {
        self.any_of
            .iter()
            .any(|all_of| all_of.iter().all(|c| c.eval(info)))
    }

    /// Variables this condition reads.
    pub fn vars(&self) -> Vec<&str> {
        let mut vars: Vec<&str> = self
            .any_of
            .iter()
            .flatten()
            .map(|c| c.var.as_str())
            .collect();
        vars.sort_unstable();
        vars.dedup();
        vars
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Split on a whole-word keyword, case-insensitive.
fn split_word(text: &str, word: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for token in text.split_whitespace() {
        if token.eq_ignore_ascii_case(word) {
            parts.push(current.join(" "));
            current.clear();
        } else {
            current.push(token);
        }
    }
    parts.push(current.join(" "));
    parts.retain(|p| !p.trim().is_empty());
    parts
}

/// True when every condition holds.
pub fn all_hold(conditions: &[LogicCondition], info: &InfoBuffer) -> bool {
    conditions.iter().all(|c| c.eval(info))
}
