//! Hierarchical modes.
//!
//! Declarations sharing a parent are siblings. Each cycle the first sibling
//! whose conditions all hold is chosen; if none holds, the first sibling
//! declaring an `else` name yields that name instead. Evaluation then
//! descends into the children of the chosen name. The result is the chosen
//! names joined with `:`, e.g. `ACTIVE:SURVEYING`.

use crate::core::config::ModeDecl;
use crate::core::error::HelmError;
use crate::core::info::InfoBuffer;
use crate::plugins::condition::{LogicCondition, all_hold};

#[derive(Debug, Clone)]
struct ModeEntry {
    name: String,
    parent: Option<String>,
    conditions: Vec<LogicCondition>,
    else_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModeSet {
    entries: Vec<ModeEntry>,
}

impl ModeSet {
    pub fn from_decls(decls: &[ModeDecl]) -> Result<ModeSet, HelmError> {
        let mut entries = Vec::with_capacity(decls.len());
        for decl in decls {
            if decl.name.trim().is_empty() {
                return Err(HelmError::ConfigError("mode declared without a name".to_string()));
            }
            let conditions = decl
                .conditions
                .iter()
                .map(|c| LogicCondition::parse(c))
                .collect::<Result<Vec<_>, _>>()?;
            entries.push(ModeEntry {
                name: decl.name.clone(),
                parent: decl.parent.clone().filter(|p| !p.is_empty()),
                conditions,
                else_name: decl.else_name.clone().filter(|e| !e.is_empty()),
            });
        }
        Ok(ModeSet { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The mode string for the current buffer; empty when nothing applies.
    pub fn evaluate(&self, info: &InfoBuffer) -> String {
        let mut path: Vec<String> = Vec::new();
        let mut parent: Option<String> = None;
        // Depth never exceeds the number of declarations; anything deeper is a cycle.
        for _ in 0..=self.entries.len() {
            let Some(chosen) = self.choose(parent.as_deref(), info) else {
                break;
            };
            if path.contains(&chosen) {
                break;
            }
            path.push(chosen.clone());
            parent = Some(chosen);
        }
        path.join(":")
    }

    fn choose(&self, parent: Option<&str>, info: &InfoBuffer) -> Option<String> {
        let siblings: Vec<&ModeEntry> = self
            .entries
            .iter()
            .filter(|e| e.parent.as_deref() == parent)
            .collect();
        if let Some(hit) = siblings.iter().find(|e| all_hold(&e.conditions, info)) {
            return Some(hit.name.clone());
        }
        siblings.iter().find_map(|e| e.else_name.clone())
    }

    /// One line per declaration, as published in `IVPHELM_MODESET`.
    pub fn describe(&self) -> String {
        self.entries
            .iter()
            .map(|e| {
                let conds = e
                    .conditions
                    .iter()
                    .map(LogicCondition::raw)
                    .collect::<Vec<_>>()
                    .join(" and ");
                format!(
                    "name={},parent={},conditions={},else={}",
                    e.name,
                    e.parent.as_deref().unwrap_or(""),
                    conds,
                    e.else_name.as_deref().unwrap_or("")
                )
            })
            .collect::<Vec<_>>()
            .join("#")
    }
}

/// True when `current` is `predicate` or lies beneath it.
pub fn mode_matches(current: &str, predicate: &str) -> bool {
    current == predicate
        || current
            .strip_prefix(predicate)
            .is_some_and(|rest| rest.starts_with(':'))
}
