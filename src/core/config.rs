//! Helm configuration loaded from TOML.
//!
//! ```toml
//! domain = ["course:0:359:360", "speed:0:4:delta=0.1"]
//!
//! [helm]
//! ok_skew = "any"
//! standby = 5.0
//! behavior_files = ["survey.toml"]
//!
//! [[modes]]
//! name = "ACTIVE"
//! conditions = ["DEPLOY = true"]
//! else = "INACTIVE"
//!
//! [[behaviors]]
//! kind = "peak"
//! name = "hold_heading"
//! mode = "ACTIVE"
//! [behaviors.params]
//! var = "course"
//! summit = 90
//! ```
//!
//! Behavior files hold their own `[[modes]]` and `[[behaviors]]` tables and
//! are resolved relative to the main file.
//!
//! Only TOML syntax errors fail a parse. A section or entry that does not
//! fit its shape is skipped and recorded in `warnings`, which the helm
//! treats as a malconfiguration.

use crate::core::domain::DecisionDomain;
use crate::core::error::HelmError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HelmConfig {
    #[serde(default)]
    pub helm: HelmSettings,
    #[serde(default)]
    pub domain: Vec<DomainDecl>,
    #[serde(default)]
    pub modes: Vec<ModeDecl>,
    #[serde(default)]
    pub behaviors: Vec<BehaviorDecl>,
    /// Sections and entries dropped while loading.
    #[serde(skip)]
    pub warnings: Vec<String>,
}

/// Either `"name:low:high:points[:optional]"` or a table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DomainDecl {
    Compact(String),
    Table {
        name: String,
        low: f64,
        high: f64,
        #[serde(default)]
        points: Option<u32>,
        #[serde(default)]
        delta: Option<f64>,
        #[serde(default)]
        optional: bool,
    },
}

/// Maximum accepted message skew in seconds, or `"any"` to accept all.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SkewSetting {
    Seconds(f64),
    Keyword(String),
}

impl Default for SkewSetting {
    fn default() -> Self {
        SkewSetting::Seconds(60.0)
    }
}

impl SkewSetting {
    pub fn limit(&self) -> Result<Option<f64>, HelmError> {
        match self {
            SkewSetting::Seconds(s) if *s >= 0.0 => Ok(Some(*s)),
            SkewSetting::Seconds(s) => Err(HelmError::ConfigError(format!("ok_skew {} is negative", s))),
            SkewSetting::Keyword(k) if k.eq_ignore_ascii_case("any") => Ok(None),
            SkewSetting::Keyword(k) => Err(HelmError::ConfigError(format!("ok_skew '{}' is not a number or \"any\"", k))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HelmSettings {
    /// Name this helm signs its own messages with.
    pub helm_alias: String,
    pub ok_skew: SkewSetting,
    /// Start with control granted (no override release needed).
    pub start_engaged: bool,
    /// Whether an override message may take control away.
    pub allow_park: bool,
    /// Drop control after an all-stop is posted.
    pub park_on_allstop: bool,
    /// All-stop when no goal behavior contributes.
    pub goals_mandatory: bool,
    /// Heartbeat silence (seconds) after which a standby helm takes over.
    pub standby: Option<f64>,
    pub hold_on_apps: Vec<String>,
    /// Prefix of published decision variables (`DESIRED_HEADING`).
    pub helm_prefix: String,
    pub other_override_var: Option<String>,
    /// Seconds added to the timestamp of each named vehicle's reports.
    pub node_skew: BTreeMap<String, f64>,
    /// Re-post unchanged decisions after this many seconds.
    pub decision_repost_interval: Option<f64>,
    pub refresh_interval: f64,
    pub startup_delay: f64,
    pub solver_thresh: f64,
    pub behavior_files: Vec<PathBuf>,
}

impl Default for HelmSettings {
    fn default() -> Self {
        HelmSettings {
            helm_alias: "helm".to_string(),
            ok_skew: SkewSetting::default(),
            start_engaged: false,
            allow_park: true,
            park_on_allstop: false,
            goals_mandatory: false,
            standby: None,
            hold_on_apps: Vec::new(),
            helm_prefix: "DESIRED".to_string(),
            other_override_var: None,
            node_skew: BTreeMap::new(),
            decision_repost_interval: None,
            refresh_interval: 2.0,
            startup_delay: 1.0,
            solver_thresh: 100.0,
            behavior_files: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModeDecl {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default, rename = "else")]
    pub else_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BehaviorDecl {
    pub kind: String,
    pub name: String,
    #[serde(default = "default_priority")]
    pub priority: f64,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    /// Seconds of running time after which the behavior completes.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub goal: bool,
    /// `"spawn"` makes this a template instantiated through `updates`.
    #[serde(default)]
    pub templating: Option<String>,
    #[serde(default)]
    pub updates: Option<String>,
    #[serde(default)]
    pub runflag: Vec<String>,
    #[serde(default)]
    pub idleflag: Vec<String>,
    #[serde(default)]
    pub endflag: Vec<String>,
    #[serde(default)]
    pub params: BTreeMap<String, toml::Value>,
}

fn default_priority() -> f64 {
    100.0
}

impl BehaviorDecl {
    pub fn new(kind: &str, name: &str) -> Self {
        BehaviorDecl {
            kind: kind.to_string(),
            name: name.to_string(),
            priority: default_priority(),
            mode: None,
            conditions: Vec::new(),
            duration: None,
            goal: false,
            templating: None,
            updates: None,
            runflag: Vec::new(),
            idleflag: Vec::new(),
            endflag: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    pub fn is_template(&self) -> bool {
        self.templating
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("spawn"))
    }

    /// Parameters as the strings behaviors parse.
    pub fn param_strings(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(k, v)| (k.clone(), param_text(v)))
            .collect()
    }
}

fn param_text(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Array(items) => items.iter().map(param_text).collect::<Vec<_>>().join(":"),
        other => other.to_string(),
    }
}

/// Take `key` out of `table` as an array, keeping the entries that fit `T`.
fn take_entries<T: DeserializeOwned>(table: &mut toml::Table, key: &str, warnings: &mut Vec<String>) -> Vec<T> {
    let items = match table.remove(key) {
        None => return Vec::new(),
        Some(toml::Value::Array(items)) => items,
        Some(other) => {
            warnings.push(format!("'{}' must be an array, found {}", key, other.type_str()));
            return Vec::new();
        }
    };
    let mut kept = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let label = match item.get("name").and_then(toml::Value::as_str) {
            Some(name) => format!("{} '{}'", key, name),
            None => format!("{} entry {}", key, i + 1),
        };
        match item.try_into::<T>() {
            Ok(decl) => kept.push(decl),
            Err(e) => warnings.push(format!("{}: {}", label, e.message())),
        }
    }
    kept
}

impl HelmConfig {
    pub fn from_toml_str(text: &str) -> Result<HelmConfig, HelmError> {
        let mut table: toml::Table = toml::from_str(text)?;
        let mut config = HelmConfig::default();
        if let Some(helm) = table.remove("helm") {
            match helm.try_into::<HelmSettings>() {
                Ok(settings) => config.helm = settings,
                Err(e) => config.warnings.push(format!("[helm]: {}", e.message())),
            }
        }
        config.domain = take_entries(&mut table, "domain", &mut config.warnings);
        config.modes = take_entries(&mut table, "modes", &mut config.warnings);
        config.behaviors = take_entries(&mut table, "behaviors", &mut config.warnings);
        Ok(config)
    }

    /// Load the main file and every behavior file it lists. Only an
    /// unreadable main file is an error.
    pub fn load(path: &Path) -> Result<HelmConfig, HelmError> {
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content).unwrap_or_else(|e| HelmConfig {
            warnings: vec![format!("{}: {}", path.display(), e)],
            ..HelmConfig::default()
        });
        let base = path.parent().unwrap_or(Path::new("."));
        for file in config.helm.behavior_files.clone() {
            let full = if file.is_absolute() { file } else { base.join(file) };
            let extra = fs::read_to_string(&full)
                .map_err(HelmError::from)
                .and_then(|text| Self::from_toml_str(&text));
            match extra {
                Ok(extra) => {
                    config.modes.extend(extra.modes);
                    config.behaviors.extend(extra.behaviors);
                    let shown = full.display();
                    config.warnings.extend(extra.warnings.into_iter().map(|w| format!("{}: {}", shown, w)));
                }
                Err(e) => config.warnings.push(format!("behavior file {}: {}", full.display(), e)),
            }
        }
        if !config.warnings.is_empty() {
            warn!(path = %path.display(), count = config.warnings.len(), "configuration entries skipped");
        }
        info!(
            path = %path.display(),
            behaviors = config.behaviors.len(),
            modes = config.modes.len(),
            "loaded helm configuration"
        );
        Ok(config)
    }

    /// Build the decision domain. An empty domain is an error.
    pub fn build_domain(&self) -> Result<DecisionDomain, HelmError> {
        let mut domain = DecisionDomain::new();
        for decl in &self.domain {
            match decl {
                DomainDecl::Compact(text) => domain.add_declaration(text)?,
                DomainDecl::Table {
                    name,
                    low,
                    high,
                    points,
                    delta,
                    optional,
                } => {
                    match (points, delta) {
                        (Some(points), None) => domain.add_var(name, *low, *high, *points)?,
                        (None, Some(delta)) => domain.add_var_with_delta(name, *low, *high, *delta)?,
                        _ => {
                            return Err(HelmError::ConfigError(format!(
                                "domain variable '{}' needs exactly one of points or delta",
                                name
                            )));
                        }
                    }
                    domain.set_optional(name, *optional)?;
                }
            }
        }
        if domain.is_empty() {
            return Err(HelmError::ConfigError("decision domain is empty".to_string()));
        }
        Ok(domain)
    }
}
