//! The arbitration loop.
//!
//! `Helm` owns the info buffer, the behavior set and every cross-cycle
//! cache. Messages are queued with `deliver` and applied at the start of
//! the next `iterate`, which then decides and returns what to publish.
//!
//! Status moves `STANDBY -> {PARK, DRIVE} -> DISABLED`. `DRIVE` needs control
//! and a complete decision; anything else parks. `DISABLED` and `MALCONFIG`
//! hold until a restart.

use crate::core::config::HelmConfig;
use crate::core::domain::DecisionDomain;
use crate::core::info::{InfoBuffer, InfoValue};
use crate::core::output::{format_value, name_list};
use crate::core::time::Clock;
use crate::plugins::behavior_set::BehaviorSet;
use crate::plugins::bus::{BusMessage, Publication};
use crate::plugins::engine::HelmEngine;
use crate::plugins::failover::{FailoverAction, FailoverEvent, StandbyMonitor, failover_transition};
use crate::plugins::report::{AllStopReason, HelmReport};
use crate::registry::BehaviorRegistry;
use rustc_hash::FxHashMap;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelmStatus {
    Standby,
    Park,
    Drive,
    Disabled,
    Malconfig,
}

impl HelmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HelmStatus::Standby => "STANDBY",
            HelmStatus::Park => "PARK",
            HelmStatus::Drive => "DRIVE",
            HelmStatus::Disabled => "DISABLED",
            HelmStatus::Malconfig => "MALCONFIG",
        }
    }

    /// Parse a published status. The flag is set for a `+` suffix.
    pub fn parse(text: &str) -> Option<(HelmStatus, bool)> {
        let text = text.trim();
        let (base, standby) = match text.strip_suffix('+') {
            Some(base) => (base, true),
            None => (text, false),
        };
        let status = match base.to_ascii_uppercase().as_str() {
            "STANDBY" => HelmStatus::Standby,
            "PARK" => HelmStatus::Park,
            "DRIVE" => HelmStatus::Drive,
            "DISABLED" => HelmStatus::Disabled,
            "MALCONFIG" => HelmStatus::Malconfig,
            _ => return None,
        };
        Some((status, standby))
    }
}

impl fmt::Display for HelmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one `iterate` produced.
#[derive(Debug, Default)]
pub struct CycleOutput {
    pub publications: Vec<Publication>,
    /// Present only on cycles that ran the behaviors.
    pub report: Option<HelmReport>,
}

impl CycleOutput {
    /// Last value published under `key` this cycle.
    pub fn value(&self, key: &str) -> Option<&InfoValue> {
        self.publications.iter().rev().find(|p| p.key == key).map(|p| &p.value)
    }

    pub fn count(&self, key: &str) -> usize {
        self.publications.iter().filter(|p| p.key == key).count()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.publications.iter().any(|p| p.key == key)
    }
}

/// Keys that report a single occurrence rather than held state.
const EVENT_KEYS: &[&str] = &[
    "IVPHELM_STATE",
    "IVPHELM_RESTARTED",
    "IVPHELM_SKEW",
    "IVPHELM_LIFE_EVENT",
    "BHV_WARNING",
    "BHV_ERROR",
];

/// Outgoing publications with change suppression.
#[derive(Debug, Default)]
struct Outbox {
    sent: FxHashMap<String, (InfoValue, f64)>,
    pending: Vec<Publication>,
}

impl Outbox {
    /// Publish only when the value differs from the last one sent.
    fn post(&mut self, key: &str, value: impl Into<InfoValue>, now: f64) {
        let value = value.into();
        if self.sent.get(key).is_some_and(|(v, _)| *v == value) {
            return;
        }
        self.post_always(key, value, now);
    }

    fn post_always(&mut self, key: &str, value: impl Into<InfoValue>, now: f64) {
        let value = value.into();
        self.sent.insert(key.to_string(), (value.clone(), now));
        self.pending.push(Publication {
            key: key.to_string(),
            value,
        });
    }

    /// Like `post`, but an unchanged value is re-asserted once `repost`
    /// seconds have passed since it was last sent.
    fn post_decision(&mut self, key: &str, value: f64, now: f64, repost: Option<f64>) {
        let due = match (self.sent.get(key), repost) {
            (Some((InfoValue::Num(v), _)), _) if *v != value => true,
            (Some((_, last)), Some(interval)) => now - last >= interval,
            (Some(_), None) => false,
            (None, _) => true,
        };
        if due {
            self.post_always(key, value, now);
        }
    }

    fn clear_cache(&mut self) {
        self.sent.clear();
    }

    /// Send every cached state value once more, then forget the cache.
    /// One-off events are not repeated.
    fn replay(&mut self, now: f64) {
        let mut held: Vec<(String, InfoValue)> = self
            .sent
            .drain()
            .filter(|(key, _)| !EVENT_KEYS.contains(&key.as_str()))
            .map(|(key, (value, _))| (key, value))
            .collect();
        held.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in held {
            self.post_always(&key, value, now);
        }
        self.sent.clear();
    }

    fn take(&mut self) -> Vec<Publication> {
        std::mem::take(&mut self.pending)
    }
}

pub struct Helm {
    config: HelmConfig,
    registry: BehaviorRegistry,
    clock: Box<dyn Clock>,
    domain: DecisionDomain,
    bhv_set: Option<BehaviorSet>,
    engine: HelmEngine,
    info: InfoBuffer,
    inbox: Vec<BusMessage>,
    outbox: Outbox,
    status: HelmStatus,
    has_control: bool,
    config_warnings: Vec<String>,
    config_warnings_posted: bool,
    skew_limit: Option<f64>,
    iteration: u64,
    start_time: f64,
    monitor: Option<StandbyMonitor>,
    hold_pending: Vec<String>,
    last_refresh: Option<f64>,
    refresh_requested: bool,
    restart_requested: bool,
    restarted_pending: bool,
    rejournal_requested: bool,
    prev_report: Option<HelmReport>,
    allstop_cycles: u32,
}

impl Helm {
    /// Never fails: configuration problems leave the helm in `MALCONFIG`
    /// with control disabled, and are listed in `config_warnings`.
    pub fn new(config: HelmConfig, registry: BehaviorRegistry, clock: Box<dyn Clock>) -> Self {
        let now = clock.now();
        let mut helm = Helm {
            engine: HelmEngine::new(config.helm.solver_thresh).with_goals_mandatory(config.helm.goals_mandatory),
            config,
            registry,
            clock,
            domain: DecisionDomain::new(),
            bhv_set: None,
            info: InfoBuffer::new(),
            inbox: Vec::new(),
            outbox: Outbox::default(),
            status: HelmStatus::Malconfig,
            has_control: false,
            config_warnings: Vec::new(),
            config_warnings_posted: false,
            skew_limit: None,
            iteration: 0,
            start_time: now,
            monitor: None,
            hold_pending: Vec::new(),
            last_refresh: None,
            refresh_requested: false,
            restart_requested: false,
            restarted_pending: false,
            rejournal_requested: false,
            prev_report: None,
            allstop_cycles: 0,
        };
        helm.info.set_time(now);
        helm.configure(now);
        helm
    }

    fn configure(&mut self, now: f64) {
        let settings = &self.config.helm;
        let mut warnings = self.config.warnings.clone();

        match settings.ok_skew.limit() {
            Ok(limit) => self.skew_limit = limit,
            Err(e) => warnings.push(e.to_string()),
        }
        if settings.solver_thresh <= 0.0 {
            warnings.push(format!("solver_thresh {} must be positive", settings.solver_thresh));
        }
        if let Some(t) = settings.standby
            && t <= 0.0
        {
            warnings.push(format!("standby threshold {} must be positive", t));
        }

        self.bhv_set = None;
        match self.config.build_domain() {
            Ok(domain) => {
                match BehaviorSet::build(&self.config.behaviors, &self.config.modes, &self.registry, &domain) {
                    Ok(set) => self.bhv_set = Some(set),
                    Err(e) => warnings.push(e.to_string()),
                }
                self.domain = domain;
            }
            Err(e) => warnings.push(e.to_string()),
        }

        let settings = &self.config.helm;
        self.monitor = settings.standby.map(|t| StandbyMonitor::new(t, now));
        self.hold_pending = settings.hold_on_apps.clone();
        self.config_warnings = warnings;
        self.config_warnings_posted = false;

        if self.config_warnings.is_empty() {
            self.has_control = settings.start_engaged;
            let status = if settings.standby.is_some() {
                HelmStatus::Standby
            } else {
                HelmStatus::Park
            };
            self.set_status(status);
        } else {
            warn!(warnings = %self.config_warnings.join("; "), "helm malconfigured");
            self.has_control = false;
            self.set_status(HelmStatus::Malconfig);
        }
    }

    fn set_status(&mut self, status: HelmStatus) {
        if status != self.status {
            info!(from = %self.status, to = %status, "helm status");
            self.status = status;
        }
    }

    pub fn deliver(&mut self, msg: BusMessage) {
        self.inbox.push(msg);
    }

    pub fn status(&self) -> HelmStatus {
        self.status
    }

    pub fn has_control(&self) -> bool {
        self.has_control
    }

    pub fn config_warnings(&self) -> &[String] {
        &self.config_warnings
    }

    pub fn info(&self) -> &InfoBuffer {
        &self.info
    }

    pub fn domain(&self) -> &DecisionDomain {
        &self.domain
    }

    pub fn behavior_set(&self) -> Option<&BehaviorSet> {
        self.bhv_set.as_ref()
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    fn is_standby_helm(&self) -> bool {
        self.config.helm.standby.is_some()
    }

    fn decision_key(&self, var: &str) -> String {
        let name = if var.eq_ignore_ascii_case("course") {
            "HEADING".to_string()
        } else {
            var.to_ascii_uppercase()
        };
        if self.config.helm.helm_prefix.is_empty() {
            name
        } else {
            format!("{}_{}", self.config.helm.helm_prefix, name)
        }
    }

    fn state_text(&self) -> String {
        let enabled = matches!(self.status, HelmStatus::Park | HelmStatus::Drive);
        if self.is_standby_helm() && enabled {
            format!("{}+", self.status)
        } else {
            self.status.to_string()
        }
    }

    /// Run one cycle.
    pub fn iterate(&mut self) -> CycleOutput {
        let now = self.clock.now();
        self.iteration += 1;
        self.info.set_time(now);

        let mut warnings = Vec::new();
        for msg in std::mem::take(&mut self.inbox) {
            if let Err(w) = self.handle_message(msg, now) {
                warnings.push(w);
            }
        }

        if self.restart_requested {
            self.restart(now);
        }
        if self.refresh_requested {
            self.refresh_requested = false;
            let interval = self.config.helm.refresh_interval;
            if self.last_refresh.is_none_or(|t| now - t >= interval) {
                self.outbox.clear_cache();
                self.last_refresh = Some(now);
            }
        }

        let tick = self.monitor.as_ref().map(|m| FailoverEvent::Tick {
            elapsed: m.elapsed(now),
            threshold: m.threshold(),
        });
        if let Some(tick) = tick
            && failover_transition(self.status, true, tick) == FailoverAction::TakeOver
        {
            info!("primary helm silent, taking over");
            self.set_status(HelmStatus::Park);
        }

        if !self.config_warnings_posted {
            self.config_warnings_posted = true;
            for w in self.config_warnings.clone() {
                self.outbox.post_always("BHV_WARNING", w, now);
            }
        }
        for w in &warnings {
            self.outbox.post_always("BHV_WARNING", w.as_str(), now);
        }

        let report = self.decide(now, warnings);
        self.outbox.post_always("IVPHELM_STATE", self.state_text(), now);
        CycleOutput {
            publications: self.outbox.take(),
            report,
        }
    }

    fn decide(&mut self, now: f64, warnings: Vec<String>) -> Option<HelmReport> {
        if !matches!(self.status, HelmStatus::Park | HelmStatus::Drive) {
            return None;
        }
        if !self.hold_pending.is_empty() {
            return None;
        }
        if now - self.start_time < self.config.helm.startup_delay {
            return None;
        }
        if !self.has_control {
            self.set_status(HelmStatus::Park);
            self.outbox
                .post("IVPHELM_ALLSTOP", AllStopReason::ManualOverride.to_string(), now);
            return None;
        }

        let set = self.bhv_set.as_mut()?;
        let mut update_warnings = set.process_updates(&self.info);
        self.info.clear_deltas();
        let mode = set.evaluate_mode(&self.info).to_string();
        self.info.set("MODE", mode);

        let mut report = self
            .engine
            .determine_next_decision(set, &self.info, self.iteration, now);
        let modeset = set.modes().describe();
        let removed = set.remove_completed();
        if !removed.is_empty() {
            info!(behaviors = %removed.join(","), "behaviors completed");
        }

        update_warnings.extend(warnings);
        update_warnings.append(&mut report.warnings);
        report.warnings = update_warnings;

        for (key, value) in &report.posts {
            self.info.set(key, value.clone());
            self.outbox.post_always(key, value.clone(), now);
        }
        for event in &report.life_events {
            self.outbox.post_always("IVPHELM_LIFE_EVENT", event.to_posting(), now);
        }
        for err in &report.errors {
            self.outbox.post_always("BHV_ERROR", err.as_str(), now);
        }
        for w in &report.warnings {
            self.outbox.post_always("BHV_WARNING", w.as_str(), now);
        }

        self.publish_decision(&report, now);
        self.publish_summary(&report, now);

        self.outbox.post("IVPHELM_BHV_ACTIVE", name_list(&report.active), now);
        self.outbox.post("IVPHELM_BHV_RUNNING", name_list(&report.running), now);
        self.outbox.post("IVPHELM_BHV_IDLE", name_list(&report.idle), now);
        self.outbox.post("IVPHELM_IPF_CNT", report.ofnum as f64, now);
        self.outbox.post("IVPHELM_CREATE_CPU", format_value(report.create_secs), now);
        self.outbox
            .post("IVPHELM_LOOP_CPU", format_value(report.create_secs + report.solve_secs), now);
        self.outbox.post("IVPHELM_DOMAIN", self.domain.to_string(), now);
        if !modeset.is_empty() {
            self.outbox.post("IVPHELM_MODESET", modeset, now);
        }
        if self.restarted_pending {
            self.restarted_pending = false;
            self.outbox.post_always("IVPHELM_RESTARTED", "true", now);
        }

        self.prev_report = Some(report.clone());
        Some(report)
    }

    fn publish_decision(&mut self, report: &HelmReport, now: f64) {
        let repost = self.config.helm.decision_repost_interval;
        match &report.all_stop {
            None => {
                self.allstop_cycles = 0;
                for (var, value) in &report.decisions {
                    let key = self.decision_key(var);
                    self.outbox.post_decision(&key, *value, now, repost);
                }
                self.outbox.post("IVPHELM_ALLSTOP", "clear", now);
                self.set_status(HelmStatus::Drive);
            }
            Some(reason) => {
                self.allstop_cycles += 1;
                self.outbox.post("IVPHELM_ALLSTOP", reason.to_string(), now);
                if self.allstop_cycles >= 2 {
                    let keys: Vec<String> = self.domain.names().map(|n| self.decision_key(n)).collect();
                    for key in keys {
                        self.outbox.post_decision(&key, 0.0, now, repost);
                    }
                }
                if self.config.helm.park_on_allstop {
                    self.has_control = false;
                }
                self.set_status(HelmStatus::Park);
            }
        }
    }

    fn publish_summary(&mut self, report: &HelmReport, now: f64) {
        let summary = match (&self.prev_report, self.rejournal_requested) {
            (Some(prev), false) => report.summary_delta(prev),
            _ => report.summary(),
        };
        self.rejournal_requested = false;
        // Deltas always carry iter and utc; anything beyond that is a change.
        if summary.matches(',').count() > 1 {
            self.outbox.post_always("IVPHELM_SUMMARY", summary, now);
        }
    }

    fn restart(&mut self, now: f64) {
        self.restart_requested = false;
        info!("restarting helm");
        self.configure(now);
        self.outbox.clear_cache();
        self.prev_report = None;
        self.allstop_cycles = 0;
        self.restarted_pending = true;
    }

    /// Apply one message. `Err` carries a runtime warning.
    fn handle_message(&mut self, msg: BusMessage, now: f64) -> Result<(), String> {
        let from_self = msg.source == self.config.helm.helm_alias;
        if !from_self
            && msg.key != "HELM_MAP_CLEAR"
            && let Some(limit) = self.skew_limit
        {
            let skew = (now - msg.time).abs();
            if skew > limit {
                self.outbox.post_always(
                    "IVPHELM_SKEW",
                    format!("key={},src={},skew={}", msg.key, msg.source, format_value(skew)),
                    now,
                );
                return Err(format!(
                    "dropped {} from {}: skew {}s exceeds {}s",
                    msg.key,
                    msg.source,
                    format_value(skew),
                    format_value(limit)
                ));
            }
        }

        let is_override = msg.key == "MOOS_MANUAL_OVERRIDE"
            || self.config.helm.other_override_var.as_deref() == Some(msg.key.as_str());
        match msg.key.as_str() {
            _ if is_override => {
                let text = msg.value.to_string().to_ascii_lowercase();
                match text.as_str() {
                    "true" => {
                        if self.config.helm.allow_park {
                            self.has_control = false;
                        }
                    }
                    "false" => self.has_control = true,
                    other => return Err(format!("{} has unexpected value '{}'", msg.key, other)),
                }
            }
            "RESTART_HELM" => {
                let kind = msg.value.to_string();
                if !["type1", "type2"].iter().any(|k| kind.eq_ignore_ascii_case(k)) {
                    warn!(value = %kind, "ignoring restart request");
                    return Err(format!("RESTART_HELM has unexpected value '{}'", kind));
                }
                self.restart_requested = true;
            }
            "HELM_MAP_CLEAR" => self.refresh_requested = true,
            "IVPHELM_REJOURNAL" => self.rejournal_requested = true,
            "IVPHELM_STATE" => {
                if !from_self {
                    self.handle_heartbeat(&msg.value.to_string(), now);
                }
            }
            "DB_CLIENTS" => {
                let text = msg.value.to_string();
                let seen: Vec<&str> = text.split(',').map(str::trim).collect();
                self.hold_pending
                    .retain(|app| !seen.iter().any(|s| s.eq_ignore_ascii_case(app)));
            }
            "NODE_REPORT" => self.handle_node_report(&msg.value.to_string())?,
            _ => self.info.set(&msg.key, msg.value),
        }
        Ok(())
    }

    fn handle_heartbeat(&mut self, text: &str, now: f64) {
        let Some((status, standby)) = HelmStatus::parse(text) else {
            return;
        };
        let standby_helm = self.is_standby_helm();
        if standby_helm
            && !standby
            && matches!(status, HelmStatus::Park | HelmStatus::Drive)
            && let Some(monitor) = self.monitor.as_mut()
        {
            monitor.note_heartbeat(now);
        }
        match failover_transition(self.status, standby_helm, FailoverEvent::Heartbeat { status, standby }) {
            FailoverAction::YieldToPrimary => {
                info!("primary helm heard again, yielding");
                self.set_status(HelmStatus::Standby);
                self.outbox.replay(now);
                self.prev_report = None;
                self.rejournal_requested = true;
            }
            FailoverAction::DisableSelf => {
                warn!(other = %text, "another active helm heard, disabling");
                self.has_control = false;
                self.set_status(HelmStatus::Disabled);
                self.outbox.post_always(
                    "IVPHELM_ALLSTOP",
                    AllStopReason::DisabledByStandbyHelm.to_string(),
                    now,
                );
            }
            FailoverAction::TakeOver | FailoverAction::None => {}
        }
    }

    /// `NAME=..,X=..,Y=..,SPD=..,HDG=..,DEP=..,TIME=..` into `<NAME>_NAV_*`.
    fn handle_node_report(&mut self, text: &str) -> Result<(), String> {
        let fields: Vec<(&str, &str)> = text
            .split(',')
            .filter_map(|f| f.split_once('='))
            .map(|(k, v)| (k.trim(), v.trim()))
            .collect();
        let name = fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("NAME"))
            .map(|(_, v)| *v)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| format!("unhandled node report '{}'", text))?;
        if name.eq_ignore_ascii_case(&self.config.helm.helm_alias) {
            return Ok(());
        }
        let prefix = name.to_ascii_uppercase();
        let skew = self.config.helm.node_skew.get(name).copied().unwrap_or(0.0);
        for (key, value) in &fields {
            let suffix = match key.to_ascii_uppercase().as_str() {
                "X" => "NAV_X",
                "Y" => "NAV_Y",
                "SPD" => "NAV_SPEED",
                "HDG" => "NAV_HEADING",
                "DEP" => "NAV_DEPTH",
                "TIME" => "NAV_UTC",
                _ => continue,
            };
            let Ok(mut v) = value.parse::<f64>() else {
                return Err(format!("node report from {}: bad {} '{}'", name, key, value));
            };
            if suffix == "NAV_UTC" {
                v += skew;
            }
            self.info.set(&format!("{}_{}", prefix, suffix), v);
        }
        Ok(())
    }
}
