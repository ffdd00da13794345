use helmsman::core::config::HelmConfig;
use helmsman::core::info::InfoValue;
use helmsman::core::time::{Clock, ManualClock};
use helmsman::plugins::bus::BusMessage;
use helmsman::plugins::helm::{Helm, HelmStatus};
use helmsman::registry::BehaviorRegistry;

const BASE: &str = r#"
domain = ["course:0:359:360", "speed:0:5:51"]

[helm]
startup_delay = 0.0
start_engaged = true
ok_skew = "any"
"#;

const TRANSIT: &str = r#"
[[behaviors]]
kind = "waypoint"
name = "transit"
[behaviors.params]
points = "0,100"
speed = 2
"#;

fn helm(standby: Option<f64>) -> (Helm, ManualClock) {
    let settings = standby.map_or_else(String::new, |t| format!("standby = {:.1}\n", t));
    let cfg = HelmConfig::from_toml_str(&format!("{}{}{}", BASE, settings, TRANSIT)).expect("config");
    let clock = ManualClock::new(100.0);
    let mut helm = Helm::new(cfg, BehaviorRegistry::builtin(), Box::new(clock.clone()));
    helm.deliver(BusMessage::num("NAV_X", 0.0, clock.now()));
    helm.deliver(BusMessage::num("NAV_Y", 0.0, clock.now()));
    (helm, clock)
}

fn heartbeat(state: &str, source: &str, clock: &ManualClock) -> BusMessage {
    BusMessage::new("IVPHELM_STATE", state, source, clock.now())
}

fn state(helm: &mut Helm) -> Option<String> {
    helm.iterate().value("IVPHELM_STATE").map(ToString::to_string)
}

#[test]
fn standby_helm_waits_while_primary_is_heard() {
    let (mut helm, clock) = helm(Some(5.0));
    assert_eq!(helm.status(), HelmStatus::Standby);
    let out = helm.iterate();
    assert!(out.report.is_none());
    assert!(!out.contains("DESIRED_HEADING"));
    assert_eq!(out.value("IVPHELM_STATE"), Some(&InfoValue::from("STANDBY")));

    for _ in 0..4 {
        clock.advance(3.0);
        helm.deliver(heartbeat("DRIVE", "primary", &clock));
        assert_eq!(state(&mut helm).as_deref(), Some("STANDBY"));
    }
    assert_eq!(helm.status(), HelmStatus::Standby);
}

#[test]
fn standby_helm_takes_over_after_silence_and_yields_back() {
    let (mut helm, clock) = helm(Some(5.0));
    helm.iterate();

    clock.advance(5.0);
    helm.iterate();
    assert_eq!(helm.status(), HelmStatus::Standby);

    clock.advance(0.5);
    let out = helm.iterate();
    assert_eq!(helm.status(), HelmStatus::Drive);
    assert_eq!(out.value("DESIRED_HEADING"), Some(&InfoValue::from(0.0)));
    assert_eq!(out.value("IVPHELM_STATE"), Some(&InfoValue::from("DRIVE+")));

    clock.advance(0.5);
    helm.deliver(heartbeat("DRIVE", "primary", &clock));
    let out = helm.iterate();
    assert_eq!(helm.status(), HelmStatus::Standby);
    assert!(out.report.is_none());
    assert_eq!(out.value("IVPHELM_STATE"), Some(&InfoValue::from("STANDBY")));
    // Held state goes out once more on the yield cycle only.
    assert_eq!(out.value("DESIRED_HEADING"), Some(&InfoValue::from(0.0)));
    assert_eq!(out.value("IVPHELM_ALLSTOP"), Some(&InfoValue::from("clear")));
    assert_eq!(out.count("IVPHELM_SUMMARY"), 1);

    clock.advance(0.5);
    helm.deliver(heartbeat("DRIVE", "primary", &clock));
    let out = helm.iterate();
    let keys: Vec<&str> = out.publications.iter().map(|p| p.key.as_str()).collect();
    assert_eq!(keys, vec!["IVPHELM_STATE"]);

    clock.advance(5.5);
    let out = helm.iterate();
    assert_eq!(helm.status(), HelmStatus::Drive);
    assert!(out.contains("DESIRED_HEADING"));
}

#[test]
fn standby_announcements_do_not_count_as_primary_heartbeats() {
    let (mut helm, clock) = helm(Some(5.0));
    for _ in 0..3 {
        clock.advance(2.0);
        helm.deliver(heartbeat("DRIVE+", "backup", &clock));
        helm.deliver(heartbeat("STANDBY", "spare", &clock));
        helm.iterate();
    }
    assert_eq!(helm.status(), HelmStatus::Drive);
}

#[test]
fn primary_hearing_another_primary_disables_itself() {
    let (mut helm, clock) = helm(None);
    assert_eq!(state(&mut helm).as_deref(), Some("DRIVE"));

    clock.advance(1.0);
    helm.deliver(heartbeat("PARK", "intruder", &clock));
    let out = helm.iterate();
    assert_eq!(helm.status(), HelmStatus::Disabled);
    assert!(!helm.has_control());
    assert!(out.report.is_none());
    assert_eq!(
        out.value("IVPHELM_ALLSTOP"),
        Some(&InfoValue::from("DisabledByStandbyHelm"))
    );
    assert_eq!(out.value("IVPHELM_STATE"), Some(&InfoValue::from("DISABLED")));

    for _ in 0..3 {
        clock.advance(10.0);
        helm.deliver(BusMessage::text("MOOS_MANUAL_OVERRIDE", "false", clock.now()));
        assert_eq!(state(&mut helm).as_deref(), Some("DISABLED"));
    }

    helm.deliver(BusMessage::text("RESTART_HELM", "type1", clock.now()));
    let out = helm.iterate();
    assert_eq!(helm.status(), HelmStatus::Drive);
    assert_eq!(out.value("IVPHELM_RESTARTED"), Some(&InfoValue::from("true")));
    assert_eq!(out.value("IVPHELM_ALLSTOP"), Some(&InfoValue::from("clear")));
}

#[test]
fn primary_ignores_standby_and_own_announcements() {
    let (mut helm, clock) = helm(None);
    helm.iterate();
    clock.advance(1.0);
    helm.deliver(heartbeat("DRIVE+", "backup", &clock));
    helm.deliver(heartbeat("DRIVE", "helm", &clock));
    helm.deliver(heartbeat("STANDBY", "spare", &clock));
    helm.deliver(heartbeat("ASLEEP", "odd", &clock));
    helm.iterate();
    assert_eq!(helm.status(), HelmStatus::Drive);
    assert!(helm.has_control());
}

#[test]
fn standby_helm_never_disables_itself() {
    let (mut helm, clock) = helm(Some(5.0));
    clock.advance(6.0);
    helm.iterate();
    assert_eq!(helm.status(), HelmStatus::Drive);

    helm.deliver(heartbeat("PARK+", "other-backup", &clock));
    helm.iterate();
    assert_eq!(helm.status(), HelmStatus::Drive);

    helm.deliver(heartbeat("PARK", "primary", &clock));
    helm.iterate();
    assert_eq!(helm.status(), HelmStatus::Standby);
}
