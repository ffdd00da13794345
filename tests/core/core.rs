use helmsman::core::domain::{DecisionDomain, SnapPolicy};
use helmsman::core::encoding::{decode_function, encode_function};
use helmsman::core::error::HelmError;
use helmsman::core::extract::from_breakpoints;
use helmsman::core::function::ObjectiveFunction;
use helmsman::core::grid::Grid;
use helmsman::core::info::{InfoBuffer, InfoValue};
use helmsman::core::piece::{IndexBox, Piece};
use helmsman::core::zaic::PeakUtility;

fn course_speed() -> DecisionDomain {
    "course,0,359,360:speed,0,5,51".parse().expect("domain")
}

#[test]
fn domain_values_round_trip_under_nearest_snapping() {
    let mut d = DecisionDomain::new();
    d.add_var("x", -10.0, 10.0, 81).expect("x");
    d.add_var_with_delta("depth", 0.0, 100.0, 2.5).expect("depth");
    for ix in 0..d.len() {
        let var = d.var(ix).expect("var").clone();
        for j in 0..var.points() {
            let value = var.value(j).expect("value");
            assert_eq!(d.discrete_index(ix, value, SnapPolicy::Nearest), Some(j));
            assert_eq!(d.discrete_index(ix, value, SnapPolicy::Floor), Some(j));
            assert_eq!(d.discrete_index(ix, value, SnapPolicy::Ceil), Some(j));
        }
    }
    assert_eq!(d.discrete_index(0, -50.0, SnapPolicy::Nearest), Some(0));
    assert_eq!(d.discrete_index(0, 50.0, SnapPolicy::Nearest), Some(80));
}

#[test]
fn domain_declarations_and_display() {
    let mut d = DecisionDomain::new();
    d.add_declaration("course:0:359:360").expect("course");
    d.add_declaration("speed:0:5:delta=0.1").expect("speed");
    d.add_declaration("depth:0:500:101:optional").expect("depth");
    assert_eq!(d.len(), 3);
    assert_eq!(d.var_by_name("speed").map(|v| v.points()), Some(51));
    assert!(d.var_by_name("depth").is_some_and(|v| v.is_optional()));
    assert!(!d.var_by_name("course").is_some_and(|v| v.is_optional()));
    assert_eq!(d.to_string(), "course,0,359,360:speed,0,5,51:depth,0,500,101");

    assert!(d.add_declaration("course:0:10:11").is_err());
    assert!(d.add_declaration("rudder:10:0:11").is_err());
    assert!(d.add_declaration("rudder:0:10:1").is_err());
    assert!(d.add_declaration("rudder:0:10").is_err());
    assert!(d.add_declaration("rudder:0:10:11:sometimes").is_err());
}

#[test]
fn subdomain_keeps_requested_order() {
    let d = course_speed();
    let sub = d.subdomain(&["speed", "course"]).expect("subdomain");
    assert_eq!(sub.var_name(0), Some("speed"));
    assert_eq!(sub.var_name(1), Some("course"));
    assert!(d.subdomain(&["depth"]).is_err());
}

#[test]
fn normalize_is_idempotent() {
    let d = course_speed();
    let course = PeakUtility::new(45.0, 10.0, 60.0).build(&d, "course").expect("course peak");
    let mut f = course
        .expand_to(&d)
        .expect("expand")
        .add(&PeakUtility::new(2.0, 0.5, 2.0).build(&d, "speed").expect("speed peak"))
        .expect("sum");
    f.normalize(0.0, 100.0);
    let once = encode_function(&f);
    let (lo, hi) = f.value_range().expect("range");
    assert!(lo.abs() < 1e-9);
    assert!((hi - 100.0).abs() < 1e-9);
    f.normalize(0.0, 100.0);
    let twice = f.value_range().expect("range");
    assert!((twice.0 - lo).abs() < 1e-9 && (twice.1 - hi).abs() < 1e-9);
    let points = [[45u32, 20u32], [100, 3], [300, 50]];
    let reference = decode_function(&once).expect("decode");
    for p in points {
        let a = f.eval(&p).expect("covered");
        let b = reference.eval(&p).expect("covered");
        assert!((a - b).abs() < 1e-9);
    }
}

#[test]
fn normalize_flattens_constant_function() {
    let d = course_speed();
    let mut f = ObjectiveFunction::constant(d, 42.0).expect("constant");
    f.normalize(10.0, 100.0);
    assert_eq!(f.value_range(), Some((10.0, 10.0)));
}

#[test]
fn cheap_bound_is_monotone_and_sound() {
    let mut d = DecisionDomain::new();
    d.add_var("x", 0.0, 99.0, 100).expect("x");
    let f = from_breakpoints(&d, &[(0, 5.0), (20, 80.0), (35, 10.0), (60, 95.0), (99, 0.0)])
        .expect("breakpoints");
    let grid = Grid::with_edge(d.universe(), f.pieces(), vec![7]);

    let nested = [(0u32, 99u32), (10, 70), (15, 40), (22, 30), (25, 25)];
    let mut previous = f64::INFINITY;
    for (lo, hi) in nested {
        let query = IndexBox::new(&[(lo, hi)]).expect("box");
        let bound = grid.cheap_bound(&query);
        assert!(bound <= previous + 1e-9, "bound grew from {} to {} on [{}, {}]", previous, bound, lo, hi);
        let exact = (lo..=hi)
            .filter_map(|x| f.eval(&[x]))
            .fold(f64::NEG_INFINITY, f64::max);
        assert!(bound >= exact - 1e-9, "bound {} below true max {}", bound, exact);
        previous = bound;
    }
}

#[test]
fn grid_candidates_cover_every_intersecting_piece() {
    let d = course_speed();
    let f = PeakUtility::new(90.0, 5.0, 40.0)
        .build(&d, "course")
        .expect("course")
        .expand_to(&d)
        .expect("expand");
    let grid = f.build_grid();
    let query = IndexBox::new(&[(80, 140), (10, 12)]).expect("query");
    let candidates = grid.candidates(&query);
    for (ix, piece) in f.pieces().iter().enumerate() {
        if piece.bounds().intersects(&query) {
            assert!(candidates.contains(&ix), "piece {} missing from candidates", ix);
        }
    }
}

#[test]
fn expand_then_add_sums_pointwise() {
    let d = course_speed();
    let course = PeakUtility::new(180.0, 0.0, 90.0).build(&d, "course").expect("course");
    let speed = PeakUtility::new(3.0, 0.0, 3.0).build(&d, "speed").expect("speed");
    let joint = course.expand_to(&d).expect("expand");
    let sum = joint.add(&speed).expect("add");
    sum.check_partition().expect("partition");
    for (c, s) in [(180u32, 30u32), (150, 0), (0, 50), (250, 25)] {
        let expected = course.eval(&[c]).expect("course") + speed.eval(&[s]).expect("speed");
        let got = sum.eval(&[c, s]).expect("sum");
        assert!((got - expected).abs() < 1e-9, "at ({}, {}): {} vs {}", c, s, got, expected);
    }
    assert_eq!(sum.max_point().map(|(p, _)| p), Some(vec![180, 30]));
}

#[test]
fn add_rejects_foreign_variables() {
    let d = course_speed();
    let course = PeakUtility::new(10.0, 0.0, 10.0).build(&d, "course").expect("course");
    let speed = PeakUtility::new(1.0, 0.0, 1.0).build(&d, "speed").expect("speed");
    assert!(matches!(course.add(&speed), Err(HelmError::DomainMismatch(_))));
}

#[test]
fn expand_rejects_resolution_mismatch() {
    let mut coarse = DecisionDomain::new();
    coarse.add_var("course", 0.0, 359.0, 36).expect("course");
    let f = ObjectiveFunction::constant(coarse, 1.0).expect("constant");
    assert!(matches!(f.expand_to(&course_speed()), Err(HelmError::DomainMismatch(_))));
}

#[test]
fn encoding_round_trip_preserves_values() {
    let d = course_speed();
    let mut f = PeakUtility::new(33.0, 4.0, 25.0)
        .build(&d, "course")
        .expect("course")
        .expand_to(&d)
        .expect("expand")
        .with_priority(37.5);
    f.set_source("waypoint#1");
    let text = encode_function(&f);
    let back = decode_function(&text).expect("decode");
    assert_eq!(back.domain(), f.domain());
    assert_eq!(back.size(), f.size());
    assert_eq!(back.priority(), 37.5);
    assert_eq!(back.source(), "waypoint_1");
    assert_eq!(encode_function(&back), text);
}

#[test]
fn decode_rejects_higher_degree_and_bad_fields() {
    assert!(matches!(
        decode_function("domain=x,0,9,10#degree=2#piece=0,9/0,1"),
        Err(HelmError::DegreeError(2))
    ));
    assert!(matches!(
        decode_function("domain=x,0,9,10#color=red"),
        Err(HelmError::EncodingError(_))
    ));
    assert!(decode_function("pwt=10#piece=0,9/0,1").is_err());
    assert!(decode_function("domain=x,0,9,10#piece=0,9,0,1/0,1").is_err());
}

#[test]
fn piece_evaluation_is_affine_in_index_space() {
    let piece = Piece::new(IndexBox::new(&[(0, 9), (0, 4)]).expect("box"), vec![2.0, -1.0, 3.0])
        .expect("piece");
    assert_eq!(piece.eval(&[4, 2]), 9.0);
    assert_eq!(piece.max_value(), 21.0);
    assert_eq!(piece.min_value(), -1.0);
    assert_eq!(piece.argmax(), (21.0, vec![9, 0]));
    assert!(Piece::new(IndexBox::new(&[(0, 9)]).expect("box"), vec![1.0]).is_err());
}

#[test]
fn info_buffer_tracks_deltas() {
    let mut info = InfoBuffer::new();
    info.set_time(10.0);
    info.set("DEPLOY", "true");
    info.set("NAV_X", 12.5);
    assert_eq!(info.text("DEPLOY"), Some("true"));
    assert_eq!(info.num("NAV_X"), Some(12.5));
    assert!(info.changed("NAV_X"));
    info.clear_deltas();
    assert!(info.deltas().is_empty());
    info.set_time(12.0);
    assert_eq!(info.age("NAV_X"), Some(2.0));
    assert_eq!(InfoValue::parse("3.5"), InfoValue::from(3.5));
    assert_eq!(InfoValue::parse("PARK").as_str(), Some("PARK"));
}
