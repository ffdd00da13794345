use helmsman::core::domain::DecisionDomain;
use helmsman::core::encoding::{ChunkAssembler, decode_function, encode_chunks, encode_function};
use helmsman::core::error::HelmError;
use helmsman::core::extract::{extract_pieces, from_breakpoints};
use helmsman::core::reflector::{Reflector, ValueFn, ValueSpan};
use helmsman::core::zaic::PeakUtility;

fn x_domain() -> DecisionDomain {
    let mut d = DecisionDomain::new();
    d.add_var("x", 0.0, 99.0, 100).expect("x");
    d
}

fn plane_domain() -> DecisionDomain {
    "x,0,19,20:y,0,19,20".parse().expect("domain")
}

fn max_error(f: &helmsman::core::function::ObjectiveFunction, truth: impl Fn(u32) -> f64) -> f64 {
    (0..100u32)
        .map(|x| (f.eval(&[x]).expect("covered") - truth(x)).abs())
        .fold(0.0, f64::max)
}

#[test]
fn reflector_uniform_pieces_reproduce_linear_function() {
    let aof = ValueFn::new(x_domain(), |v: &[f64]| 3.0 * v[0] + 2.0);
    let mut r = Reflector::new(&aof);
    assert!(r.set_params("uniform_piece=x:10"));
    assert_eq!(r.create().expect("create"), 10);
    let f = r.extract(false).expect("extract");
    f.check_partition().expect("partition");
    assert!(max_error(&f, |x| 3.0 * x as f64 + 2.0) < 1e-9);
}

#[test]
fn reflector_uniform_amount_splits_every_axis() {
    let aof = ValueFn::new(plane_domain(), |v: &[f64]| v[0] - v[1]);
    let mut r = Reflector::new(&aof);
    assert!(r.set_params("uniform_amount=4"));
    assert_eq!(r.create().expect("create"), 4);
    let f = r.extract(false).expect("extract");
    f.check_partition().expect("partition");
    assert_eq!(f.eval(&[19, 0]), Some(19.0));
}

#[test]
fn reflector_directed_refinement_replaces_region() {
    let aof = ValueFn::new(x_domain(), |v: &[f64]| (v[0] / 10.0).sin());
    let mut r = Reflector::new(&aof);
    assert!(r.set_params("uniform_piece=x:50#refine_region=x:0:19#refine_piece=x:5"));
    assert_eq!(r.create().expect("create"), 6);
    let f = r.extract(false).expect("extract");
    f.check_partition().expect("partition");
    let small = f.pieces().iter().filter(|p| p.bounds().hi(0) <= 19).count();
    assert_eq!(small, 4);
}

#[test]
fn reflector_smart_refinement_spends_its_budget() {
    let truth = |x: u32| {
        let v = x as f64 - 50.0;
        -v * v
    };
    let aof = ValueFn::new(x_domain(), |v: &[f64]| -(v[0] - 50.0) * (v[0] - 50.0));

    let mut coarse = Reflector::new(&aof);
    assert!(coarse.set_params("uniform_piece=x:25"));
    let coarse = coarse.extract(false).expect("coarse");

    let mut smart = Reflector::new(&aof);
    assert!(smart.set_params("uniform_piece=x:25#smart_amount=6"));
    assert_eq!(smart.create().expect("create"), 10);
    let smart = smart.extract(false).expect("smart");
    smart.check_partition().expect("partition");
    assert!(max_error(&smart, truth) < max_error(&coarse, truth));

    let mut percent = Reflector::new(&aof);
    assert!(percent.set_params("uniform_piece=x:10#smart_percent=50"));
    assert_eq!(percent.create().expect("create"), 15);
}

#[test]
fn reflector_smart_thresh_stops_early_on_exact_fits() {
    let aof = ValueFn::new(x_domain(), |v: &[f64]| 2.0 * v[0]);
    let mut r = Reflector::new(&aof);
    assert!(r.set_params("uniform_piece=x:20#smart_amount=8#smart_thresh=0.001"));
    assert_eq!(r.create().expect("create"), 5);

    let mut spread = Reflector::new(&aof).with_metric(Box::new(ValueSpan));
    assert!(spread.set_params("uniform_piece=x:20#smart_amount=3#smart_thresh=0.001"));
    assert_eq!(spread.create().expect("create"), 8);
}

#[test]
fn reflector_normalized_extraction_spans_hundred() {
    let aof = ValueFn::new(x_domain(), |v: &[f64]| 4.0 * v[0] - 7.0);
    let mut r = Reflector::new(&aof);
    assert!(r.set_params("uniform_piece=x:33"));
    let f = r.extract(true).expect("extract");
    let (lo, hi) = f.value_range().expect("range");
    assert!(lo.abs() < 1e-9);
    assert!((hi - 100.0).abs() < 1e-9);
}

#[test]
fn reflector_bad_parameters_are_reported() {
    let aof = ValueFn::new(x_domain(), |v: &[f64]| v[0]);

    let mut unknown_var = Reflector::new(&aof);
    assert!(!unknown_var.set_params("uniform_piece=y:3"));
    assert_eq!(unknown_var.warnings().len(), 1);
    assert!(matches!(unknown_var.extract(false), Err(HelmError::ConfigError(_))));

    let mut orphan_piece = Reflector::new(&aof);
    assert!(!orphan_piece.set_params("refine_piece=x:5"));
    assert!(orphan_piece.create().is_err());

    let mut orphan_region = Reflector::new(&aof);
    assert!(orphan_region.set_params("refine_region=x:10:20"));
    assert!(orphan_region.create().is_err());
    assert!(!orphan_region.warnings().is_empty());

    let mut oversized = Reflector::new(&aof);
    assert!(!oversized.set_params("refine_region=x:10:20#refine_piece=x:40"));

    let mut unknown = Reflector::new(&aof);
    assert!(!unknown.set_params("wobble=3"));
    assert!(!unknown.set_params("uniform_amount"));
}

#[test]
fn peak_utility_builds_exact_shape() {
    let d = x_domain();
    let z = PeakUtility {
        summit: 40.0,
        peak_width: 5.0,
        base_width: 20.0,
        summit_delta: 10.0,
        min_util: 5.0,
        max_util: 80.0,
        wrap: false,
    };
    let f = z.build(&d, "x").expect("build");
    f.check_partition().expect("partition");
    for x in 0..100u32 {
        let expected = z.utility(x as f64, None);
        assert!((f.eval(&[x]).expect("covered") - expected).abs() < 1e-6, "x = {}", x);
    }
    assert_eq!(f.max_point(), Some((vec![40], 80.0)));
    assert!(f.size() <= 7);
}

#[test]
fn peak_utility_wraps_around_heading() {
    let mut d = DecisionDomain::new();
    d.add_var("course", 0.0, 359.0, 360).expect("course");
    let wrapped = PeakUtility { wrap: true, ..PeakUtility::new(355.0, 0.0, 20.0) }
        .build(&d, "course")
        .expect("wrapped");
    let flat = PeakUtility::new(355.0, 0.0, 20.0).build(&d, "course").expect("flat");
    assert!((wrapped.eval(&[5]).expect("covered") - 50.0).abs() < 1e-6);
    assert_eq!(flat.eval(&[5]), Some(0.0));
}

#[test]
fn peak_utility_validation() {
    let d = x_domain();
    assert!(PeakUtility::new(10.0, -1.0, 5.0).build(&d, "x").is_err());
    let inverted = PeakUtility {
        min_util: 90.0,
        max_util: 10.0,
        ..PeakUtility::new(10.0, 1.0, 5.0)
    };
    assert!(inverted.validate().is_err());
    let steep = PeakUtility {
        summit_delta: 150.0,
        ..PeakUtility::new(10.0, 1.0, 5.0)
    };
    assert!(steep.validate().is_err());
    assert!(PeakUtility::new(10.0, 1.0, 5.0).build(&d, "y").is_err());
}

#[test]
fn extraction_is_exact_and_minimal_on_linear_runs() {
    let d = x_domain();
    let samples: Vec<f64> = (0..100)
        .map(|x| if x <= 30 { 2.0 * x as f64 } else { 60.0 - 0.5 * (x - 30) as f64 })
        .collect();
    let f = extract_pieces(&d, &samples, 1e-9).expect("extract");
    assert_eq!(f.size(), 2);
    for (x, expected) in samples.iter().enumerate() {
        assert!((f.eval(&[x as u32]).expect("covered") - expected).abs() < 1e-9);
    }
    assert!(extract_pieces(&d, &samples[..10], 1e-9).is_err());
    assert!(extract_pieces(&plane_domain(), &samples, 1e-9).is_err());
}

#[test]
fn extraction_tolerance_absorbs_noise() {
    let d = x_domain();
    let samples: Vec<f64> = (0..100)
        .map(|x| x as f64 + if x % 2 == 0 { 0.01 } else { -0.01 })
        .collect();
    let strict = extract_pieces(&d, &samples, 1e-9).expect("strict");
    let loose = extract_pieces(&d, &samples, 0.1).expect("loose");
    assert!(loose.size() < strict.size());
}

#[test]
fn breakpoints_define_vertices() {
    let d = x_domain();
    let f = from_breakpoints(&d, &[(0, 10.0), (50, 60.0), (99, 11.0)]).expect("breakpoints");
    assert_eq!(f.size(), 2);
    assert_eq!(f.eval(&[0]), Some(10.0));
    assert_eq!(f.eval(&[50]), Some(60.0));
    assert!((f.eval(&[99]).expect("covered") - 11.0).abs() < 1e-9);
    assert!(from_breakpoints(&d, &[(1, 0.0), (99, 0.0)]).is_err());
    assert!(from_breakpoints(&d, &[(0, 0.0), (60, 1.0), (40, 2.0), (99, 0.0)]).is_err());
    assert_eq!(from_breakpoints(&d, &[(0, 4.0), (99, 4.0)]).expect("flat").size(), 1);
}

#[test]
fn chunks_reassemble_out_of_order() {
    let d: DecisionDomain = "course,0,359,360:speed,0,5,51".parse().expect("domain");
    let f = PeakUtility { wrap: true, ..PeakUtility::new(100.0, 10.0, 60.0) }
        .build(&d, "course")
        .expect("course")
        .expand_to(&d)
        .expect("expand");
    let text = encode_function(&f);
    let chunks = encode_chunks(&text, "wpt", 40);
    assert!(chunks.len() > 1);

    let mut assembler = ChunkAssembler::new();
    let mut whole = None;
    for chunk in chunks.iter().rev() {
        if let Some(text) = assembler.push(chunk).expect("chunk") {
            whole = Some(text);
        }
    }
    let whole = whole.expect("all chunks arrived");
    assert_eq!(whole, text);
    assert_eq!(assembler.pending_ids(), 0);
    assert_eq!(encode_function(&decode_function(&whole).expect("decode")), text);

    assert!(assembler.push("wpt,3,2,x").is_err());
    assert!(assembler.push("garbage").is_err());
}
