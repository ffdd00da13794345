use helmsman::core::compactor::ExclusionCompactor;
use helmsman::core::domain::DecisionDomain;
use helmsman::core::encoding::{parse_problem, write_problem};
use helmsman::core::error::HelmError;
use helmsman::core::extract::from_breakpoints;
use helmsman::core::function::ObjectiveFunction;
use helmsman::core::piece::{IndexBox, Piece};
use helmsman::core::solver::Problem;
use helmsman::core::zaic::PeakUtility;

fn x_domain() -> DecisionDomain {
    let mut d = DecisionDomain::new();
    d.add_var("x", 0.0, 99.0, 100).expect("x");
    d
}

/// Course and speed peaks summed over the joint domain.
fn heading_speed_peak(
    domain: &DecisionDomain,
    course: f64,
    speed: f64,
    base_width: f64,
) -> ObjectiveFunction {
    let course_fn = PeakUtility::new(course, 0.0, base_width)
        .build(domain, "course")
        .expect("course peak");
    let speed_fn = PeakUtility::new(speed, 0.0, 1.0)
        .build(domain, "speed")
        .expect("speed peak");
    course_fn
        .expand_to(domain)
        .expect("expand")
        .add(&speed_fn)
        .expect("sum")
}

/// Deterministic pseudo-random sequence for generated problems.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

fn random_function(domain: &DecisionDomain, rng: &mut Lcg) -> ObjectiveFunction {
    let axis = |name: &str, rng: &mut Lcg| {
        let sub = domain.subdomain(&[name]).expect("sub");
        let last = sub.vars()[0].points() - 1;
        let mut cuts: Vec<u32> = (0..3).map(|_| 1 + rng.below(last as u64 - 1) as u32).collect();
        cuts.sort_unstable();
        cuts.dedup();
        let mut vertices = vec![(0u32, rng.below(60) as f64)];
        vertices.extend(cuts.into_iter().map(|c| (c, rng.below(60) as f64)));
        vertices.push((last, rng.below(60) as f64));
        from_breakpoints(&sub, &vertices).expect("breakpoints")
    };
    let a = axis("a", rng);
    let b = axis("b", rng);
    let mut f = a.expand_to(domain).expect("expand").add(&b).expect("sum");
    f.set_priority(1.0 + rng.below(100) as f64);
    f
}

fn ab_domain() -> DecisionDomain {
    "a,0,29,30:b,0,19,20".parse().expect("domain")
}

#[test]
fn single_peak_is_found_exactly() {
    let d = x_domain();
    let peak = from_breakpoints(&d, &[(0, 0.0), (50, 1.0), (99, 0.0)]).expect("peak");
    let mut p = Problem::new(d);
    assert!(p.add_function(peak.with_priority(100.0)));
    let s = p.solve().expect("solve");
    assert_eq!(s.point, vec![50]);
    assert!((s.value - 100.0).abs() < 1e-9);
    assert_eq!(p.result("x"), Some(50.0));
    assert_eq!(s.values(p.domain()), vec![("x".to_string(), 50.0)]);
}

#[test]
fn heavier_of_two_disjoint_peaks_wins() {
    let d: DecisionDomain = "course,0,359,360:speed,0,5,51".parse().expect("domain");
    let mut p = Problem::new(d.clone());
    p.add_function(heading_speed_peak(&d, 270.0, 4.0, 30.0).with_priority(50.0));
    p.add_function(heading_speed_peak(&d, 90.0, 2.0, 30.0).with_priority(100.0));
    let s = p.solve().expect("solve");
    assert_eq!(p.result("course"), Some(90.0));
    assert_eq!(p.result("speed"), Some(2.0));
    assert_eq!(s.point, vec![90, 20]);
    assert!((s.value - 10_000.0).abs() < 1e-6);
}

#[test]
fn overlapping_peaks_match_brute_force() {
    let d: DecisionDomain = "course,0,35,36:speed,0,5,6".parse().expect("domain");
    let mut p = Problem::new(d.clone());
    p.add_function(heading_speed_peak(&d, 12.0, 3.0, 15.0).with_priority(50.0));
    p.add_function(heading_speed_peak(&d, 20.0, 2.0, 10.0).with_priority(100.0));
    let s = p.solve().expect("solve");

    let mut best = f64::NEG_INFINITY;
    for c in 0..36u32 {
        for v in 0..6u32 {
            let total: f64 = p
                .functions()
                .iter()
                .map(|f| f.eval(&[c, v]).expect("covered"))
                .sum();
            best = best.max(total);
        }
    }
    assert!((s.value - best).abs() < 1e-6, "solver {} vs brute force {}", s.value, best);
    let at_solution: f64 = p
        .functions()
        .iter()
        .map(|f| f.eval(&s.point).expect("covered"))
        .sum();
    assert!((at_solution - best).abs() < 1e-6);
}

#[test]
fn non_positive_weights_do_not_affect_the_result() {
    let d = x_domain();
    let peak = |at: u32| from_breakpoints(&d, &[(0, 0.0), (at, 1.0), (99, 0.0)]).expect("peak");
    let mut p = Problem::new(d.clone());
    assert!(p.add_function(peak(30).with_priority(10.0)));
    assert!(!p.add_function(peak(80).with_priority(0.0)));
    assert!(!p.add_function(peak(80).with_priority(-5.0)));
    assert_eq!(p.function_count(), 1);
    assert_eq!(p.solve().expect("solve").point, vec![30]);
}

#[test]
fn wide_ranges_are_normalized_before_weighting() {
    let d = x_domain();
    let loud = from_breakpoints(&d, &[(0, 0.0), (10, 5000.0), (99, 0.0)]).expect("loud");
    let quiet = from_breakpoints(&d, &[(0, 0.0), (70, 100.0), (99, 0.0)]).expect("quiet");
    let mut p = Problem::new(d);
    p.add_function(loud.with_priority(1.0));
    p.add_function(quiet.with_priority(2.0));
    let (_, hi) = p.functions()[0].value_range().expect("range");
    assert!((hi - 100.0).abs() < 1e-9);
    assert_eq!(p.solve().expect("solve").point, vec![70]);
}

#[test]
fn pruned_and_full_tree_search_agree() {
    let d = ab_domain();
    let mut rng = Lcg(0x5eed);
    for round in 0..40 {
        let count = 1 + rng.below(4) as usize;
        let functions: Vec<ObjectiveFunction> = (0..count).map(|_| random_function(&d, &mut rng)).collect();

        let mut pruned = Problem::new(d.clone());
        let mut full = Problem::new(d.clone());
        for f in &functions {
            pruned.add_function(f.clone());
            full.add_function(f.clone());
        }
        full.set_full_tree(true);
        let a = pruned.solve().expect("pruned");
        let b = full.solve().expect("full");
        assert!(
            (a.value - b.value).abs() < 1e-6,
            "round {}: pruned {} vs full {}",
            round,
            a.value,
            b.value
        );
        assert_eq!(full.stats().bound_prunes, 0);
        assert!(pruned.stats().leaves_visited <= full.stats().leaves_visited);
    }
}

#[test]
fn thresh_accepts_near_optimal_solutions() {
    let d = ab_domain();
    let mut rng = Lcg(42);
    let functions: Vec<ObjectiveFunction> = (0..3).map(|_| random_function(&d, &mut rng)).collect();

    let mut exact = Problem::new(d.clone());
    let mut loose = Problem::new(d.clone());
    for f in &functions {
        exact.add_function(f.clone());
        loose.add_function(f.clone());
    }
    loose.set_thresh(80.0).expect("thresh");
    let best = exact.solve().expect("exact").value;
    let near = loose.solve().expect("loose").value;
    assert!(near <= best + 1e-9);
    assert!(near >= 0.8 * best - 1e-6, "{} is not within 80% of {}", near, best);
    assert!(loose.set_thresh(0.0).is_err());
    assert!(loose.set_thresh(-3.0).is_err());
}

#[test]
fn mismatched_universes_are_rejected() {
    let d = ab_domain();
    let sub = d.subdomain(&["b"]).expect("sub");
    let mut p = Problem::new(d.clone());
    p.add_function(ObjectiveFunction::constant(sub.clone(), 1.0).expect("constant"));
    assert!(matches!(p.solve(), Err(HelmError::UniverseMismatch(_))));

    p.align_functions().expect("align");
    assert!(p.solve().is_ok());

    let mut empty = Problem::new(d);
    assert!(matches!(empty.solve(), Err(HelmError::NothingToDecide)));
}

#[test]
fn exclusion_compactor_keeps_solution_outside_forbidden_box() {
    let d = x_domain();
    let f = ObjectiveFunction::new(
        d.clone(),
        vec![
            Piece::new(IndexBox::new(&[(0, 39)]).expect("box"), vec![1.0, 0.0]).expect("rise"),
            Piece::constant(IndexBox::new(&[(40, 59)]).expect("box"), 100.0),
            Piece::new(IndexBox::new(&[(60, 99)]).expect("box"), vec![-1.0, 130.0]).expect("fall"),
        ],
    )
    .expect("function")
    .with_priority(1.0);

    let mut open = Problem::new(d.clone());
    open.add_function(f.clone());
    assert_eq!(open.solve().expect("open").point, vec![40]);

    let forbidden = IndexBox::new(&[(40, 59)]).expect("forbidden");
    let mut fenced = Problem::new(d).with_compactor(Box::new(ExclusionCompactor::new(vec![forbidden.clone()])));
    fenced.add_function(f);
    let s = fenced.solve().expect("fenced");
    assert!(!forbidden.contains_point(&s.point));
    assert_eq!(s.point, vec![60]);
    assert!((s.value - 70.0).abs() < 1e-9);
}

#[test]
fn exclusion_compactor_finds_interior_point_of_partly_fenced_piece() {
    let d = x_domain();
    let rise = ObjectiveFunction::new(
        d.clone(),
        vec![Piece::new(IndexBox::new(&[(0, 99)]).expect("box"), vec![1.0, 0.0]).expect("rise")],
    )
    .expect("function")
    .with_priority(1.0);

    let forbidden = IndexBox::new(&[(80, 99)]).expect("forbidden");
    let mut fenced = Problem::new(d).with_compactor(Box::new(ExclusionCompactor::new(vec![forbidden])));
    fenced.add_function(rise);
    let s = fenced.solve().expect("fenced");
    assert_eq!(s.point, vec![79]);
    assert!((s.value - 79.0).abs() < 1e-9);
}

#[test]
fn seed_point_becomes_first_incumbent() {
    let d = x_domain();
    let f = from_breakpoints(&d, &[(0, 0.0), (64, 1.0), (99, 0.0)]).expect("peak");
    let mut p = Problem::new(d);
    p.add_function(f);
    p.set_seed(vec![64]);
    let s = p.solve().expect("solve");
    assert_eq!(s.point, vec![64]);
    assert_eq!(p.stats().leaves_visited, 0);
}

#[test]
fn problem_files_parse_and_solve() {
    let d = ab_domain();
    let mut rng = Lcg(7);
    let functions: Vec<ObjectiveFunction> = (0..3).map(|_| random_function(&d, &mut rng)).collect();
    let text = write_problem(&d, &functions);

    let mut direct = Problem::new(d);
    for f in functions {
        direct.add_function(f);
    }
    let expected = direct.solve().expect("direct").value;

    let mut parsed = parse_problem(&text).expect("parse");
    assert_eq!(parsed.function_count(), 3);
    let got = parsed.solve().expect("parsed").value;
    assert!((got - expected).abs() < 1e-6);
}

#[test]
fn problem_file_aligns_subdomain_functions() {
    let text = "\
// two functions over a shared domain
domain = a,0,9,10:b,0,4,5
ipf = domain=b,0,4,5#pwt=1#degree=1#piece=0,4/1,0
ipf = domain=a,0,9,10#pwt=2#degree=1#piece=0,9/-1,9
";
    let mut p = parse_problem(text).expect("parse");
    let s = p.solve().expect("solve");
    assert_eq!(s.point, vec![0, 4]);
    assert!((s.value - 22.0).abs() < 1e-9);
    assert!(parse_problem("domain = a,0,9,10\nbogus = 1").is_err());
}
