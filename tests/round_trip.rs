use approx::assert_abs_diff_eq;
use pce_rs::{
    fit, ChaosError, JointDistribution, Marginal, OrthogonalBasis, ProjectionStrategy,
    SelectionSettings, SobolIndices, Validation,
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn joint() -> JointDistribution {
    JointDistribution::new(vec![
        Marginal::uniform("u", -3., 5.).unwrap(),
        Marginal::normal("n", 1., 2.).unwrap(),
        Marginal::beta("b", 2., 3., 0., 4.).unwrap(),
        Marginal::log_normal("l", 0.5, 0.3, 1.).unwrap(),
        Marginal::exponential("e", 1.5, 0.).unwrap(),
    ])
    .unwrap()
}

/// Basis positions and coefficients of a polynomial inside the degree-3 basis.
fn truth(basis: &OrthogonalBasis) -> Vec<(usize, f64)> {
    let position = |degrees: Vec<usize>| basis.enumeration().position(&degrees.into()).unwrap();
    vec![
        (position(vec![0, 0, 0, 0, 0]), 4.),
        (position(vec![1, 0, 0, 0, 0]), 1.5),
        (position(vec![0, 2, 0, 0, 0]), -0.8),
        (position(vec![0, 0, 1, 1, 0]), 0.6),
        (position(vec![0, 0, 0, 2, 1]), 0.3),
        (position(vec![1, 0, 0, 0, 2]), -1.1),
    ]
}

fn outputs(basis: &OrthogonalBasis, sample: &pce_rs::Sample, terms: &[(usize, f64)]) -> Vec<f64> {
    sample
        .rows()
        .map(|x| {
            let values = basis.evaluate(x).unwrap();
            terms.iter().map(|&(t, c)| c * values[t]).sum()
        })
        .collect()
}

#[test]
fn exact_polynomial_is_recovered() {
    let joint = joint();
    let basis = OrthogonalBasis::new(&joint, 3).unwrap();
    assert_eq!(basis.size(), 56);
    assert_eq!(
        basis.family_labels(),
        vec!["Legendre", "Hermite", "Jacobi", "Gram-Schmidt", "Laguerre"]
    );
    let terms = truth(&basis);

    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let training = joint.sample(200, &mut rng).unwrap();
    let validation = joint.sample(100, &mut rng).unwrap();
    let y_train = outputs(&basis, &training, &terms);
    let y_valid = outputs(&basis, &validation, &terms);

    for strategy in [ProjectionStrategy::default(), ProjectionStrategy::FullLeastSquares] {
        let result = fit(basis.clone(), &training, &y_train, &strategy).unwrap();
        let metamodel = result.metamodel();
        for &(t, c) in &terms {
            let index = basis.multi_index(t);
            assert_abs_diff_eq!(metamodel.coefficient_of(index).unwrap(), c, epsilon = 1e-8);
        }
        assert_abs_diff_eq!(metamodel.mean(), 4., epsilon = 1e-8);

        let validation = Validation::of(metamodel, &validation, &y_valid).unwrap();
        assert_abs_diff_eq!(validation.q2(), 1., epsilon = 1e-9);

        let expected: f64 = terms[1..].iter().map(|&(_, c)| c * c).sum();
        assert_abs_diff_eq!(metamodel.variance(), expected, epsilon = 1e-8);
        let sobol = SobolIndices::new(metamodel, &joint.names(), 1e-8).unwrap();
        assert_abs_diff_eq!(sobol.first_order(0), 1.5 * 1.5 / expected, epsilon = 1e-8);
        assert_abs_diff_eq!(
            sobol.total_order(4),
            (0.3 * 0.3 + 1.1 * 1.1) / expected,
            epsilon = 1e-8
        );
    }
}

#[test]
fn refitting_is_idempotent() {
    let joint = joint();
    let basis = OrthogonalBasis::new(&joint, 3).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(8);
    let training = joint.sample(120, &mut rng).unwrap();
    let y: Vec<f64> = training
        .rows()
        .map(|x| (0.3 * x[0]).sin() + x[1] * x[4] + (x[3] - 1.).ln())
        .collect();
    let strategy = ProjectionStrategy::Lars(SelectionSettings::default());
    let first = fit(basis.clone(), &training, &y, &strategy).unwrap();
    let second = fit(basis, &training, &y, &strategy).unwrap();
    assert_eq!(first.metamodel().terms(), second.metamodel().terms());
    assert_eq!(first.coefficients(), second.coefficients());
    assert_eq!(first.loo_error(), second.loo_error());
}

#[test]
fn single_sample_is_singular() {
    let joint = joint();
    let basis = OrthogonalBasis::new(&joint, 2).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let training = joint.sample(1, &mut rng).unwrap();
    assert!(matches!(
        fit(basis, &training, &[3.], &ProjectionStrategy::default()),
        Err(ChaosError::SingularDesign { .. })
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn sobol_invariants_hold_for_noisy_fits(seed in any::<u64>(), noise in 0f64..2f64) {
        let joint = joint();
        let basis = OrthogonalBasis::new(&joint, 2).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let training = joint.sample(60, &mut rng).unwrap();
        let y: Vec<f64> = training
            .rows()
            .enumerate()
            .map(|(i, x)| x[0] * x[2] + x[1] + noise * ((i * 7919) % 13) as f64)
            .collect();
        let result = fit(basis, &training, &y, &ProjectionStrategy::default()).unwrap();
        let sobol = SobolIndices::new(result.metamodel(), &joint.names(), 1e-8).unwrap();
        let mut sum = 0.;
        for k in 0..5 {
            let s = sobol.first_order(k);
            let st = sobol.total_order(k);
            prop_assert!(s >= 0.);
            prop_assert!(s <= st + 1e-8);
            prop_assert!(st <= 1. + 1e-8);
            sum += s;
        }
        prop_assert!(sum <= 1. + 1e-8);
    }
}
