use isa::{Distribution, Gsm, Isa, IsaError, Parameters, TrainingOutcome};
use ndarray::{array, concatenate, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::f64::consts::LN_2;

fn rotation(angle: f64) -> Array2<f64> {
    let (sin, cos) = angle.sin_cos();
    array![[cos, -sin], [sin, cos]]
}

/// Complete 2-D model with a rotated basis and heavy-tailed GSM sources.
fn generating_model() -> Isa {
    let mut isa = Isa::new(2, None, 1, 2).unwrap();
    isa.set_basis(rotation(std::f64::consts::FRAC_PI_6)).unwrap();
    for gsm in isa.subspaces_mut() {
        gsm.set_scales(array![0.1, 3.0]).unwrap();
        gsm.set_weights(array![0.5, 0.5]).unwrap();
    }
    isa
}

#[test]
fn gsm_variance_is_weighted_sum_of_scales() {
    let mut gsm = Gsm::new(1, 2).unwrap();
    gsm.set_scales(array![0.5, 2.0]).unwrap();
    gsm.set_weights(array![0.5, 0.5]).unwrap();
    assert!((gsm.variance().unwrap() - 1.25).abs() < 1e-12);

    let mut gsm = Gsm::new(3, 4).unwrap();
    gsm.set_scales(array![0.2, 1.0, 5.0, 0.7]).unwrap();
    gsm.set_weights(array![0.1, 0.2, 0.3, 0.4]).unwrap();
    let expected: f64 = gsm
        .scales()
        .iter()
        .zip(gsm.weights().iter())
        .map(|(s, w)| s * w)
        .sum();
    assert!((gsm.variance().unwrap() - expected).abs() < 1e-12);
}

#[test]
fn identity_basis_posterior_returns_data() {
    let mut rng = StdRng::seed_from_u64(0);
    let mut isa = Isa::new(2, Some(2), 1, 4).unwrap();
    isa.set_basis(Array2::eye(2)).unwrap();

    let data = isa.sample(100, &mut rng).unwrap();
    let states = isa.sample_posterior(&data, &mut rng).unwrap();

    let err = (&states - &data).mapv(f64::abs).fold(0.0, |m: f64, &v| m.max(v));
    assert!(err < 1e-12);
}

#[test]
fn complete_posterior_round_trip() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut isa = Isa::new(3, None, 1, 3).unwrap();
    isa.set_basis(array![[1.0, 0.4, -0.2], [0.3, 2.0, 0.1], [-0.5, 0.0, 0.8]])
        .unwrap();

    let data = isa.sample(200, &mut rng).unwrap();
    let states = isa.sample_posterior(&data, &mut rng).unwrap();
    let recon = isa.basis().dot(&states);

    let err = (&recon - &data).mapv(f64::abs).fold(0.0, |m: f64, &v| m.max(v));
    assert!(err < 1e-10, "max reconstruction error {}", err);
}

#[test]
fn evaluate_matches_log_likelihood() {
    let mut rng = StdRng::seed_from_u64(2);
    let isa = generating_model();
    let data = isa.sample(300, &mut rng).unwrap();

    let log_lik = isa.log_likelihood(&data).unwrap();
    let expected = -log_lik.mean().unwrap() / LN_2 / 2.0;
    assert_eq!(isa.evaluate(&data).unwrap(), expected);

    let energy = isa.energy(&data).unwrap();
    assert_eq!(energy, -log_lik);
}

#[test]
fn num_subspaces_is_ceiling() {
    for num_hiddens in 2..8 {
        for size in 1..=num_hiddens {
            let isa = Isa::new(2, Some(num_hiddens), size, 3).unwrap();
            assert_eq!(isa.num_subspaces(), num_hiddens.div_ceil(size));
            assert_eq!(isa.num_hiddens(), num_hiddens);
        }
    }
}

#[test]
fn training_recovers_rotated_sources() {
    let truth = generating_model();
    let mut rng = StdRng::seed_from_u64(3);
    let train = truth.sample(5000, &mut rng).unwrap();
    let test = truth.sample(5000, &mut rng).unwrap();

    let mut model = Isa::new(2, None, 1, 6).unwrap();
    let initial = model.evaluate(&train).unwrap();

    let params = Parameters::builder()
        .max_iter(40)
        .step_width(0.005)
        .adaptive(false)
        .random_state(4)
        .build();
    let summary = model.train(&train, &params).unwrap();

    assert_eq!(summary.n_restored, 0);
    let last = summary.final_bits_per_dim().unwrap();
    assert!(last < initial, "{} >= {}", last, initial);
    assert!(
        summary.bits_per_dim.windows(2).all(|w| w[1] <= w[0] + 1e-6),
        "bits/dim not decreasing: {:?}",
        summary.bits_per_dim
    );

    let trained_bits = model.evaluate(&test).unwrap();
    let true_bits = truth.evaluate(&test).unwrap();
    assert!(
        trained_bits < true_bits + 0.05,
        "trained {} vs true {}",
        trained_bits,
        true_bits
    );

    assert!(model.amari_distance(truth.basis()).unwrap() < 0.05);
}

/// Well-behaved data followed by a batch of huge outliers.
fn data_with_outliers() -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(5);
    let clean = generating_model().sample(900, &mut rng).unwrap();
    let outliers = Array2::from_elem((2, 100), 1e200);
    concatenate(Axis(1), &[clean.view(), outliers.view()]).unwrap()
}

#[test]
fn pocket_restores_basis_after_numerical_failure() {
    let mut isa = Isa::new(2, None, 1, 3).unwrap();
    let initial = isa.basis().clone();
    let data = data_with_outliers();

    let params = Parameters::builder()
        .batch_size(100)
        .shuffle(false)
        .pocket(true)
        .build();

    let mut rng = StdRng::seed_from_u64(6);
    let completed = isa.train_sgd(&data, &initial, &params, &mut rng).unwrap();

    assert!(!completed);
    assert_eq!(isa.basis(), &initial);
    assert!(isa.basis().iter().all(|v| v.is_finite()));
}

#[test]
fn numerical_failure_without_pocket_is_an_error() {
    let mut isa = Isa::new(2, None, 1, 3).unwrap();
    let initial = isa.basis().clone();
    let data = data_with_outliers();

    let params = Parameters::builder()
        .batch_size(100)
        .shuffle(false)
        .pocket(false)
        .build();

    let mut rng = StdRng::seed_from_u64(7);
    let result = isa.train_sgd(&data, &initial, &params, &mut rng);

    assert!(matches!(result, Err(IsaError::NumericalError { .. })));
    assert_eq!(isa.basis(), &initial);
}

#[test]
fn overcomplete_training_runs() {
    let mut rng = StdRng::seed_from_u64(8);
    let data = generating_model().sample(1000, &mut rng).unwrap();

    let mut model = Isa::new(2, Some(3), 1, 4).unwrap();
    let params = Parameters::builder()
        .max_iter(3)
        .gibbs_num_iter(2)
        .random_state(9)
        .build();
    let summary = model.train(&data, &params).unwrap();

    assert_eq!(summary.n_iterations, summary.bits_per_dim.len());
    assert!(summary.n_iterations <= 3);
    assert!(summary.bits_per_dim.iter().all(|b| b.is_finite()));
    assert_eq!(model.basis().dim(), (2, 3));
    assert!(model.basis().iter().all(|v| v.is_finite()));

    let states = model.sample_posterior(&data, &mut rng).unwrap();
    let recon = model.basis().dot(&states);
    let err = (&recon - &data).mapv(f64::abs).fold(0.0, |m: f64, &v| m.max(v));
    assert!(err < 1e-6);
}

#[test]
fn training_is_reproducible_with_seed() {
    let mut rng = StdRng::seed_from_u64(10);
    let data = generating_model().sample(500, &mut rng).unwrap();
    let params = Parameters::builder().max_iter(2).random_state(11).build();

    let mut a = Isa::new(2, Some(3), 1, 3).unwrap();
    let mut b = a.clone();
    let summary_a = a.train(&data, &params).unwrap();
    let summary_b = b.train(&data, &params).unwrap();

    assert_eq!(a.basis(), b.basis());
    assert_eq!(summary_a.bits_per_dim, summary_b.bits_per_dim);
}

#[test]
fn converges_when_nothing_changes() {
    let mut rng = StdRng::seed_from_u64(12);
    let data = generating_model().sample(500, &mut rng).unwrap();

    // no SGD epochs and a loose tolerance: the second round repeats the first
    let params = Parameters::builder()
        .max_iter(5)
        .sgd_max_iter(0)
        .gsm_tol(1e-3)
        .random_state(13)
        .build();

    let mut model = Isa::new(2, None, 1, 3).unwrap();
    let summary = model.train(&data, &params).unwrap();
    assert_eq!(summary.outcome, TrainingOutcome::Converged);
    assert!(summary.n_iterations < 5);
    assert_eq!(model.basis(), &Array2::<f64>::eye(2));
}
