use std::hint::black_box;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use isa::{Distribution, Gsm, Isa, Parameters};
use ndarray::{array, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn generate_data(n_features: usize, n_samples: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut source = Isa::new(n_features, None, 1, 2).expect("valid model");
    for gsm in source.subspaces_mut() {
        gsm.set_scales(array![0.1, 3.0]).expect("valid scales");
    }

    // Mix with random matrix
    let mixing = isa::utils::sample_normal(n_features, n_features, &mut rng);
    source.set_basis(mixing).expect("finite basis");
    source.sample(n_samples, &mut rng).expect("sampling succeeds")
}

fn bench_gsm(c: &mut Criterion) {
    let mut group = c.benchmark_group("gsm");

    for n_samples in [1000, 10000] {
        for dim in [1, 4] {
            let data = generate_data(dim, n_samples, 42);

            group.bench_with_input(
                BenchmarkId::new(format!("{}x{}", dim, n_samples), "10scales"),
                &data,
                |b, data| {
                    b.iter(|| {
                        let mut gsm = Gsm::new(dim, 10).expect("valid model");
                        gsm.train(black_box(data), 100, 1e-8)
                    })
                },
            );
        }
    }

    group.finish();
}

fn bench_isa(c: &mut Criterion) {
    let mut group = c.benchmark_group("isa");
    let params = Parameters::builder().max_iter(5).random_state(42).build();

    for n_samples in [1000, 5000] {
        for (n_visibles, n_hiddens) in [(8, 8), (8, 12), (16, 16)] {
            let data = generate_data(n_visibles, n_samples, 42);

            group.bench_with_input(
                BenchmarkId::new(
                    format!("{}x{}", n_visibles, n_samples),
                    format!("{}hid", n_hiddens),
                ),
                &data,
                |b, data| {
                    b.iter(|| {
                        let mut model =
                            Isa::new(n_visibles, Some(n_hiddens), 2, 10).expect("valid model");
                        model.train(black_box(data), &params)
                    })
                },
            );
        }
    }

    group.finish();
}

fn criterion_config() -> Criterion {
    Criterion::default()
        .measurement_time(std::time::Duration::from_secs(15))
        .sample_size(20)
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_gsm, bench_isa
}
criterion_main!(benches);
