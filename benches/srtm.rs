use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kineticmodel::prelude::*;
use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};

fn voxels(n: usize) -> KineticData {
    let dt = Array1::from_vec(
        [(0.25, 8), (0.5, 8), (1.0, 10), (2.0, 10), (5.0, 8)]
            .iter()
            .flat_map(|&(d, k)| std::iter::repeat(d).take(k))
            .collect(),
    );
    let mut start = 0.0;
    let t = dt.mapv(|d| {
        let m = start + d / 2.0;
        start += d;
        m
    });
    let r = t.mapv(|x| 10.0 * x * (-0.25 * x).exp() + 0.5);
    let clean = srtm_tac(t.view(), r.view(), 1.5, 1.1, 0.3, StartActivity::Flat).unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    let noise = Normal::new(0.0, 0.05).unwrap();
    let tac = Array2::from_shape_fn((n, t.len()), |(_, f)| {
        clean[f] * (1.0 + noise.sample(&mut rng))
    });
    let time = TimeGrid::minutes(t, dt).unwrap();
    KineticData::builder(time, tac, r).build().unwrap()
}

fn estimators_benchmark(c: &mut Criterion) {
    let many = voxels(1000);
    c.bench_function("Zhou2003 1000 voxels", |b| {
        b.iter(|| {
            let mut model = SrtmZhou2003::new(many.clone());
            model.fit().unwrap();
            black_box(model);
        })
    });

    c.bench_function("Gunn1997 1000 voxels", |b| {
        b.iter(|| {
            let mut model = SrtmGunn1997::new(many.clone());
            model.fit().unwrap();
            black_box(model);
        })
    });

    let few = voxels(8);
    c.bench_function("Lammertsma1996 8 voxels", |b| {
        b.iter(|| {
            let mut model = SrtmLammertsma1996::new(few.clone())
                .with_options(BasinHoppingOptions::default().with_niter(10));
            model.fit().unwrap();
            black_box(model);
        })
    });
}

criterion_group!(benches, estimators_benchmark);
criterion_main!(benches);
