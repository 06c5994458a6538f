use criterion::{criterion_group, criterion_main, Criterion};
use expoprop::{
    test_models::{chain, rabi},
    AdaptiveConfig, AdaptiveTimeStepper, EquidistantTimeStepper, ExpmvConfig, Scheme,
    TimeStepper,
};

fn criterion_benchmark(c: &mut Criterion) {
    macro_rules! bench_equidistant {
        ($name:ident, $preset:literal, $n:literal) => {
            c.bench_function(stringify!($name), |b| {
                let op = chain::operator($n);
                let scheme = Scheme::preset($preset).unwrap();
                b.iter(|| {
                    let mut stepper = EquidistantTimeStepper::new(
                        &op,
                        scheme.clone(),
                        chain::initial_state($n),
                        0.0,
                        1.0,
                        0.05,
                        ExpmvConfig::default(),
                    )
                    .unwrap();
                    while stepper.advance().unwrap().is_some() {}
                    stepper.into_psi()
                })
            });
        };
    }

    macro_rules! bench_adaptive {
        ($name:ident, $preset:literal) => {
            c.bench_function(stringify!($name), |b| {
                let op = rabi::operator();
                let scheme = Scheme::preset($preset).unwrap();
                b.iter(|| {
                    let mut stepper = AdaptiveTimeStepper::new(
                        &op,
                        scheme.clone(),
                        rabi::initial_state(),
                        0.0,
                        5.0,
                        0.1,
                        AdaptiveConfig::default().with_tol(1e-8),
                        ExpmvConfig::default(),
                    )
                    .unwrap();
                    while stepper.advance().unwrap().is_some() {}
                    stepper.into_psi()
                })
            });
        };
    }

    bench_equidistant!(cf2_chain_100, "CF2", 100);
    bench_equidistant!(cf4_chain_100, "CF4", 100);
    bench_equidistant!(cf4o_chain_100, "CF4o", 100);
    bench_equidistant!(cf6_chain_100, "CF6", 100);
    bench_equidistant!(magnus4_chain_100, "Magnus4", 100);
    bench_equidistant!(dopri45_chain_100, "DoPri45", 100);
    bench_equidistant!(cf4_chain_1000, "CF4", 1000);

    bench_adaptive!(adaptive_cf4_rabi, "CF4");
    bench_adaptive!(adaptive_cf4o_rabi, "CF4o");
    bench_adaptive!(adaptive_magnus4_rabi, "Magnus4");
    bench_adaptive!(adaptive_tsit45_rabi, "Tsit45");
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
