// Benchmark for schedule planning and a full simulated move
// Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use std::collections::BTreeMap;
use std::hint::black_box;
use std::sync::Arc;
use surf_rs::motion::ChangeManifest;
use surf_rs::{Config, Controller, DeactivationSchedule, Mode, SimulatedClock, SimulatedPinDriver};

const BOAT: &str = r#"
    [[surfaces]]
    name = "PORT"
    goofy = "STARBOARD"
    pins = { extend = 17, retract = 27 }

    [[surfaces]]
    name = "CENTER"
    pins = { extend = 5, retract = 6 }

    [[surfaces]]
    name = "STARBOARD"
    goofy = "PORT"
    pins = { extend = 22, retract = 23 }

    [travel_durations.wet.1]
    deploy = 10.0
    withdraw = 8.0
    [travel_durations.wet.2]
    deploy = 12.0
    withdraw = 9.0
    [travel_durations.wet.3]
    deploy = 15.0
    withdraw = 10.0
"#;

fn bench_schedule(c: &mut Criterion) {
    let travels: BTreeMap<String, f64> = (0..16)
        .map(|i| (format!("S{}", i), ((i % 7) + 1) as f64 / 7.0))
        .collect();
    c.bench_function("schedule 16 surfaces", |b| {
        b.iter(|| DeactivationSchedule::from_travels(black_box(&travels)))
    });

    let current: BTreeMap<String, f64> = travels.keys().map(|k| (k.clone(), 0.5)).collect();
    c.bench_function("manifest + schedule 16 surfaces", |b| {
        b.iter(|| {
            let manifest = ChangeManifest::build(black_box(&current), black_box(&travels)).unwrap();
            manifest.schedule()
        })
    });
}

fn bench_simulated_move(c: &mut Criterion) {
    let config = Config::from_toml(BOAT).unwrap();
    let clock = Arc::new(SimulatedClock::new());
    let controller = Controller::new(&config, Arc::new(SimulatedPinDriver::new()), clock.clone()).unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let out: BTreeMap<String, f64> = [("PORT", 0.8), ("CENTER", 0.3), ("STARBOARD", 0.55)]
        .into_iter()
        .map(|(n, t)| (n.to_string(), t))
        .collect();
    let home: BTreeMap<String, f64> = out.keys().map(|k| (k.clone(), 0.0)).collect();

    c.bench_function("simulated out-and-back move", |b| {
        b.iter(|| {
            rt.block_on(async {
                controller.move_to(&out, Mode::Deploy).await.unwrap();
                controller.move_to(&home, Mode::Withdraw).await.unwrap();
            });
            clock.clear();
        });
    });
}

criterion_group!(benches, bench_schedule, bench_simulated_move);
criterion_main!(benches);
