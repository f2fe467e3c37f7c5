//! Benchmarks for the reaction-diffusion simulation on the CPU program.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use reaction_diffusion::{
    compute::{BufferExchange, BufferSettings, CpuProgram, Simulation},
    schema::{Seed, SimulationParameters},
};

fn ready_simulation(params: &SimulationParameters, settings: BufferSettings) -> Simulation<CpuProgram> {
    let init_map = Seed::default().generate(params.width, params.height);
    let mut sim = Simulation::new(CpuProgram::new(), &init_map, settings).unwrap();
    sim.init(params).unwrap();
    sim
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("step");

    for size in [64, 128, 256, 512] {
        let params = SimulationParameters {
            width: size,
            height: size,
            ..Default::default()
        };
        let mut sim = ready_simulation(&params, BufferSettings::default());

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", size, size)),
            &size,
            |b, _| {
                b.iter(|| {
                    sim.step(black_box(&params)).unwrap();
                });
            },
        );
    }

    group.finish();
}

fn bench_diffuse_radius(c: &mut Criterion) {
    let mut group = c.benchmark_group("diffuse_radius");

    for radius in [2, 4, 8] {
        let params = SimulationParameters {
            width: 128,
            height: 128,
            diffuse_radius: radius,
            ..Default::default()
        };
        let mut sim = ready_simulation(&params, BufferSettings::default());

        group.bench_with_input(BenchmarkId::from_parameter(radius), &radius, |b, _| {
            b.iter(|| {
                sim.step(black_box(&params)).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_exchange(c: &mut Criterion) {
    let mut group = c.benchmark_group("exchange");
    let params = SimulationParameters {
        width: 256,
        height: 256,
        ..Default::default()
    };

    for exchange in [BufferExchange::Copy, BufferExchange::Swap] {
        let settings = BufferSettings {
            exchange,
            ..Default::default()
        };
        let mut sim = ready_simulation(&params, settings);

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", exchange)),
            &exchange,
            |b, _| {
                b.iter(|| {
                    sim.step(black_box(&params)).unwrap();
                    sim.refresh(black_box(&params)).unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_step, bench_diffuse_radius, bench_exchange);
criterion_main!(benches);
