use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};

use rrc_gc::{
    sim::{SimHost, SimRuntime},
    Collector, Options, OptionsBuilder,
};

/// `count` rings of `size` objects, every other ring held from outside
fn rings(count: usize, size: usize, options: Options) -> (Collector, SimRuntime, SimHost) {
    let mut rt = SimRuntime::new();
    let mut collector = Collector::new(options);
    for i in 0..count {
        let ring = rt.alloc_ring(size);
        if i % 2 == 0 {
            rt.incref(ring[0]);
        }
        for obj in ring {
            collector.track(obj).unwrap();
        }
    }
    (collector, rt, SimHost::new())
}

/// Chain whose links point backwards in set order, the worst case for marking
fn backward_chain(len: usize, options: Options) -> (Collector, SimRuntime, SimHost) {
    let mut rt = SimRuntime::new();
    let mut collector = Collector::new(options);
    let objs: Vec<_> = (0..len).map(|_| rt.alloc()).collect();
    for i in (1..len).rev() {
        rt.add_ref(objs[i], objs[i - 1]);
    }
    rt.incref(objs[len - 1]);
    for obj in objs {
        collector.track(obj).unwrap();
    }
    (collector, rt, SimHost::new())
}

fn bench_full_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_pass");

    for count in [100, 1_000, 10_000] {
        group.throughput(Throughput::Elements((count * 4) as u64));
        group.bench_with_input(BenchmarkId::new("rings", count), &count, |b, &count| {
            b.iter_batched(
                || rings(count, 4, Options::default()),
                |(mut collector, mut rt, mut host)| {
                    host.begin_collection();
                    black_box(collector.collect(&mut rt, &mut host))
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_marking(c: &mut Criterion) {
    let mut group = c.benchmark_group("marking");

    for scans_per_step in [None, Some(1), Some(16)] {
        let name = match scans_per_step {
            Some(scans) => format!("{scans}_scans_per_step"),
            None => "unbounded".to_string(),
        };
        let options = OptionsBuilder::new().scans_per_step(scans_per_step).build();

        group.bench_function(BenchmarkId::new("backward_chain", name), |b| {
            b.iter_batched(
                || backward_chain(200, options.clone()),
                |(mut collector, mut rt, mut host)| {
                    host.begin_collection();
                    black_box(collector.collect(&mut rt, &mut host))
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let options = OptionsBuilder::new().cycle_enabled(false).build();

    c.bench_function("sweep_10000_rings", |b| {
        b.iter_batched(
            || rings(10_000, 4, options.clone()),
            |(mut collector, mut rt, mut host)| {
                host.begin_collection();
                black_box(collector.collect(&mut rt, &mut host))
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_full_pass, bench_marking, bench_sweep);
criterion_main!(benches);
