use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use orbit::{Manager, TopicMeta};

fn benchmark_publish_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("Node_Publish");

    for payload_size in [8usize, 64, 256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*payload_size as u64));
        group.bench_with_input(
            BenchmarkId::new("publish", payload_size),
            payload_size,
            |b, &payload_size| {
                let bus = Manager::new();
                let meta = TopicMeta::new(format!("bench_pub_{}", payload_size), payload_size);
                let data = vec![0u8; payload_size];
                let advert = bus.advertise(&meta, &data, 1).unwrap();

                b.iter(|| {
                    bus.publish(&meta, &advert, &data).unwrap();
                });
            },
        );
    }

    group.finish();
}

fn benchmark_publish_copy_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("Node_PublishCopy");

    for payload_size in [8usize, 256, 4096].iter() {
        group.throughput(Throughput::Bytes(*payload_size as u64 * 2));
        group.bench_with_input(
            BenchmarkId::new("cycle", payload_size),
            payload_size,
            |b, &payload_size| {
                let bus = Manager::new();
                let meta = TopicMeta::new(format!("bench_cycle_{}", payload_size), payload_size);
                let data = vec![0u8; payload_size];
                let advert = bus.advertise(&meta, &data, 1).unwrap();
                let sub = bus.subscribe(&meta).unwrap();
                let mut out = vec![0u8; payload_size];

                b.iter(|| {
                    bus.publish(&meta, &advert, &data).unwrap();
                    bus.copy(&meta, sub, &mut out).unwrap();
                });
            },
        );
    }

    group.finish();
}

fn benchmark_queue_depths(c: &mut Criterion) {
    let mut group = c.benchmark_group("Node_QueueDepth");
    let payload_size = 64;

    for depth in [1u32, 4, 16, 64].iter() {
        group.bench_with_input(BenchmarkId::new("burst", depth), depth, |b, &depth| {
            let bus = Manager::new();
            let meta = TopicMeta::new(format!("bench_depth_{}", depth), payload_size);
            let data = vec![0u8; payload_size];
            let advert = bus.advertise(&meta, &data, depth).unwrap();
            let sub = bus.subscribe(&meta).unwrap();
            let mut out = vec![0u8; payload_size];

            b.iter(|| {
                for _ in 0..depth {
                    bus.publish(&meta, &advert, &data).unwrap();
                }
                while bus.copy(&meta, sub, &mut out).is_ok() {}
            });
        });
    }

    group.finish();
}

fn benchmark_check_cost(c: &mut Criterion) {
    let mut group = c.benchmark_group("Node_Check");

    group.bench_function("check_no_update", |b| {
        let bus = Manager::new();
        let meta = TopicMeta::new("bench_check", 64);
        let advert = bus.advertise(&meta, &[0u8; 64], 1).unwrap();
        let sub = bus.subscribe(&meta).unwrap();
        bus.publish(&meta, &advert, &[0u8; 64]).unwrap();
        let mut out = [0u8; 64];
        bus.copy(&meta, sub, &mut out).unwrap();

        b.iter(|| bus.check(sub).unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_publish_throughput,
    benchmark_publish_copy_cycle,
    benchmark_queue_depths,
    benchmark_check_cost
);
criterion_main!(benches);
