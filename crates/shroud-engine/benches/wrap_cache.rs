use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shroud_engine::{notify, wrap, Args, Dict, Id, Object, Source, Value};

struct Host;

impl Object for Host {
    fn type_name(&self) -> &str {
        "Host"
    }
}

fn context() -> Value {
    Value::Source(Source::new(Id::new("bench").into_value(), Value::None, Value::None))
}

fn bench_cache(c: &mut Criterion) {
    let ctx = context();
    let host = Value::object(Host);

    // Keep one proxy alive so every lookup hits.
    let held = wrap(&host, &ctx).unwrap();
    c.bench_function("wrap_cache_hit", |b| {
        b.iter(|| wrap(black_box(&host), black_box(&ctx)).unwrap());
    });
    drop(held);

    c.bench_function("wrap_cache_miss", |b| {
        b.iter(|| {
            let proxy = wrap(black_box(&host), black_box(&ctx)).unwrap();
            drop(proxy);
        });
    });

    c.bench_function("wrap_atomic", |b| {
        let value = Value::Int(42);
        b.iter(|| wrap(black_box(&value), black_box(&ctx)).unwrap());
    });
}

fn bench_containers(c: &mut Criterion) {
    let mut group = c.benchmark_group("containers");
    let ctx = context();

    for size in [8usize, 64, 512, 4096] {
        let hosts: Vec<Value> = (0..size).map(|_| Value::object(Host)).collect();
        let list = Value::list(hosts.iter().cloned());
        let held = wrap(&list, &ctx).unwrap();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("list", size), &list, |b, list| {
            b.iter(|| wrap(black_box(list), black_box(&ctx)).unwrap());
        });
        drop(held);

        let dict = Value::dict(Dict::from_pairs((0..size as i64).map(|i| (Value::Int(i), Value::object(Host)))).unwrap());
        group.bench_with_input(BenchmarkId::new("dict", size), &dict, |b, dict| {
            b.iter(|| wrap(black_box(dict), black_box(&ctx)).unwrap());
        });
    }

    let ids = Value::tuple((0..64).map(|i| Id::new(&format!("n{}/leaf", i)).into_value()));
    group.bench_function("translatable_tuple", |b| {
        b.iter(|| wrap(black_box(&ids), black_box(&ctx)).unwrap());
    });

    group.finish();
}

fn bench_notify(c: &mut Criterion) {
    let source = Source::new(Id::new("bench").into_value(), Value::None, Value::None);
    let subject = Value::Source(source.clone());
    let attr = Value::str("transform");
    let observer = Value::object(Host);
    let callback = Value::function("noop", |_args: Args| Ok(Value::None));

    c.bench_function("notify_register_and_fire", |b| {
        b.iter(|| {
            notify(&subject, &attr, &observer, callback.clone()).unwrap();
            source.set("transform", Value::None).unwrap();
        });
    });
}

criterion_group!(benches, bench_cache, bench_containers, bench_notify);
criterion_main!(benches);
