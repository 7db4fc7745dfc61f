use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use flint_db::{Database, OpenOptions};
use serde_json::json;

fn seeded_db(n: usize) -> Database {
    let db = Database::open_in_memory(OpenOptions::default()).unwrap();
    let people = db.collection("people", None).unwrap();
    for i in 0..n {
        people
            .insert(json!({"name": format!("person-{i}"), "tags": ["fan", "springfield", format!("tag-{i}")]}))
            .unwrap();
    }
    db
}

fn bench_ensure_array_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_index/ensure");
    for n in [100usize, 1_000] {
        group.bench_function(format!("{n}_docs"), |b| {
            b.iter_batched(
                || seeded_db(n),
                |db| {
                    let people = db.collection("people", None).unwrap();
                    people.ensure_array_index("tags", None).unwrap();
                },
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn bench_insert_with_trigger(c: &mut Criterion) {
    let db = seeded_db(1_000);
    let people = db.collection("people", None).unwrap();
    people.ensure_array_index("tags", None).unwrap();

    c.bench_function("array_index/insert_with_trigger", |b| {
        b.iter(|| {
            people.insert(json!({"name": "new-arrival", "tags": ["fan", "springfield", "fresh"]})).unwrap();
        })
    });
}

fn bench_indexed_in_query(c: &mut Criterion) {
    let db = seeded_db(1_000);
    let people = db.collection("people", None).unwrap();
    people.ensure_array_index("tags", None).unwrap();

    c.bench_function("array_index/indexed_in_query", |b| {
        b.iter(|| people.find(&json!({"tags": {"$in": ["springfield"]}}), None).unwrap())
    });
}

criterion_group!(benches, bench_ensure_array_index, bench_insert_with_trigger, bench_indexed_in_query);
criterion_main!(benches);
