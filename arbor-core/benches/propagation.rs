//! Propagation cost through a derivation chain.

use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;

use arbor_core::{DerivedValue, Node, Reaction, Scheduler, Schema};

fn leaf_write(c: &mut Criterion) {
    let s = Scheduler::new();
    let root = Node::tree(
        &s,
        Schema::record([("n", Schema::Number)]),
        json!({"n": 0}),
    )
    .unwrap();
    let mut i = 0i64;
    c.bench_function("leaf_write_no_reactors", |b| {
        b.iter(|| {
            i += 1;
            s.transaction(|| {
                root.write("n", json!(i)).unwrap();
            });
        })
    });
}

fn chain_propagation(c: &mut Criterion) {
    let s = Scheduler::new();
    let root = Node::tree(
        &s,
        Schema::record([("n", Schema::Number)]),
        json!({"n": 0}),
    )
    .unwrap();
    // n -> d1 -> d2 -> d3 -> reaction
    let mut prev = {
        let root = root.clone();
        DerivedValue::new(&s, move || {
            json!(root.get("n").unwrap().as_i64().unwrap_or(0) + 1)
        })
    };
    for _ in 0..2 {
        let upstream = prev.clone();
        prev = DerivedValue::new(&s, move || {
            json!(upstream.get().as_i64().unwrap_or(0) + 1)
        });
    }
    let _sink = {
        let tail = prev.clone();
        Reaction::new(&s, move || {
            let _ = tail.get();
        })
    };
    let mut i = 0i64;
    c.bench_function("write_through_three_derivations", |b| {
        b.iter(|| {
            i += 1;
            s.transaction(|| {
                root.write("n", json!(i)).unwrap();
            });
        })
    });
}

fn snapshot_wide_tree(c: &mut Criterion) {
    let s = Scheduler::new();
    let mut value = serde_json::Map::new();
    for i in 0..64 {
        value.insert(format!("k{i}"), json!(i));
    }
    let root = Node::tree(&s, Schema::map(Schema::Number), value.into()).unwrap();
    c.bench_function("snapshot_64_leaves", |b| b.iter(|| root.snapshot()));
}

criterion_group!(benches, leaf_write, chain_propagation, snapshot_wide_tree);
criterion_main!(benches);
