use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use redlilium_dom::{Dom, DomObject, apply, diff};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Builds a template-shaped document with `count` entities of three
/// components each.
fn template_dom(count: usize, seed: i64) -> Dom {
    let mut entities = DomObject::new();
    for i in 0..count {
        let mut components = DomObject::new();
        components.insert(
            "Transform".into(),
            Dom::from_iter([
                ("x", Dom::Float(i as f64)),
                ("y", Dom::Float(seed as f64)),
                ("z", Dom::Float(0.0)),
            ]),
        );
        components.insert("Health".into(), Dom::from_iter([("value", Dom::Int(seed))]));
        components.insert(
            "Tags".into(),
            Dom::Array(vec![Dom::from("a"), Dom::from("b")]),
        );
        entities.insert(
            format!("Entity_[{i}]"),
            Dom::from_iter([
                ("Id", Dom::Int(i as i64)),
                ("Name", Dom::from(format!("entity {i}"))),
                ("Components", Dom::Object(components)),
            ]),
        );
    }
    Dom::from_iter([
        ("Source", Dom::from("bench.prefab")),
        ("Entities", Dom::Object(entities)),
        ("Instances", Dom::object()),
    ])
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

fn bench_diff_identical_1k(c: &mut Criterion) {
    let a = template_dom(1_000, 1);
    let b = a.clone();
    c.bench_function("diff_identical_1k_entities", |bench| {
        bench.iter(|| black_box(diff(&a, &b)));
    });
}

fn bench_diff_all_changed_1k(c: &mut Criterion) {
    let a = template_dom(1_000, 1);
    let b = template_dom(1_000, 2);
    c.bench_function("diff_all_changed_1k_entities", |bench| {
        bench.iter(|| black_box(diff(&a, &b)));
    });
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

fn bench_apply_1k(c: &mut Criterion) {
    let a = template_dom(1_000, 1);
    let b = template_dom(1_000, 2);
    let patch = diff(&a, &b);
    c.bench_function("apply_patch_1k_entities", |bench| {
        bench.iter_batched(
            || a.clone(),
            |dom| black_box(apply(&dom, &patch)),
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    bench_diff_identical_1k,
    bench_diff_all_changed_1k,
    bench_apply_1k,
);
criterion_main!(benches);
