use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use logos_ontology::{
    EntityId, EntityQuery, Ontology, RelationBuilder, RelationContext, RelationId, TruthValue,
};

/// A linear hierarchy `LEVEL_0 <- LEVEL_1 <- ... <- LEVEL_{depth-1}`.
fn deep_hierarchy(depth: usize) -> (Ontology, EntityId) {
    let mut ontology = Ontology::new();
    ontology.add_predicate::<&str>("HOLDS", &[]).unwrap();
    let root = ontology.add_entity("LEVEL_0", "NOUN", &[], None).unwrap();
    let mut parent = root;
    for level in 1..depth {
        parent = ontology
            .add_entity(&format!("LEVEL_{level}"), "NOUN", &[parent], None)
            .unwrap();
    }
    (ontology, root)
}

/// A chain of relations, each taking its truth from the previous one.
fn context_chain(length: usize) -> (Ontology, RelationId) {
    let mut ontology = Ontology::new();
    let subject = ontology.add_entity("SUBJECT", "NOUN", &[], None).unwrap();
    ontology.add_predicate::<&str>("LINK", &[]).unwrap();
    let root = ontology
        .add_relation(
            RelationBuilder::new("LINK")
                .role("subject", subject)
                .truth(TruthValue::TRUE),
        )
        .unwrap();
    let mut previous = root;
    for _ in 1..length {
        previous = ontology
            .add_relation(
                RelationBuilder::new("LINK")
                    .role("subject", subject)
                    .context(!RelationContext::relation(previous)),
            )
            .unwrap();
    }
    (ontology, root)
}

fn bench_hierarchy_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("hierarchy_propagation");
    group.throughput(Throughput::Elements(128));

    group.bench_function("assert_at_root_depth_128", |b| {
        b.iter_batched(
            || deep_hierarchy(128),
            |(mut ontology, root)| {
                ontology
                    .add_relation(RelationBuilder::new("HOLDS").role("subject", root))
                    .unwrap()
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_truth_cascade(c: &mut Criterion) {
    let mut group = c.benchmark_group("truth_cascade");
    group.throughput(Throughput::Elements(256));

    group.bench_function("flip_root_chain_256", |b| {
        let (mut ontology, root) = context_chain(256);
        let mut truth = false;
        b.iter(|| {
            truth = !truth;
            ontology
                .set_truth_value(root, TruthValue::from(truth))
                .unwrap()
        });
    });

    group.bench_function("evaluate_tail_chain_256", |b| {
        let (ontology, _) = context_chain(256);
        let tail = ontology.relations().last().map(|r| r.id).unwrap();
        b.iter(|| ontology.evaluate_truth(black_box(tail)).unwrap());
    });

    group.finish();
}

fn bench_entity_query(c: &mut Criterion) {
    let (ontology, root) = deep_hierarchy(128);
    c.bench_function("entity_query/pattern_and_descendant", |b| {
        let query = EntityQuery::new()
            .name_pattern("^LEVEL_1[0-9]$")
            .descendant_of(root);
        b.iter(|| ontology.query_entities(black_box(&query)).unwrap().len());
    });
}

criterion_group!(
    propagation,
    bench_hierarchy_propagation,
    bench_truth_cascade,
    bench_entity_query
);
criterion_main!(propagation);
