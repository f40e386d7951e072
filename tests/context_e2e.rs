use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use logos_ontology::{
    Context, EntityId, LogosError, Ontology, RelationBuilder, RelationContext, RelationId,
    TruthCallback, TruthState, TruthValue, ValidationError,
};

struct Scene {
    ontology: Ontology,
    dex: EntityId,
    a: RelationId,
    b: RelationId,
    c: RelationId,
}

fn scene() -> Scene {
    let mut ontology = Ontology::new();
    let dex = ontology.add_entity("DEX", "PROPER_NOUN", &[], None).unwrap();
    for name in ["A", "B", "C", "D", "E"] {
        ontology.add_predicate(name, &["subject"]).unwrap();
    }
    let mut fact = |name: &str, truth: TruthValue| {
        ontology
            .add_relation(RelationBuilder::new(name).role("subject", dex).truth(truth))
            .unwrap()
    };
    let a = fact("A", TruthValue::TRUE);
    let b = fact("B", TruthValue::FALSE);
    let c = fact("C", TruthValue::FALSE);
    Scene { ontology, dex, a, b, c }
}

#[test]
fn expression_follows_its_leaves() {
    let mut s = scene();
    let expr = RelationContext::relation(s.a)
        & (!RelationContext::relation(s.c) | RelationContext::relation(s.b));
    assert_eq!(expr.to_string(), format!("({} AND (NOT {} OR {}))", s.a, s.c, s.b));

    let d = s
        .ontology
        .add_relation(RelationBuilder::new("D").role("subject", s.dex).context(expr))
        .unwrap();
    assert_eq!(s.ontology.evaluate_truth(d).unwrap(), TruthState::True);
    assert_eq!(s.ontology.relation(d).unwrap().truth_value().evaluate(), TruthState::True);

    // Flipping a leaf re-evaluates the dependent.
    assert!(s.ontology.set_truth_value(s.a, TruthValue::FALSE).unwrap());
    assert_eq!(s.ontology.evaluate_truth(d).unwrap(), TruthState::False);
    assert_eq!(s.ontology.relation(d).unwrap().truth_value().evaluate(), TruthState::False);

    s.ontology.set_truth_value(s.a, TruthValue::TRUE).unwrap();
    s.ontology.set_truth_value(s.c, TruthValue::TRUE).unwrap();
    assert_eq!(s.ontology.evaluate_truth(d).unwrap(), TruthState::False);

    // A probabilistic leaf keeps the result in superposition.
    s.ontology
        .set_truth_value(s.b, TruthValue::superposition(0.25).unwrap())
        .unwrap();
    let resolved = s.ontology.resolve_truth(d).unwrap();
    assert_eq!(resolved.evaluate(), TruthState::Superposition);
    assert_eq!(resolved.probability(), Some(0.25));

    // An unknown conjunct with no determining sibling is unknown.
    s.ontology.set_truth_value(s.a, TruthValue::UNKNOWN).unwrap();
    assert_eq!(s.ontology.evaluate_truth(d).unwrap(), TruthState::Unknown);
}

#[test]
fn chained_contexts_cascade() {
    let mut s = scene();
    let d = s
        .ontology
        .add_relation(
            RelationBuilder::new("D")
                .role("subject", s.dex)
                .context(RelationContext::relation(s.a)),
        )
        .unwrap();
    let e = s
        .ontology
        .add_relation(
            RelationBuilder::new("E")
                .role("subject", s.dex)
                .context(!RelationContext::relation(d)),
        )
        .unwrap();
    assert!(s.ontology.relation(s.a).unwrap().dependents().contains(&d));
    assert!(s.ontology.relation(d).unwrap().dependents().contains(&e));
    assert_eq!(s.ontology.relation(e).unwrap().truth_value().evaluate(), TruthState::False);

    s.ontology.deactivate(s.a).unwrap();
    assert_eq!(s.ontology.relation(d).unwrap().truth_value().evaluate(), TruthState::False);
    assert_eq!(s.ontology.relation(e).unwrap().truth_value().evaluate(), TruthState::True);

    s.ontology.activate(s.a).unwrap();
    assert_eq!(s.ontology.evaluate_truth(e).unwrap(), TruthState::False);

    // A -> D -> E already; E -> A would close the loop.
    let err = s
        .ontology
        .set_context(s.a, Some(Context::Relation(e)))
        .unwrap_err();
    assert!(matches!(
        err,
        LogosError::Validation(ValidationError::ContextCycle { relation }) if relation == s.a
    ));
    assert!(s.ontology.relation(s.a).unwrap().context.is_none());
}

#[test]
fn removing_a_source_leaves_dependents_unknown() {
    let mut s = scene();
    let d = s
        .ontology
        .add_relation(
            RelationBuilder::new("D")
                .role("subject", s.dex)
                .context(RelationContext::relation(s.a)),
        )
        .unwrap();
    assert_eq!(s.ontology.evaluate_truth(d).unwrap(), TruthState::True);

    s.ontology.remove_relation(s.a).unwrap();
    assert_eq!(s.ontology.evaluate_truth(d).unwrap(), TruthState::Unknown);
    assert_eq!(s.ontology.relation(d).unwrap().truth_value().evaluate(), TruthState::Unknown);
}

#[test]
fn operators_by_name_and_literals() {
    let mut s = scene();
    let xor = RelationContext::from_operator(
        "xor",
        vec![RelationContext::relation(s.a), RelationContext::relation(s.b)],
    )
    .unwrap();
    let d = s
        .ontology
        .add_relation(RelationBuilder::new("D").role("subject", s.dex).context(xor))
        .unwrap();
    assert_eq!(s.ontology.evaluate_truth(d).unwrap(), TruthState::True);

    let err = RelationContext::from_operator("IMPLIES", vec![RelationContext::relation(s.a)])
        .unwrap_err();
    assert!(matches!(err, ValidationError::UnknownOperator { .. }));

    let e = s
        .ontology
        .add_relation(RelationBuilder::new("E").role("subject", s.dex).context(false))
        .unwrap();
    assert_eq!(s.ontology.evaluate_truth(e).unwrap(), TruthState::False);
}

#[test]
fn callback_contexts_refresh_on_demand() {
    let mut s = scene();
    let raining = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&raining);
    let d = s
        .ontology
        .add_relation(
            RelationBuilder::new("D")
                .role("subject", s.dex)
                .context(TruthCallback::new(move || {
                    TruthState::from(flag.load(Ordering::SeqCst))
                })),
        )
        .unwrap();
    assert_eq!(s.ontology.relation(d).unwrap().truth_value().evaluate(), TruthState::False);

    raining.store(true, Ordering::SeqCst);
    // Evaluation always reads the callback; the cache waits for a refresh.
    assert_eq!(s.ontology.evaluate_truth(d).unwrap(), TruthState::True);
    assert_eq!(s.ontology.relation(d).unwrap().truth_value().evaluate(), TruthState::False);

    assert!(s.ontology.refresh_context_relations() >= 1);
    assert_eq!(s.ontology.relation(d).unwrap().truth_value().evaluate(), TruthState::True);
}

#[test]
fn expressions_are_pulled_not_cached() {
    let mut s = scene();
    s.ontology.set_truth_value(s.b, TruthValue::TRUE).unwrap();
    let expr = RelationContext::relation(s.a)
        & (!RelationContext::relation(s.c) | RelationContext::relation(s.b));
    assert_eq!(expr.evaluate(&s.ontology).evaluate(), TruthState::True);

    s.ontology.set_truth_value(s.a, TruthValue::FALSE).unwrap();
    assert_eq!(expr.evaluate(&s.ontology).evaluate(), TruthState::False);
}

#[test]
fn derived_superpositions_collapse_through_their_source() {
    let mut s = scene();
    s.ontology
        .set_truth_value(s.b, TruthValue::superposition(0.5).unwrap())
        .unwrap();
    let d = s
        .ontology
        .add_relation(
            RelationBuilder::new("D")
                .role("subject", s.dex)
                .context(RelationContext::relation(s.a) & RelationContext::relation(s.b)),
        )
        .unwrap();
    assert_eq!(s.ontology.evaluate_truth(d).unwrap(), TruthState::Superposition);

    let mut rng = StdRng::seed_from_u64(7);
    let err = s.ontology.collapse_truth(d, &mut rng).unwrap_err();
    assert!(matches!(
        err,
        LogosError::Validation(ValidationError::DerivedTruth { relation }) if relation == d
    ));

    let drawn = s.ontology.collapse_truth(s.b, &mut rng).unwrap();
    assert_eq!(s.ontology.evaluate_truth(d).unwrap(), drawn);
    assert_eq!(s.ontology.relation(d).unwrap().truth_value().evaluate(), drawn);
}
