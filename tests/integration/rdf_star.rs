use std::sync::Arc;

use sparql_iter::query::ops::{triple_pattern, triple_star, triple_star_inline};
use sparql_iter::{
    Binding, ExecConfig, ExecContext, MemoryGraph, PatternTerm, QueryIter, RdfStarMode, Term,
    Triple, TriplePattern, Var,
};

fn iri(local: &str) -> Term {
    Term::iri(format!("http://example/{local}"))
}

fn v(name: &str) -> PatternTerm {
    PatternTerm::Var(Var::new(name))
}

fn annotated_graph() -> MemoryGraph {
    let quoted = Term::triple(iri("a"), iri("p"), iri("b"));
    let deeper = Term::triple(quoted.clone(), iri("says"), iri("d"));
    MemoryGraph::new(vec![
        Triple::new(iri("a"), iri("p"), iri("b")),
        Triple::new(quoted, iri("q"), iri("c")),
        Triple::new(deeper, iri("r"), iri("e")),
        Triple::new(iri("a"), iri("p"), iri("z")),
    ])
}

fn context(graph: MemoryGraph, mode: RdfStarMode) -> ExecContext {
    ExecContext::new(ExecConfig::default().with_rdf_star(mode), Arc::new(graph))
}

fn sorted(mut rows: Vec<Binding>) -> Vec<Binding> {
    rows.sort_by(|a, b| a.canonical_cmp(b));
    rows
}

fn annotation_pattern() -> TriplePattern {
    TriplePattern::new(
        TriplePattern::new(v("s"), iri("p"), v("o")),
        iri("q"),
        v("x"),
    )
}

#[test]
fn quoted_subject_binds_inner_and_outer_variables() {
    let ctx = context(annotated_graph(), RdfStarMode::Staged);
    let rows = triple_pattern(QueryIter::root(), annotation_pattern(), &ctx)
        .collect_bindings()
        .unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.get(&Var::new("s")), Some(&iri("a")));
    assert_eq!(row.get(&Var::new("o")), Some(&iri("b")));
    assert_eq!(row.get(&Var::new("x")), Some(&iri("c")));
    // Synthetic variables never leak out.
    assert_eq!(row.len(), 3);
}

#[test]
fn no_annotation_means_no_rows() {
    let graph = MemoryGraph::new(vec![Triple::new(iri("a"), iri("p"), iri("b"))]);
    for mode in [RdfStarMode::Staged, RdfStarMode::Inline] {
        let ctx = context(graph.clone(), mode);
        let rows = triple_pattern(QueryIter::root(), annotation_pattern(), &ctx)
            .collect_bindings()
            .unwrap();
        assert!(rows.is_empty(), "{mode:?} produced rows");
    }
}

#[test]
fn staged_and_inline_strategies_agree() {
    let patterns = vec![
        annotation_pattern(),
        TriplePattern::new(
            TriplePattern::new(TriplePattern::new(v("s"), v("p"), v("o")), iri("says"), v("w")),
            iri("r"),
            v("y"),
        ),
        TriplePattern::new(v("s"), iri("p"), v("o")),
        TriplePattern::new(
            TriplePattern::new(iri("a"), iri("p"), v("o")),
            v("pred"),
            v("x"),
        ),
    ];
    let staged = context(annotated_graph(), RdfStarMode::Staged);
    let inline = context(annotated_graph(), RdfStarMode::Inline);
    for pattern in patterns {
        let a = triple_star(QueryIter::root(), pattern.clone(), &staged)
            .collect_bindings()
            .unwrap();
        let b = triple_star_inline(QueryIter::root(), pattern.clone(), &inline)
            .collect_bindings()
            .unwrap();
        assert_eq!(sorted(a), sorted(b), "strategies disagree on {pattern}");
    }
}

#[test]
fn outer_bindings_restrict_the_nested_match() {
    let ctx = context(annotated_graph(), RdfStarMode::Staged);
    let input = QueryIter::from_bindings(vec![
        Binding::empty().extend(Var::new("o"), iri("b")),
        Binding::empty().extend(Var::new("o"), iri("z")),
    ]);
    let rows = triple_pattern(input, annotation_pattern(), &ctx)
        .collect_bindings()
        .unwrap();
    // Only the first outer row has an annotated triple behind it.
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(&Var::new("o")), Some(&iri("b")));
    assert_eq!(rows[0].get(&Var::new("x")), Some(&iri("c")));
}
