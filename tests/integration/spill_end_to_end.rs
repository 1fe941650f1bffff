use std::fs;

use sparql_iter::query::expr::{var, SortCondition};
use sparql_iter::query::ops::{distinct, sort};
use sparql_iter::{Binding, ExecConfig, ExecContext, Executor, QueryIter, Term, Var};

fn rows(values: &[i64]) -> QueryIter {
    QueryIter::from_bindings(
        values
            .iter()
            .map(|n| Binding::empty().extend(Var::new("x"), Term::integer(*n)))
            .collect(),
    )
}

fn xs(rows: &[Binding]) -> Vec<i64> {
    let x = Var::new("x");
    rows.iter()
        .filter_map(|r| r.get(&x).and_then(Term::as_integer))
        .collect()
}

fn spill_context(threshold: usize, dir: &std::path::Path) -> ExecContext {
    let toml = format!(
        "[spill]\nthreshold = {threshold}\ndirectory = {:?}\n",
        dir.display().to_string()
    );
    let config = ExecConfig::from_toml_str(&toml).unwrap();
    assert_eq!(config.spill_threshold, Some(threshold));
    ExecContext::detached().with_config(config)
}

#[test]
fn distinct_under_a_tiny_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = spill_context(2, dir.path());
    let result = Executor::new(ctx.clone())
        .execute(distinct(rows(&[1, 2, 1]), None, &ctx), None)
        .unwrap();
    assert_eq!(xs(&result.rows), vec![1, 2]);
}

#[test]
fn distinct_spills_and_still_removes_every_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = spill_context(4, dir.path());
    let values: Vec<i64> = (0..500).map(|n| n % 37).collect();
    let result = Executor::new(ctx.clone())
        .execute(distinct(rows(&values), None, &ctx), None)
        .unwrap();
    let mut seen = xs(&result.rows);
    seen.sort_unstable();
    assert_eq!(seen, (0..37).collect::<Vec<_>>());
}

#[test]
fn sort_spills_to_the_configured_directory_and_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = spill_context(8, dir.path());
    let values: Vec<i64> = (0..300).map(|n| (n * 53) % 211).collect();
    let mut stream = Executor::new(ctx.clone()).stream(
        sort(rows(&values), vec![SortCondition::desc(var("x"))], &ctx),
        None,
    );
    let first = stream.next().unwrap().unwrap();
    let mut expected = values.clone();
    expected.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(xs(&[first]), vec![expected[0]]);

    let rest: Vec<Binding> = stream.by_ref().collect::<Result<_, _>>().unwrap();
    assert_eq!(xs(&rest), expected[1..].to_vec());
    stream.close();
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}
