//! Aggregate contracts consumed by the group operator, plus the standard
//! SPARQL set functions.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::model::{vocab, Term};
use crate::query::binding::Binding;
use crate::query::context::ExecContext;
use crate::query::expr::{compare_terms, EvalError, ExprRef};

/// Factory for per-group accumulators.
pub trait Aggregator: Send + Sync + fmt::Debug {
    /// A fresh accumulator for one group.
    fn create_accumulator(&self) -> Box<dyn Accumulator>;

    /// Value of the aggregate over an empty input, if defined.
    fn empty_value(&self) -> Option<Term>;
}

/// Running state of one aggregate within one group.
pub trait Accumulator: Send {
    /// Feeds one row of the group.
    fn accumulate(&mut self, binding: &Binding, ctx: &ExecContext) -> Result<(), EvalError>;

    /// Final value; `None` leaves the output variable unbound.
    fn value(&self) -> Option<Term>;
}

/// Shared aggregator handle.
pub type AggregatorRef = Arc<dyn Aggregator>;

/// `COUNT(*)`
#[derive(Debug, Default)]
pub struct Count;

impl Aggregator for Count {
    fn create_accumulator(&self) -> Box<dyn Accumulator> {
        Box::new(CountRows(0))
    }

    fn empty_value(&self) -> Option<Term> {
        Some(Term::integer(0))
    }
}

struct CountRows(i64);

impl Accumulator for CountRows {
    fn accumulate(&mut self, _binding: &Binding, _ctx: &ExecContext) -> Result<(), EvalError> {
        self.0 += 1;
        Ok(())
    }

    fn value(&self) -> Option<Term> {
        Some(Term::integer(self.0))
    }
}

/// `COUNT([DISTINCT] expr)`: rows where `expr` evaluates.
#[derive(Debug)]
pub struct CountExpr {
    expr: ExprRef,
    distinct: bool,
}

impl CountExpr {
    /// Creates the aggregate.
    pub fn new(expr: ExprRef, distinct: bool) -> Self {
        Self { expr, distinct }
    }
}

impl Aggregator for CountExpr {
    fn create_accumulator(&self) -> Box<dyn Accumulator> {
        Box::new(CountValues {
            expr: Arc::clone(&self.expr),
            seen: self.distinct.then(FxHashSet::default),
            count: 0,
        })
    }

    fn empty_value(&self) -> Option<Term> {
        Some(Term::integer(0))
    }
}

struct CountValues {
    expr: ExprRef,
    seen: Option<FxHashSet<Term>>,
    count: i64,
}

impl Accumulator for CountValues {
    fn accumulate(&mut self, binding: &Binding, ctx: &ExecContext) -> Result<(), EvalError> {
        let term = self.expr.eval(binding, ctx)?;
        if let Some(seen) = self.seen.as_mut() {
            if !seen.insert(term) {
                return Ok(());
            }
        }
        self.count += 1;
        Ok(())
    }

    fn value(&self) -> Option<Term> {
        Some(Term::integer(self.count))
    }
}

/// `SAMPLE(expr)`: the first value seen.
#[derive(Debug)]
pub struct Sample(pub ExprRef);

impl Aggregator for Sample {
    fn create_accumulator(&self) -> Box<dyn Accumulator> {
        Box::new(SampleValue {
            expr: Arc::clone(&self.0),
            value: None,
        })
    }

    fn empty_value(&self) -> Option<Term> {
        None
    }
}

struct SampleValue {
    expr: ExprRef,
    value: Option<Term>,
}

impl Accumulator for SampleValue {
    fn accumulate(&mut self, binding: &Binding, ctx: &ExecContext) -> Result<(), EvalError> {
        if self.value.is_none() {
            self.value = Some(self.expr.eval(binding, ctx)?);
        }
        Ok(())
    }

    fn value(&self) -> Option<Term> {
        self.value.clone()
    }
}

/// `MIN(expr)` / `MAX(expr)` using the ORDER BY term order.
#[derive(Debug)]
pub struct Extremum {
    expr: ExprRef,
    keep: Ordering,
}

impl Extremum {
    /// `MIN(expr)`
    pub fn min(expr: ExprRef) -> Self {
        Self {
            expr,
            keep: Ordering::Less,
        }
    }

    /// `MAX(expr)`
    pub fn max(expr: ExprRef) -> Self {
        Self {
            expr,
            keep: Ordering::Greater,
        }
    }
}

impl Aggregator for Extremum {
    fn create_accumulator(&self) -> Box<dyn Accumulator> {
        Box::new(ExtremumValue {
            expr: Arc::clone(&self.expr),
            keep: self.keep,
            best: None,
        })
    }

    fn empty_value(&self) -> Option<Term> {
        None
    }
}

struct ExtremumValue {
    expr: ExprRef,
    keep: Ordering,
    best: Option<Term>,
}

impl Accumulator for ExtremumValue {
    fn accumulate(&mut self, binding: &Binding, ctx: &ExecContext) -> Result<(), EvalError> {
        let term = self.expr.eval(binding, ctx)?;
        let replace = match &self.best {
            None => true,
            Some(best) => compare_terms(Some(&term), Some(best)) == self.keep,
        };
        if replace {
            self.best = Some(term);
        }
        Ok(())
    }

    fn value(&self) -> Option<Term> {
        self.best.clone()
    }
}

/// `SUM(expr)` over numeric literals.
#[derive(Debug)]
pub struct Sum(pub ExprRef);

impl Aggregator for Sum {
    fn create_accumulator(&self) -> Box<dyn Accumulator> {
        Box::new(SumValue {
            expr: Arc::clone(&self.0),
            integer: Some(0),
            double: 0.0,
            failed: false,
        })
    }

    fn empty_value(&self) -> Option<Term> {
        Some(Term::integer(0))
    }
}

struct SumValue {
    expr: ExprRef,
    integer: Option<i64>,
    double: f64,
    failed: bool,
}

impl Accumulator for SumValue {
    fn accumulate(&mut self, binding: &Binding, ctx: &ExecContext) -> Result<(), EvalError> {
        let term = self.expr.eval(binding, ctx)?;
        let Some(value) = term.as_f64() else {
            // A non-numeric value makes the whole sum an error.
            self.failed = true;
            return Err(EvalError::TypeError(format!("SUM over non-numeric {term}")));
        };
        self.integer = match (self.integer, term.as_integer()) {
            (Some(acc), Some(n)) => acc.checked_add(n),
            _ => None,
        };
        self.double += value;
        Ok(())
    }

    fn value(&self) -> Option<Term> {
        if self.failed {
            return None;
        }
        Some(match self.integer {
            Some(n) => Term::integer(n),
            None => Term::typed(self.double.to_string(), vocab::XSD_DOUBLE),
        })
    }
}

/// `GROUP_CONCAT(expr; SEPARATOR = sep)`
#[derive(Debug)]
pub struct GroupConcat {
    expr: ExprRef,
    separator: String,
}

impl GroupConcat {
    /// Creates the aggregate.
    pub fn new(expr: ExprRef, separator: impl Into<String>) -> Self {
        Self {
            expr,
            separator: separator.into(),
        }
    }
}

impl Aggregator for GroupConcat {
    fn create_accumulator(&self) -> Box<dyn Accumulator> {
        Box::new(ConcatValue {
            expr: Arc::clone(&self.expr),
            separator: self.separator.clone(),
            parts: Vec::new(),
        })
    }

    fn empty_value(&self) -> Option<Term> {
        Some(Term::string(""))
    }
}

struct ConcatValue {
    expr: ExprRef,
    separator: String,
    parts: Vec<String>,
}

impl Accumulator for ConcatValue {
    fn accumulate(&mut self, binding: &Binding, ctx: &ExecContext) -> Result<(), EvalError> {
        let term = self.expr.eval(binding, ctx)?;
        let text = match &term {
            Term::Literal(literal) => literal.lexical.clone(),
            Term::Iri(iri) => iri.clone(),
            other => {
                return Err(EvalError::TypeError(format!(
                    "GROUP_CONCAT over {other}"
                )))
            }
        };
        self.parts.push(text);
        Ok(())
    }

    fn value(&self) -> Option<Term> {
        Some(Term::string(self.parts.join(&self.separator)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Var;
    use crate::query::expr::var;

    fn rows(values: &[i64]) -> Vec<Binding> {
        values
            .iter()
            .map(|v| Binding::empty().extend(Var::new("x"), Term::integer(*v)))
            .collect()
    }

    fn run(agg: &dyn Aggregator, input: &[Binding]) -> Option<Term> {
        let ctx = ExecContext::detached();
        let mut acc = agg.create_accumulator();
        for row in input {
            let _ = acc.accumulate(row, &ctx);
        }
        acc.value()
    }

    #[test]
    fn counting() {
        let input = rows(&[1, 2, 2]);
        assert_eq!(run(&Count, &input), Some(Term::integer(3)));
        assert_eq!(
            run(&CountExpr::new(var("x"), true), &input),
            Some(Term::integer(2))
        );
        assert_eq!(
            run(&CountExpr::new(var("missing"), false), &input),
            Some(Term::integer(0))
        );
        assert_eq!(Count.empty_value(), Some(Term::integer(0)));
    }

    #[test]
    fn extremes_sample_and_sum() {
        let input = rows(&[5, -2, 9]);
        assert_eq!(run(&Extremum::min(var("x")), &input), Some(Term::integer(-2)));
        assert_eq!(run(&Extremum::max(var("x")), &input), Some(Term::integer(9)));
        assert_eq!(run(&Sample(var("x")), &input), Some(Term::integer(5)));
        assert_eq!(run(&Sum(var("x")), &input), Some(Term::integer(12)));
        assert_eq!(Extremum::min(var("x")).empty_value(), None);
    }

    #[test]
    fn group_concat_joins_lexical_forms() {
        let input = rows(&[1, 2, 3]);
        assert_eq!(
            run(&GroupConcat::new(var("x"), ","), &input),
            Some(Term::string("1,2,3"))
        );
        assert_eq!(
            GroupConcat::new(var("x"), ",").empty_value(),
            Some(Term::string(""))
        );
    }
}
