//! Expression evaluation contract and binding orderings.
//!
//! Operators treat expressions as black boxes: `eval` either yields a term
//! or fails with an [`EvalError`], and operators decide locally what a
//! failure means (drop the row, omit a value). A handful of concrete
//! expressions cover what the operators and their tests need.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::model::{vocab, Term, Var};
use crate::query::binding::Binding;
use crate::query::context::ExecContext;

/// Failure to evaluate an expression for one row.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EvalError {
    /// A variable the expression reads is not bound.
    #[error("variable {0} is not bound")]
    Unbound(Var),
    /// Operand types do not fit the operator.
    #[error("type error: {0}")]
    TypeError(String),
    /// Any other evaluation failure.
    #[error("evaluation failed: {0}")]
    Failed(String),
}

/// An expression over one binding.
pub trait Expr: Send + Sync + fmt::Debug {
    /// Evaluates to a term.
    fn eval(&self, binding: &Binding, ctx: &ExecContext) -> Result<Term, EvalError>;

    /// Effective boolean value of the result.
    fn is_satisfied(&self, binding: &Binding, ctx: &ExecContext) -> Result<bool, EvalError> {
        effective_boolean_value(&self.eval(binding, ctx)?)
    }
}

/// Shared expression handle.
pub type ExprRef = Arc<dyn Expr>;

/// SPARQL effective boolean value.
pub fn effective_boolean_value(term: &Term) -> Result<bool, EvalError> {
    if let Some(value) = term.as_bool() {
        return Ok(value);
    }
    if let Some(value) = term.as_f64() {
        return Ok(value != 0.0 && !value.is_nan());
    }
    match term.as_literal() {
        Some(literal) if literal.datatype == vocab::XSD_STRING || literal.language.is_some() => {
            Ok(!literal.lexical.is_empty())
        }
        _ => Err(EvalError::TypeError(format!("no boolean value for {term}"))),
    }
}

#[derive(Debug)]
struct VarExpr(Var);

impl Expr for VarExpr {
    fn eval(&self, binding: &Binding, _ctx: &ExecContext) -> Result<Term, EvalError> {
        binding
            .get(&self.0)
            .cloned()
            .ok_or_else(|| EvalError::Unbound(self.0.clone()))
    }
}

#[derive(Debug)]
struct ConstExpr(Term);

impl Expr for ConstExpr {
    fn eval(&self, _binding: &Binding, _ctx: &ExecContext) -> Result<Term, EvalError> {
        Ok(self.0.clone())
    }
}

/// Comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

#[derive(Debug)]
struct Compare {
    op: CompareOp,
    left: ExprRef,
    right: ExprRef,
}

impl Expr for Compare {
    fn eval(&self, binding: &Binding, ctx: &ExecContext) -> Result<Term, EvalError> {
        let left = self.left.eval(binding, ctx)?;
        let right = self.right.eval(binding, ctx)?;
        let ordering = match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a
                .partial_cmp(&b)
                .ok_or_else(|| EvalError::TypeError("NaN comparison".into()))?,
            _ => match self.op {
                CompareOp::Eq => return Ok(Term::boolean(left == right)),
                CompareOp::Ne => return Ok(Term::boolean(left != right)),
                _ => match (left.as_literal(), right.as_literal()) {
                    (Some(a), Some(b)) if a.datatype == b.datatype && a.language == b.language => {
                        a.lexical.cmp(&b.lexical)
                    }
                    _ => {
                        return Err(EvalError::TypeError(format!(
                            "cannot order {left} and {right}"
                        )))
                    }
                },
            },
        };
        let result = match self.op {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        };
        Ok(Term::boolean(result))
    }
}

#[derive(Debug)]
struct Not(ExprRef);

impl Expr for Not {
    fn eval(&self, binding: &Binding, ctx: &ExecContext) -> Result<Term, EvalError> {
        Ok(Term::boolean(!self.0.is_satisfied(binding, ctx)?))
    }
}

#[derive(Debug)]
struct And(ExprRef, ExprRef);

impl Expr for And {
    // SPARQL three-valued logic: an error on one side is masked by `false`
    // on the other.
    fn eval(&self, binding: &Binding, ctx: &ExecContext) -> Result<Term, EvalError> {
        match (
            self.0.is_satisfied(binding, ctx),
            self.1.is_satisfied(binding, ctx),
        ) {
            (Ok(false), _) | (_, Ok(false)) => Ok(Term::boolean(false)),
            (Ok(true), Ok(true)) => Ok(Term::boolean(true)),
            (Err(err), _) | (_, Err(err)) => Err(err),
        }
    }
}

#[derive(Debug)]
struct Or(ExprRef, ExprRef);

impl Expr for Or {
    fn eval(&self, binding: &Binding, ctx: &ExecContext) -> Result<Term, EvalError> {
        match (
            self.0.is_satisfied(binding, ctx),
            self.1.is_satisfied(binding, ctx),
        ) {
            (Ok(true), _) | (_, Ok(true)) => Ok(Term::boolean(true)),
            (Ok(false), Ok(false)) => Ok(Term::boolean(false)),
            (Err(err), _) | (_, Err(err)) => Err(err),
        }
    }
}

#[derive(Debug)]
struct Bound(Var);

impl Expr for Bound {
    fn eval(&self, binding: &Binding, _ctx: &ExecContext) -> Result<Term, EvalError> {
        Ok(Term::boolean(binding.contains(&self.0)))
    }
}

type EvalFn = dyn Fn(&Binding, &ExecContext) -> Result<Term, EvalError> + Send + Sync;

struct FnExpr {
    name: &'static str,
    f: Box<EvalFn>,
}

impl fmt::Debug for FnExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(..)", self.name)
    }
}

impl Expr for FnExpr {
    fn eval(&self, binding: &Binding, ctx: &ExecContext) -> Result<Term, EvalError> {
        (self.f)(binding, ctx)
    }
}

/// Reads a variable.
pub fn var(var: impl Into<Var>) -> ExprRef {
    Arc::new(VarExpr(var.into()))
}

/// A constant.
pub fn constant(term: Term) -> ExprRef {
    Arc::new(ConstExpr(term))
}

/// Binary comparison.
pub fn compare(op: CompareOp, left: ExprRef, right: ExprRef) -> ExprRef {
    Arc::new(Compare { op, left, right })
}

/// `left = right`
pub fn eq(left: ExprRef, right: ExprRef) -> ExprRef {
    compare(CompareOp::Eq, left, right)
}

/// `left < right`
pub fn lt(left: ExprRef, right: ExprRef) -> ExprRef {
    compare(CompareOp::Lt, left, right)
}

/// `left > right`
pub fn gt(left: ExprRef, right: ExprRef) -> ExprRef {
    compare(CompareOp::Gt, left, right)
}

/// `!expr`
pub fn not(expr: ExprRef) -> ExprRef {
    Arc::new(Not(expr))
}

/// `left && right`
pub fn and(left: ExprRef, right: ExprRef) -> ExprRef {
    Arc::new(And(left, right))
}

/// `left || right`
pub fn or(left: ExprRef, right: ExprRef) -> ExprRef {
    Arc::new(Or(left, right))
}

/// `BOUND(?var)`
pub fn bound(var: impl Into<Var>) -> ExprRef {
    Arc::new(Bound(var.into()))
}

/// Wraps a closure as an expression (extension functions, tests).
pub fn from_fn<F>(name: &'static str, f: F) -> ExprRef
where
    F: Fn(&Binding, &ExecContext) -> Result<Term, EvalError> + Send + Sync + 'static,
{
    Arc::new(FnExpr {
        name,
        f: Box::new(f),
    })
}

fn kind_rank(term: Option<&Term>) -> u8 {
    match term {
        None => 0,
        Some(Term::BlankNode(_)) => 1,
        Some(Term::Iri(_)) => 2,
        Some(Term::Triple(_)) => 3,
        Some(Term::Literal(_)) => 4,
    }
}

/// ORDER BY ordering of two possibly unbound values: unbound, then blank
/// nodes, IRIs, triple terms and literals. Numeric literals compare by
/// value; everything else falls back to a total structural order.
pub fn compare_terms(a: Option<&Term>, b: Option<&Term>) -> Ordering {
    let rank = kind_rank(a).cmp(&kind_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Some(x), Some(y)) => {
            if let (Some(p), Some(q)) = (x.as_f64(), y.as_f64()) {
                match p.partial_cmp(&q) {
                    Some(Ordering::Equal) | None => {}
                    Some(ordering) => return ordering,
                }
            }
            x.cmp(y)
        }
        _ => Ordering::Equal,
    }
}

/// Sort direction of one ORDER BY key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// One ORDER BY key.
#[derive(Clone, Debug)]
pub struct SortCondition {
    /// Key expression; evaluation failure sorts as unbound.
    pub expr: ExprRef,
    /// Direction.
    pub direction: Direction,
}

impl SortCondition {
    /// Ascending key.
    pub fn asc(expr: ExprRef) -> Self {
        Self {
            expr,
            direction: Direction::Asc,
        }
    }

    /// Descending key.
    pub fn desc(expr: ExprRef) -> Self {
        Self {
            expr,
            direction: Direction::Desc,
        }
    }
}

/// Total or partial order over bindings used by sort, top-N and spill bags.
pub trait BindingOrder: Send + Sync {
    /// Compares two bindings.
    fn compare(&self, a: &Binding, b: &Binding) -> Ordering;
}

impl<F> BindingOrder for F
where
    F: Fn(&Binding, &Binding) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &Binding, b: &Binding) -> Ordering {
        self(a, b)
    }
}

/// Shared ordering handle.
pub type OrderRef = Arc<dyn BindingOrder>;

/// Orders bindings by a list of sort conditions.
pub struct BindingComparator {
    conditions: Vec<SortCondition>,
    ctx: ExecContext,
}

impl BindingComparator {
    /// Creates a comparator evaluating keys in `ctx`.
    pub fn new(conditions: Vec<SortCondition>, ctx: ExecContext) -> Self {
        Self { conditions, ctx }
    }

    /// Shared handle.
    pub fn into_ref(self) -> OrderRef {
        Arc::new(self)
    }
}

impl BindingOrder for BindingComparator {
    fn compare(&self, a: &Binding, b: &Binding) -> Ordering {
        for condition in &self.conditions {
            let left = condition.expr.eval(a, &self.ctx).ok();
            let right = condition.expr.eval(b, &self.ctx).ok();
            let ordering = compare_terms(left.as_ref(), right.as_ref());
            let ordering = match condition.direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

impl fmt::Debug for BindingComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingComparator")
            .field("conditions", &self.conditions)
            .finish()
    }
}
