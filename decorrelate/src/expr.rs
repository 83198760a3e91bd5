//! Expression tree shared by every plan node.
//!
//! Expressions are immutable and reference-counted: rewriters never mutate a
//! node in place, they rebuild the spine above a changed child and share the
//! rest. A rewriter that changes nothing returns the original [`ExprRef`], so
//! callers can detect "no change" with [`std::sync::Arc::ptr_eq`].

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use derive_more::From;
use enum_as_inner::EnumAsInner;
use itertools::Itertools;
use smallvec::{smallvec, SmallVec};
use strum_macros::AsRefStr;

use crate::plan::{Ordering, SelectRef};

pub type ExprRef = Arc<Expr>;

/// Semantic scalar type of a column or expression result.
///
/// The engine performs no type checking; the type only drives the synthesis of
/// aggregate identity literals (`COALESCE(_value, 0)`) and nullability
/// bookkeeping on rewritten column references.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, AsRefStr)]
pub enum ScalarType {
    Bool,
    Int,
    Float,
    Decimal,
    Text,
    Date,
}

impl ScalarType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ScalarType::Int | ScalarType::Float | ScalarType::Decimal)
    }
}

#[derive(Clone, Debug, PartialEq, From)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Unscaled digits plus decimal scale.
    Decimal(i128, u8),
    Text(String),
    /// Days since the epoch.
    Date(i32),
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Text(value.to_string())
    }
}

impl Literal {
    pub fn ty(&self) -> Option<ScalarType> {
        match self {
            Literal::Null => None,
            Literal::Bool(_) => Some(ScalarType::Bool),
            Literal::Int(_) => Some(ScalarType::Int),
            Literal::Float(_) => Some(ScalarType::Float),
            Literal::Decimal(..) => Some(ScalarType::Decimal),
            Literal::Text(_) => Some(ScalarType::Text),
            Literal::Date(_) => Some(ScalarType::Date),
        }
    }

    /// Aggregate identity for numeric types; `None` for everything else, in
    /// which case the rewriters let null propagate untouched.
    pub fn zero(ty: ScalarType) -> Option<Literal> {
        match ty {
            ScalarType::Int => Some(Literal::Int(0)),
            ScalarType::Float => Some(Literal::Float(0.0)),
            ScalarType::Decimal => Some(Literal::Decimal(0, 0)),
            _ => None,
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "NULL"),
            Literal::Bool(true) => write!(f, "TRUE"),
            Literal::Bool(false) => write!(f, "FALSE"),
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v}"),
            Literal::Decimal(digits, 0) => write!(f, "{digits}"),
            Literal::Decimal(digits, scale) => {
                let unsigned = digits.unsigned_abs().to_string();
                let sign = if *digits < 0 { "-" } else { "" };
                let scale = *scale as usize;
                if unsigned.len() > scale {
                    let (int, frac) = unsigned.split_at(unsigned.len() - scale);
                    write!(f, "{sign}{int}.{frac}")
                } else {
                    write!(f, "{sign}0.{unsigned:0>scale$}")
                }
            }
            Literal::Text(v) => write!(f, "'{v}'"),
            Literal::Date(v) => write!(f, "DATE({v})"),
        }
    }
}

/// A column reference: the alias of the table it comes from plus its name.
///
/// Identity for projection matching is `(table, name)`; nullability and type
/// ride along for literal synthesis on rewritten references.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Column {
    pub table: String,
    pub name: String,
    pub nullable: bool,
    pub ty: ScalarType,
}

impl Column {
    pub fn new(table: impl Into<String>, name: impl Into<String>, ty: ScalarType) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            nullable: false,
            ty,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn same_source(&self, other: &Column) -> bool {
        self.table == other.table && self.name == other.name
    }
}

impl Display for Column {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.name)
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, AsRefStr)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOperator {
    pub fn is_comparison(&self) -> bool {
        use BinaryOperator::*;
        matches!(self, Eq | NotEq | Lt | LtEq | Gt | GtEq)
    }

    /// The operator to use when the two operands swap sides.
    pub fn mirror(&self) -> BinaryOperator {
        use BinaryOperator::*;
        match self {
            Lt => Gt,
            LtEq => GtEq,
            Gt => Lt,
            GtEq => LtEq,
            other => *other,
        }
    }

    pub fn sql(&self) -> &'static str {
        use BinaryOperator::*;
        match self {
            Eq => "=",
            NotEq => "<>",
            Lt => "<",
            LtEq => "<=",
            Gt => ">",
            GtEq => ">=",
            And => "AND",
            Or => "OR",
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Not,
    Neg,
    IsNull,
    IsNotNull,
    Cast(ScalarType),
}

#[derive(Clone, Debug, PartialEq, EnumAsInner, AsRefStr)]
pub enum Expr {
    Column(Column),
    Literal(Literal),
    BinaryOp {
        op: BinaryOperator,
        left: ExprRef,
        right: ExprRef,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: ExprRef,
    },
    FunctionCall {
        name: String,
        args: Vec<ExprRef>,
    },
    /// A subquery producing exactly one column and at most one row.
    ScalarSubquery(SelectRef),
    /// Per-partition sequential rank, starting at 1.
    RowNumber {
        partition_by: Vec<ExprRef>,
        order_by: Vec<Ordering>,
    },
}

pub fn col(table: &str, name: &str, ty: ScalarType) -> ExprRef {
    Arc::new(Expr::Column(Column::new(table, name, ty)))
}

pub fn column(c: Column) -> ExprRef {
    Arc::new(Expr::Column(c))
}

pub fn lit(value: impl Into<Literal>) -> ExprRef {
    Arc::new(Expr::Literal(value.into()))
}

pub fn binary(op: BinaryOperator, left: ExprRef, right: ExprRef) -> ExprRef {
    Arc::new(Expr::BinaryOp { op, left, right })
}

pub fn eq(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryOperator::Eq, left, right)
}

pub fn and(left: ExprRef, right: ExprRef) -> ExprRef {
    binary(BinaryOperator::And, left, right)
}

pub fn func(name: &str, args: Vec<ExprRef>) -> ExprRef {
    Arc::new(Expr::FunctionCall {
        name: name.to_string(),
        args,
    })
}

pub fn scalar_subquery(select: SelectRef) -> ExprRef {
    Arc::new(Expr::ScalarSubquery(select))
}

/// Flatten an AND-chain into its conjuncts, left to right.
pub fn conjuncts(expr: &ExprRef) -> SmallVec<[ExprRef; 4]> {
    match &**expr {
        Expr::BinaryOp {
            op: BinaryOperator::And,
            left,
            right,
        } => {
            let mut out = conjuncts(left);
            out.extend(conjuncts(right));
            out
        }
        _ => smallvec![expr.clone()],
    }
}

/// AND-join a sequence of conjuncts; `None` when the sequence is empty.
pub fn conjoin(exprs: impl IntoIterator<Item = ExprRef>) -> Option<ExprRef> {
    exprs.into_iter().reduce(and)
}

lazy_static! {
    static ref AGGREGATE_FUNCTIONS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.extend([
            "COUNT",
            "COUNT_BIG",
            "SUM",
            "AVG",
            "MIN",
            "MAX",
            "STDDEV",
            "STDDEV_POP",
            "VAR",
            "VAR_POP",
            "STRING_AGG",
        ]);
        s
    };
}

pub fn is_aggregate_name(name: &str) -> bool {
    AGGREGATE_FUNCTIONS.contains(name.to_ascii_uppercase().as_str())
}

/// Whether the expression invokes an aggregate function at its own query
/// level. Subquery bodies are not entered: their aggregates belong to them.
pub fn contains_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::Column(_) | Expr::Literal(_) | Expr::ScalarSubquery(_) => false,
        Expr::BinaryOp { left, right, .. } => {
            contains_aggregate(left) || contains_aggregate(right)
        }
        Expr::UnaryOp { operand, .. } => contains_aggregate(operand),
        Expr::FunctionCall { name, args } => {
            is_aggregate_name(name) || args.iter().any(|a| contains_aggregate(a))
        }
        Expr::RowNumber {
            partition_by,
            order_by,
        } => {
            partition_by.iter().any(|e| contains_aggregate(e))
                || order_by.iter().any(|o| contains_aggregate(&o.expr))
        }
    }
}

/// Best-effort result type, used to pick the COALESCE default for rewritten
/// aggregate subqueries. `None` means "unknown", which disables the wrapper.
pub fn infer_type(expr: &Expr) -> Option<ScalarType> {
    match expr {
        Expr::Column(c) => Some(c.ty),
        Expr::Literal(l) => l.ty(),
        Expr::BinaryOp { op, left, .. } => {
            if op.is_comparison() || matches!(op, BinaryOperator::And | BinaryOperator::Or)
            {
                Some(ScalarType::Bool)
            } else {
                infer_type(left)
            }
        }
        Expr::UnaryOp { op, operand } => match op {
            UnaryOperator::Not | UnaryOperator::IsNull | UnaryOperator::IsNotNull => {
                Some(ScalarType::Bool)
            }
            UnaryOperator::Neg => infer_type(operand),
            UnaryOperator::Cast(ty) => Some(*ty),
        },
        Expr::FunctionCall { name, args } => {
            match name.to_ascii_uppercase().as_str() {
                "COUNT" | "COUNT_BIG" => Some(ScalarType::Int),
                "SUM" | "AVG" | "MIN" | "MAX" => {
                    args.first().and_then(|a| infer_type(a))
                }
                "COALESCE" => args.iter().find_map(|a| infer_type(a)),
                _ => None,
            }
        }
        Expr::ScalarSubquery(select) => select
            .projections()
            .first()
            .and_then(|p| infer_type(&p.expr)),
        Expr::RowNumber { .. } => Some(ScalarType::Int),
    }
}

fn fmt_operand(expr: &Expr, f: &mut Formatter<'_>) -> fmt::Result {
    if matches!(expr, Expr::BinaryOp { .. }) {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{c}"),
            Expr::Literal(l) => write!(f, "{l}"),
            Expr::BinaryOp { op, left, right } => {
                fmt_operand(left, f)?;
                write!(f, " {} ", op.sql())?;
                fmt_operand(right, f)
            }
            Expr::UnaryOp { op, operand } => match op {
                UnaryOperator::Not => write!(f, "NOT {operand}"),
                UnaryOperator::Neg => write!(f, "-{operand}"),
                UnaryOperator::IsNull => write!(f, "{operand} IS NULL"),
                UnaryOperator::IsNotNull => write!(f, "{operand} IS NOT NULL"),
                UnaryOperator::Cast(ty) => {
                    write!(f, "CAST({} AS {})", operand, ty.as_ref())
                }
            },
            Expr::FunctionCall { name, args } => {
                write!(f, "{}({})", name, args.iter().map(|a| a.to_string()).join(", "))
            }
            Expr::ScalarSubquery(select) => write!(f, "(subquery {})", select.alias()),
            Expr::RowNumber {
                partition_by,
                order_by,
            } => {
                write!(f, "ROW_NUMBER() OVER (")?;
                if !partition_by.is_empty() {
                    write!(
                        f,
                        "PARTITION BY {}",
                        partition_by.iter().map(|e| e.to_string()).join(", ")
                    )?;
                }
                if !order_by.is_empty() {
                    if !partition_by.is_empty() {
                        write!(f, " ")?;
                    }
                    write!(
                        f,
                        "ORDER BY {}",
                        order_by.iter().map(|o| o.to_string()).join(", ")
                    )?;
                }
                write!(f, ")")
            }
        }
    }
}
