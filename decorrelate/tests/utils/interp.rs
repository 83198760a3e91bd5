//! Reference interpreter used by the equivalence tests.
//!
//! Evaluates a plan directly against in-memory tables, including the lateral
//! semantics of apply nodes and correlated scalar subqueries, so the same
//! fixture can execute a plan before and after decorrelation and the two row
//! multisets can be compared.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use decorrelate::expr::{
    is_aggregate_name, BinaryOperator, Expr, ExprRef, Literal, UnaryOperator,
};
use decorrelate::plan::{Ordering, Select, SelectRef};
use decorrelate::table::{ApplyKind, JoinKind, Table};

pub type Row = HashMap<String, Literal>;
/// Alias -> bound row, covering outer scopes and the tables evaluated so far.
pub type Env = HashMap<String, Row>;

#[derive(Default)]
pub struct Database {
    tables: HashMap<String, Vec<Row>>,
}

impl Database {
    pub fn with_table(mut self, name: &str, rows: Value) -> Self {
        let rows = rows
            .as_array()
            .expect("fixture table must be a JSON array")
            .iter()
            .map(|r| {
                r.as_object()
                    .expect("fixture row must be a JSON object")
                    .iter()
                    .map(|(k, v)| (k.clone(), literal_from_json(v)))
                    .collect()
            })
            .collect();
        self.tables.insert(name.to_string(), rows);
        self
    }

    fn rows(&self, name: &str) -> &[Row] {
        self.tables
            .get(name)
            .map(|r| r.as_slice())
            .unwrap_or_else(|| panic!("no fixture table named {name}"))
    }
}

fn literal_from_json(v: &Value) -> Literal {
    match v {
        Value::Null => Literal::Null,
        Value::Bool(b) => Literal::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Literal::Int(i),
            None => Literal::Float(n.as_f64().expect("numeric fixture value")),
        },
        Value::String(s) => Literal::Text(s.clone()),
        other => panic!("unsupported fixture value {other}"),
    }
}

pub fn run(db: &Database, plan: &SelectRef) -> Vec<Row> {
    eval_select(db, plan, &Env::new())
}

/// Multiset equality over result rows.
pub fn assert_same_rows(expected: Vec<Row>, actual: Vec<Row>) {
    let mut expected = canonical(expected);
    let mut actual = canonical(actual);
    expected.sort();
    actual.sort();
    assert_eq!(expected, actual);
}

fn canonical(rows: Vec<Row>) -> Vec<String> {
    rows.into_iter()
        .map(|row| {
            let ordered: BTreeMap<String, String> = row
                .into_iter()
                .map(|(k, v)| (k, v.to_string()))
                .collect();
            format!("{ordered:?}")
        })
        .collect()
}

fn eval_select(db: &Database, select: &Select, outer: &Env) -> Vec<Row> {
    let mut envs = vec![outer.clone()];
    for table in select.tables() {
        envs = eval_table(db, table, outer, envs);
    }

    let mut rows: Vec<Env> = envs
        .into_iter()
        .filter(|env| {
            select
                .predicate()
                .map_or(true, |p| is_true(&eval_expr(db, p, env)))
        })
        .collect();

    let grouped = !select.group_by().is_empty() || select.has_aggregate_projection();
    if grouped {
        return eval_grouped_select(db, select, rows);
    }

    // Row numbers are assigned over the filtered set, before any outer
    // ordering or windowing applies.
    let row_numbers = assign_row_numbers(db, select, &rows);
    let mut indexed: Vec<(Env, HashMap<usize, i64>)> = rows
        .drain(..)
        .enumerate()
        .map(|(i, env)| {
            let per_projection = row_numbers
                .iter()
                .map(|(proj_idx, numbers)| (*proj_idx, numbers[i]))
                .collect();
            (env, per_projection)
        })
        .collect();

    if !select.order_by().is_empty() {
        indexed.sort_by(|(a, _), (b, _)| compare_orderings(db, select.order_by(), a, b));
    }
    let offset = select.offset().unwrap_or(0) as usize;
    let limit = select.limit().map(|l| l as usize).unwrap_or(usize::MAX);
    indexed = indexed.into_iter().skip(offset).take(limit).collect();

    indexed
        .into_iter()
        .map(|(env, rn)| {
            select
                .projections()
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let value = match &*p.expr {
                        Expr::RowNumber { .. } => Literal::Int(rn[&i]),
                        _ => eval_expr(db, &p.expr, &env),
                    };
                    (p.alias.clone(), value)
                })
                .collect()
        })
        .collect()
}

fn eval_grouped_select(db: &Database, select: &Select, rows: Vec<Env>) -> Vec<Row> {
    let mut groups: Vec<(String, Vec<Env>)> = Vec::new();
    if select.group_by().is_empty() {
        // Implicit single group, present even over an empty input.
        groups.push((String::new(), rows));
    } else {
        let mut index: HashMap<String, usize> = HashMap::new();
        for env in rows {
            let key = select
                .group_by()
                .iter()
                .map(|g| eval_expr(db, g, &env).to_string())
                .collect::<Vec<_>>()
                .join("\u{1}");
            let slot = *index.entry(key.clone()).or_insert_with(|| {
                groups.push((key, Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(env);
        }
    }

    groups
        .into_iter()
        .filter(|(_, members)| {
            select
                .having()
                .map_or(true, |h| is_true(&eval_over_group(db, h, members)))
        })
        .map(|(_, members)| {
            select
                .projections()
                .iter()
                .map(|p| (p.alias.clone(), eval_over_group(db, &p.expr, &members)))
                .collect()
        })
        .collect()
}

/// Row numbers per RowNumber projection: projection index -> value per row.
fn assign_row_numbers(
    db: &Database,
    select: &Select,
    rows: &[Env],
) -> Vec<(usize, Vec<i64>)> {
    let mut out = Vec::new();
    for (proj_idx, p) in select.projections().iter().enumerate() {
        let Expr::RowNumber {
            partition_by,
            order_by,
        } = &*p.expr
        else {
            continue;
        };
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|&a, &b| compare_orderings(db, order_by, &rows[a], &rows[b]));

        let mut numbers = vec![0i64; rows.len()];
        let mut counters: HashMap<String, i64> = HashMap::new();
        for idx in order {
            let key = partition_by
                .iter()
                .map(|e| eval_expr(db, e, &rows[idx]).to_string())
                .collect::<Vec<_>>()
                .join("\u{1}");
            let n = counters.entry(key).or_insert(0);
            *n += 1;
            numbers[idx] = *n;
        }
        out.push((proj_idx, numbers));
    }
    out
}

fn compare_orderings(db: &Database, orderings: &[Ordering], a: &Env, b: &Env) -> CmpOrdering {
    for o in orderings {
        let va = eval_expr(db, &o.expr, a);
        let vb = eval_expr(db, &o.expr, b);
        let cmp = compare_literals(&va, &vb);
        let cmp = if o.asc { cmp } else { cmp.reverse() };
        if cmp != CmpOrdering::Equal {
            return cmp;
        }
    }
    CmpOrdering::Equal
}

fn eval_table(db: &Database, table: &Table, outer: &Env, acc: Vec<Env>) -> Vec<Env> {
    match table {
        Table::Base(b) => {
            let rows = db.rows(b.name());
            acc.into_iter()
                .flat_map(|env| {
                    rows.iter().map(move |row| {
                        let mut extended = env.clone();
                        extended.insert(table_alias(table).to_string(), row.clone());
                        extended
                    })
                })
                .collect()
        }
        Table::Derived(derived) => {
            // Not lateral: the body sees ancestor scopes only.
            let rows = eval_select(db, derived.select(), outer);
            cross_extend(acc, derived.select().alias(), rows)
        }
        Table::Apply(a) => {
            let body = match a.table() {
                Table::Derived(d) => d.select(),
                other => panic!("apply over non-derived table {other}"),
            };
            let mut out = Vec::new();
            for env in acc {
                let rows = eval_select(db, body, &env);
                if rows.is_empty() {
                    if a.kind() == ApplyKind::Outer {
                        let mut extended = env;
                        extended.insert(body.alias().to_string(), null_row(body));
                        out.push(extended);
                    }
                    continue;
                }
                for row in rows {
                    let mut extended = env.clone();
                    extended.insert(body.alias().to_string(), row);
                    out.push(extended);
                }
            }
            out
        }
        Table::Join(j) => {
            let (alias, rows) = match j.table() {
                Table::Base(b) => (table_alias(j.table()).to_string(), db.rows(b.name()).to_vec()),
                Table::Derived(d) => {
                    (d.select().alias().to_string(), eval_select(db, d.select(), outer))
                }
                other => panic!("join over unsupported table {other}"),
            };
            let mut out = Vec::new();
            for env in acc {
                let mut matched = false;
                for row in &rows {
                    let mut extended = env.clone();
                    extended.insert(alias.clone(), row.clone());
                    let keep = j
                        .condition()
                        .map_or(true, |c| is_true(&eval_expr(db, c, &extended)));
                    if keep {
                        matched = true;
                        out.push(extended);
                    }
                }
                match j.kind() {
                    JoinKind::Inner | JoinKind::Cross => {}
                    JoinKind::Left => {
                        if !matched {
                            let mut extended = env;
                            let null = match j.table() {
                                Table::Derived(d) => null_row(d.select()),
                                _ => Row::new(),
                            };
                            extended.insert(alias.clone(), null);
                            out.push(extended);
                        }
                    }
                }
            }
            out
        }
    }
}

fn table_alias(table: &Table) -> &str {
    use decorrelate::table::TableAttrs;
    table.alias()
}

fn cross_extend(acc: Vec<Env>, alias: &str, rows: Vec<Row>) -> Vec<Env> {
    acc.into_iter()
        .flat_map(|env| {
            rows.iter().map(move |row| {
                let mut extended = env.clone();
                extended.insert(alias.to_string(), row.clone());
                extended
            })
        })
        .collect()
}

fn null_row(select: &Select) -> Row {
    select
        .projections()
        .iter()
        .map(|p| (p.alias.clone(), Literal::Null))
        .collect()
}

fn eval_expr(db: &Database, expr: &ExprRef, env: &Env) -> Literal {
    match &**expr {
        Expr::Column(c) => env
            .get(&c.table)
            .unwrap_or_else(|| panic!("unbound alias {}", c.table))
            .get(&c.name)
            .unwrap_or_else(|| panic!("no column {c} in bound row"))
            .clone(),
        Expr::Literal(l) => l.clone(),
        Expr::BinaryOp { op, left, right } => {
            let l = eval_expr(db, left, env);
            let r = eval_expr(db, right, env);
            eval_binary(*op, l, r)
        }
        Expr::UnaryOp { op, operand } => {
            let v = eval_expr(db, operand, env);
            match op {
                UnaryOperator::Not => match v {
                    Literal::Bool(b) => Literal::Bool(!b),
                    _ => Literal::Null,
                },
                UnaryOperator::Neg => match v {
                    Literal::Int(i) => Literal::Int(-i),
                    Literal::Float(f) => Literal::Float(-f),
                    _ => Literal::Null,
                },
                UnaryOperator::IsNull => Literal::Bool(v == Literal::Null),
                UnaryOperator::IsNotNull => Literal::Bool(v != Literal::Null),
                UnaryOperator::Cast(_) => v,
            }
        }
        Expr::FunctionCall { name, args } => {
            if is_aggregate_name(name) {
                panic!("aggregate {name} outside a grouped context");
            }
            match name.to_ascii_uppercase().as_str() {
                "COALESCE" => args
                    .iter()
                    .map(|a| eval_expr(db, a, env))
                    .find(|v| *v != Literal::Null)
                    .unwrap_or(Literal::Null),
                other => panic!("unsupported function {other}"),
            }
        }
        Expr::ScalarSubquery(sub) => {
            let rows = eval_select(db, sub, env);
            assert!(rows.len() <= 1, "scalar subquery produced multiple rows");
            let alias = &sub.projections()[0].alias;
            rows.into_iter()
                .next()
                .map(|mut row| row.remove(alias).unwrap_or(Literal::Null))
                .unwrap_or(Literal::Null)
        }
        Expr::RowNumber { .. } => panic!("row number outside a projection"),
    }
}

fn eval_binary(op: BinaryOperator, l: Literal, r: Literal) -> Literal {
    use BinaryOperator::*;
    match op {
        And => match (truth(&l), truth(&r)) {
            (Some(false), _) | (_, Some(false)) => Literal::Bool(false),
            (Some(true), Some(true)) => Literal::Bool(true),
            _ => Literal::Null,
        },
        Or => match (truth(&l), truth(&r)) {
            (Some(true), _) | (_, Some(true)) => Literal::Bool(true),
            (Some(false), Some(false)) => Literal::Bool(false),
            _ => Literal::Null,
        },
        Eq | NotEq | Lt | LtEq | Gt | GtEq => {
            if l == Literal::Null || r == Literal::Null {
                return Literal::Null;
            }
            let cmp = compare_literals(&l, &r);
            let result = match op {
                Eq => cmp == CmpOrdering::Equal,
                NotEq => cmp != CmpOrdering::Equal,
                Lt => cmp == CmpOrdering::Less,
                LtEq => cmp != CmpOrdering::Greater,
                Gt => cmp == CmpOrdering::Greater,
                GtEq => cmp != CmpOrdering::Less,
                _ => unreachable!(),
            };
            Literal::Bool(result)
        }
        Add | Sub | Mul | Div => match (l, r) {
            (Literal::Int(a), Literal::Int(b)) => Literal::Int(match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div => a / b,
                _ => unreachable!(),
            }),
            (a, b) => match (as_f64(&a), as_f64(&b)) {
                (Some(a), Some(b)) => Literal::Float(match op {
                    Add => a + b,
                    Sub => a - b,
                    Mul => a * b,
                    Div => a / b,
                    _ => unreachable!(),
                }),
                _ => Literal::Null,
            },
        },
    }
}

fn truth(v: &Literal) -> Option<bool> {
    match v {
        Literal::Bool(b) => Some(*b),
        Literal::Null => None,
        other => panic!("non-boolean truth value {other}"),
    }
}

fn is_true(v: &Literal) -> bool {
    matches!(v, Literal::Bool(true))
}

fn as_f64(v: &Literal) -> Option<f64> {
    match v {
        Literal::Int(i) => Some(*i as f64),
        Literal::Float(f) => Some(*f),
        Literal::Decimal(digits, scale) => {
            Some(*digits as f64 / 10f64.powi(*scale as i32))
        }
        _ => None,
    }
}

fn compare_literals(a: &Literal, b: &Literal) -> CmpOrdering {
    match (a, b) {
        (Literal::Null, Literal::Null) => CmpOrdering::Equal,
        (Literal::Null, _) => CmpOrdering::Less,
        (_, Literal::Null) => CmpOrdering::Greater,
        (Literal::Text(x), Literal::Text(y)) => x.cmp(y),
        (Literal::Bool(x), Literal::Bool(y)) => x.cmp(y),
        (Literal::Date(x), Literal::Date(y)) => x.cmp(y),
        (x, y) => match (as_f64(x), as_f64(y)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(CmpOrdering::Equal),
            _ => panic!("cannot compare {x} with {y}"),
        },
    }
}

fn eval_over_group(db: &Database, expr: &ExprRef, group: &[Env]) -> Literal {
    match &**expr {
        Expr::FunctionCall { name, args } if is_aggregate_name(name) => {
            eval_aggregate(db, name, args, group)
        }
        Expr::FunctionCall { name, args } => {
            let evaluated: Vec<Literal> = args
                .iter()
                .map(|a| eval_over_group(db, a, group))
                .collect();
            match name.to_ascii_uppercase().as_str() {
                "COALESCE" => evaluated
                    .into_iter()
                    .find(|v| *v != Literal::Null)
                    .unwrap_or(Literal::Null),
                other => panic!("unsupported function {other}"),
            }
        }
        Expr::BinaryOp { op, left, right } => eval_binary(
            *op,
            eval_over_group(db, left, group),
            eval_over_group(db, right, group),
        ),
        // Group keys and constants: any member row serves.
        _ => match group.first() {
            Some(env) => eval_expr(db, expr, env),
            None => Literal::Null,
        },
    }
}

fn eval_aggregate(db: &Database, name: &str, args: &[ExprRef], group: &[Env]) -> Literal {
    let values: Vec<Literal> = group
        .iter()
        .map(|env| {
            args.first()
                .map(|a| eval_expr(db, a, env))
                .unwrap_or(Literal::Int(1))
        })
        .collect();
    let non_null: Vec<&Literal> = values.iter().filter(|v| **v != Literal::Null).collect();

    match name.to_ascii_uppercase().as_str() {
        "COUNT" | "COUNT_BIG" => Literal::Int(non_null.len() as i64),
        "SUM" => {
            if non_null.is_empty() {
                Literal::Null
            } else if non_null.iter().all(|v| matches!(v, Literal::Int(_))) {
                Literal::Int(
                    non_null
                        .iter()
                        .map(|v| match v {
                            Literal::Int(i) => *i,
                            _ => unreachable!(),
                        })
                        .sum(),
                )
            } else {
                Literal::Float(non_null.iter().filter_map(|v| as_f64(v)).sum())
            }
        }
        "AVG" => {
            if non_null.is_empty() {
                Literal::Null
            } else {
                let sum: f64 = non_null.iter().filter_map(|v| as_f64(v)).sum();
                Literal::Float(sum / non_null.len() as f64)
            }
        }
        "MIN" => non_null
            .into_iter()
            .min_by(|a, b| compare_literals(a, b))
            .cloned()
            .unwrap_or(Literal::Null),
        "MAX" => non_null
            .into_iter()
            .max_by(|a, b| compare_literals(a, b))
            .cloned()
            .unwrap_or(Literal::Null),
        other => panic!("unsupported aggregate {other}"),
    }
}
