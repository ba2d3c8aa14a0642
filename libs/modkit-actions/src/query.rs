//! Query assembly shared by every action.

use sea_orm::sea_query::{Alias, Condition, Expr, Query, SelectStatement};
use serde_json::Value;

use crate::alias::AliasMap;
use crate::descriptor::EntityDescriptor;
use crate::record::{Record, sql_value};

/// Select of the entity's projection with `filter` applied and every join folded in.
///
/// Projection items whose relation is neither the primary one nor a join
/// target are dropped, so a descriptor may list joined columns before the join exists.
#[must_use]
pub fn assemble(d: &EntityDescriptor, filter: Condition) -> SelectStatement {
    let mut q = Query::select();
    for arg in d.select_args() {
        if d.has_relation(&arg.origin.relation) {
            q.expr_as(arg.origin.expr(), Alias::new(&arg.alias));
        }
    }
    q.from(d.table_ref()).cond_where(filter);
    for join in d.joins() {
        join.apply(&mut q);
    }
    q
}

/// `COUNT(*) AS total` over the same relations and filter as [`assemble`].
#[must_use]
pub fn assemble_count(d: &EntityDescriptor, filter: Condition) -> SelectStatement {
    let mut q = Query::select();
    q.expr_as(Expr::cust("COUNT(*)"), Alias::new("total"))
        .from(d.table_ref())
        .cond_where(filter);
    for join in d.joins() {
        join.apply(&mut q);
    }
    q
}

/// AND of `column = value` over `args`, columns resolved through the alias map.
#[must_use]
pub fn make_where(args: &Record, aliases: &AliasMap, primary: &str) -> Condition {
    aliases
        .qualify(args, primary)
        .into_iter()
        .fold(Condition::all(), |cond, (col, value)| {
            if value.is_null() {
                cond.add(Expr::expr(col.expr()).is_null())
            } else {
                cond.add(Expr::expr(col.expr()).eq(sql_value(value)))
            }
        })
}

/// AND of `primary.column = value`, bypassing aliases; for key lookups.
#[must_use]
pub fn primary_where(args: &Record, primary: &str) -> Condition {
    make_where(args, &AliasMap::default(), primary)
}

/// AND of bare `column = value`, for writes against the primary relation only.
#[must_use]
pub fn key_where(args: &Record) -> Condition {
    args.iter().fold(Condition::all(), |cond, (col, value)| {
        let col = Expr::col(Alias::new(col));
        if value.is_null() {
            cond.add(col.is_null())
        } else {
            cond.add(col.eq(sql_value(value)))
        }
    })
}

/// How bulk-where columns are written.
#[derive(Debug, Clone, Copy)]
pub enum ColumnStyle<'a> {
    /// `relation.column` via the alias map; for selects that may join.
    Qualified(&'a AliasMap, &'a str),
    /// Bare column names; for UPDATE and DELETE on the primary relation.
    Bare,
}

impl ColumnStyle<'_> {
    fn col(self, name: &str) -> sea_orm::sea_query::SimpleExpr {
        match self {
            Self::Qualified(aliases, primary) => aliases.resolve(name, primary).expr(),
            Self::Bare => Expr::col(Alias::new(name)).into(),
        }
    }
}

/// Predicate matching every record of `records` by `keys`.
///
/// A single key compiles to `IN`; composite keys to an OR of AND tuples.
/// With `negate`, the complement: `NOT IN`, or an AND of negated tuples.
/// Records missing a key value are skipped.
#[must_use]
pub fn bulk_where(records: &[Record], keys: &[String], style: ColumnStyle<'_>, negate: bool) -> Condition {
    if let [key] = keys {
        let values: Vec<_> = records
            .iter()
            .filter_map(|r| r.get(key).filter(|v| !v.is_null()))
            .map(sql_value)
            .collect();
        let col = Expr::expr(style.col(key));
        let expr = if negate { col.is_not_in(values) } else { col.is_in(values) };
        return Condition::all().add(expr);
    }

    let tuples: Vec<Condition> = records
        .iter()
        .filter_map(|r| {
            keys.iter()
                .map(|k| r.get(k).filter(|v| !v.is_null()).map(|v| (k.as_str(), v)))
                .collect::<Option<Vec<(&str, &Value)>>>()
        })
        .map(|tuple| tuple_eq(&tuple, style))
        .collect();

    if negate {
        tuples
            .into_iter()
            .fold(Condition::all(), |cond, tuple| cond.add(tuple.not()))
    } else if tuples.is_empty() {
        // an empty OR would render as no predicate at all
        Condition::all().add(Expr::val(1).eq(0))
    } else {
        tuples.into_iter().fold(Condition::any(), |acc, t| acc.add(t))
    }
}

fn tuple_eq(tuple: &[(&str, &Value)], style: ColumnStyle<'_>) -> Condition {
    tuple.iter().fold(Condition::all(), |cond, (k, v)| {
        cond.add(Expr::expr(style.col(k)).eq(sql_value(v)))
    })
}
