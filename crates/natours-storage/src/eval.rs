//! Filter matching and sort ordering over stored tours.
//!
//! Literals arrive as strings and are cast against the schema type of the
//! field they filter. Unknown fields match nothing.

use chrono::{DateTime, Utc};
use natours_core::{
    parse_number, parse_timestamp, CmpOp, Condition, FieldRef, FieldType, Filter, Order, Result,
    SortKey, Tour, TourError,
};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Number(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

#[derive(Debug, Clone)]
enum Test {
    Eq(Scalar),
    Cmp(Vec<(CmpOp, Scalar)>),
}

#[derive(Debug, Clone)]
struct Clause {
    field: String,
    test: Test,
}

#[derive(Debug, Clone, Default)]
pub struct CompiledFilter {
    clauses: Vec<Clause>,
    never: bool,
}

impl CompiledFilter {
    pub fn compile(filter: &Filter) -> Result<Self> {
        let mut out = CompiledFilter::default();
        for (field, cond) in filter.0.iter() {
            let Some(ty) = Tour::field_type(field) else {
                out.never = true;
                continue;
            };
            let test = match cond {
                Condition::Eq(lit) => Test::Eq(cast(field, ty, lit)?),
                Condition::Cmp(ops) => {
                    let mut cmps = Vec::with_capacity(ops.len());
                    for (op, lit) in ops.iter() {
                        cmps.push((*op, cast(field, ty, lit)?));
                    }
                    Test::Cmp(cmps)
                }
            };
            out.clauses.push(Clause {
                field: field.clone(),
                test,
            });
        }
        Ok(out)
    }

    pub fn matches(&self, tour: &Tour) -> bool {
        if self.never {
            return false;
        }
        self.clauses.iter().all(|c| {
            let Some(value) = tour.field(&c.field) else {
                return false;
            };
            elements(value).into_iter().any(|el| match &c.test {
                Test::Eq(s) => compare(el, s) == Some(Ordering::Equal),
                Test::Cmp(cmps) => cmps
                    .iter()
                    .all(|(op, s)| compare(el, s).map(|o| op.holds(o)).unwrap_or(false)),
            })
        })
    }
}

fn cast(field: &str, ty: FieldType, lit: &str) -> Result<Scalar> {
    let cast_err = |type_name: &str| {
        TourError::MalformedFilter(format!(
            "Cast to {type_name} failed for value {lit:?} at path {field:?}"
        ))
    };
    match ty {
        FieldType::Number => parse_number(lit)
            .map(Scalar::Number)
            .ok_or_else(|| cast_err("Number")),
        FieldType::Timestamp | FieldType::TimestampList => parse_timestamp(lit)
            .map(Scalar::Timestamp)
            .ok_or_else(|| cast_err("date")),
        FieldType::Id | FieldType::Text | FieldType::TextList => Ok(Scalar::Text(lit.to_string())),
    }
}

fn elements(value: FieldRef<'_>) -> Vec<FieldRef<'_>> {
    match value {
        FieldRef::Texts(items) => items.iter().map(|s| FieldRef::Text(s)).collect(),
        FieldRef::Timestamps(items) => items.iter().map(|t| FieldRef::Timestamp(*t)).collect(),
        other => vec![other],
    }
}

fn compare(value: FieldRef<'_>, scalar: &Scalar) -> Option<Ordering> {
    match (value, scalar) {
        (FieldRef::Number(a), Scalar::Number(b)) => a.partial_cmp(b),
        (FieldRef::Text(a), Scalar::Text(b)) => Some(a.cmp(b.as_str())),
        (FieldRef::Timestamp(a), Scalar::Timestamp(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Multi-key ordering; missing values sort first, arrays by first element.
pub fn sort_cmp(a: &Tour, b: &Tour, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let ord = cmp_refs(
            a.field(&key.field).unwrap_or(FieldRef::Null),
            b.field(&key.field).unwrap_or(FieldRef::Null),
        );
        let ord = match key.order {
            Order::Asc => ord,
            Order::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn head(value: FieldRef<'_>) -> FieldRef<'_> {
    match value {
        FieldRef::Texts(items) => items.first().map_or(FieldRef::Null, |s| FieldRef::Text(s)),
        FieldRef::Timestamps(items) => items
            .first()
            .map_or(FieldRef::Null, |t| FieldRef::Timestamp(*t)),
        other => other,
    }
}

fn rank(value: &FieldRef<'_>) -> u8 {
    match value {
        FieldRef::Null => 0,
        FieldRef::Number(_) => 1,
        FieldRef::Text(_) => 2,
        FieldRef::Timestamp(_) => 3,
        FieldRef::Texts(_) | FieldRef::Timestamps(_) => 4,
    }
}

fn cmp_refs(a: FieldRef<'_>, b: FieldRef<'_>) -> Ordering {
    let (a, b) = (head(a), head(b));
    match (a, b) {
        (FieldRef::Number(x), FieldRef::Number(y)) => x.total_cmp(&y),
        (FieldRef::Text(x), FieldRef::Text(y)) => x.cmp(y),
        (FieldRef::Timestamp(x), FieldRef::Timestamp(y)) => x.cmp(&y),
        (a, b) => rank(&a).cmp(&rank(&b)),
    }
}
