//! Filter evaluation, sorting and projection over in-memory documents.
//!
//! Filters use the MongoDB query language subset below:
//!
//! - field equality, with dotted paths and array membership (`{ "tags": "red" }`)
//! - comparison: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`
//! - sets: `$in`, `$nin`
//! - `$exists`, `$not`
//! - logical: `$and`, `$or`, `$nor`
//!
//! Values of different BSON types never compare as equal or ordered in a filter. For
//! sorting, types are ranked the way MongoDB ranks them (null < numbers < strings <
//! documents < arrays < object ids < booleans < dates).

use std::{cmp::Ordering, collections::HashMap};
use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use docmodel_core::error::{StoreError, StoreResult};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Any other type, compared by value only.
    Opaque(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            other => Comparable::Opaque(other),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Opaque(a), Comparable::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            (Comparable::Array(a), Comparable::Array(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl<'a> Comparable<'a> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 1,
            Comparable::Number(_) => 2,
            Comparable::String(_) => 3,
            Comparable::Map(_) => 4,
            Comparable::Array(_) => 5,
            Comparable::Opaque(_) => 6,
            Comparable::ObjectId(_) => 7,
            Comparable::Bool(_) => 8,
            Comparable::DateTime(_) => 9,
        }
    }

    /// Total order used for sorting: type rank first, then value.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.partial_cmp(other).unwrap_or(Ordering::Equal))
    }
}

/// Compares two optional values in sort order; a missing value sorts like null.
pub(crate) fn sort_order(left: Option<&Bson>, right: Option<&Bson>) -> Ordering {
    let left = left.map(Comparable::from).unwrap_or(Comparable::Null);
    let right = right.map(Comparable::from).unwrap_or(Comparable::Null);

    left.sort_cmp(&right)
}

/// Resolves a dotted path. Arrays along the way are traversed element-wise, unless the
/// next segment is a numeric index.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let mut out = Vec::new();
    let segments = path.split('.').collect::<Vec<_>>();

    if let Some((first, rest)) = segments.split_first() {
        if let Some(value) = document.get(*first) {
            descend(value, rest, &mut out);
        }
    }

    out
}

fn descend<'a>(value: &'a Bson, rest: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((segment, tail)) = rest.split_first() else {
        out.push(value);
        return;
    };

    match value {
        Bson::Document(doc) => {
            if let Some(next) = doc.get(*segment) {
                descend(next, tail, out);
            }
        }
        Bson::Array(items) => match segment.parse::<usize>() {
            Ok(index) => {
                if let Some(next) = items.get(index) {
                    descend(next, tail, out);
                }
            }
            Err(_) => {
                for item in items {
                    if let Bson::Document(_) = item {
                        descend(item, rest, out);
                    }
                }
            }
        },
        _ => {}
    }
}

/// The first value at `path`, if any.
pub(crate) fn first<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    lookup(document, path).into_iter().next()
}

/// Whether `document` matches `filter`.
///
/// # Errors
///
/// Returns [`StoreError::InvalidOperation`] for unknown or malformed operators.
pub(crate) fn matches(document: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(document, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(document, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for clause in clauses(key, condition)? {
                    if matches(document, clause)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            op if op.starts_with('$') => {
                return Err(StoreError::InvalidOperation(format!("unknown top level operator: {op}")));
            }
            path => matches_field(&lookup(document, path), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn clauses<'a>(op: &str, condition: &'a Bson) -> StoreResult<Vec<&'a Document>> {
    let Bson::Array(items) = condition else {
        return Err(StoreError::InvalidOperation(format!("{op} must be an array")));
    };

    items
        .iter()
        .map(|item| {
            item.as_document()
                .ok_or_else(|| StoreError::InvalidOperation(format!("{op} entries must be documents")))
        })
        .collect()
}

fn is_operator_document(condition: &Bson) -> bool {
    match condition {
        Bson::Document(doc) => doc
            .keys()
            .next()
            .is_some_and(|key| key.starts_with('$')),
        _ => false,
    }
}

fn matches_field(values: &[&Bson], condition: &Bson) -> StoreResult<bool> {
    if !is_operator_document(condition) {
        return Ok(equals_any(values, condition));
    }

    let Bson::Document(operators) = condition else {
        return Ok(false);
    };

    for (op, operand) in operators {
        let matched = match op.as_str() {
            "$eq" => equals_any(values, operand),
            "$ne" => !equals_any(values, operand),
            "$gt" => compares_any(values, operand, |o| o == Ordering::Greater),
            "$gte" => compares_any(values, operand, |o| o != Ordering::Less),
            "$lt" => compares_any(values, operand, |o| o == Ordering::Less),
            "$lte" => compares_any(values, operand, |o| o != Ordering::Greater),
            "$in" => in_set(values, op, operand)?,
            "$nin" => !in_set(values, op, operand)?,
            "$exists" => !values.is_empty() == truthy(operand),
            "$not" => match operand {
                Bson::Document(_) => !matches_field(values, operand)?,
                _ => return Err(StoreError::InvalidOperation("$not needs a document".to_string())),
            },
            other => return Err(StoreError::InvalidOperation(format!("unknown operator: {other}"))),
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Equality the way a query sees it: a missing field equals null, and an array field
/// matches if the whole array or any element matches.
fn equals_any(values: &[&Bson], expected: &Bson) -> bool {
    let expected = Comparable::from(expected);

    if values.is_empty() {
        return expected == Comparable::Null;
    }

    values.iter().any(|value| {
        let value = Comparable::from(*value);

        if value == expected {
            return true;
        }

        match value {
            Comparable::Array(items) => items.iter().any(|item| item == &expected),
            _ => false,
        }
    })
}

fn compares_any(values: &[&Bson], operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let operand = Comparable::from(operand);

    values.iter().any(|value| {
        let value = Comparable::from(*value);
        let candidates = match value {
            Comparable::Array(items) => items,
            single => vec![single],
        };

        candidates
            .iter()
            .any(|candidate| candidate.partial_cmp(&operand).is_some_and(&accept))
    })
}

fn in_set(values: &[&Bson], op: &str, operand: &Bson) -> StoreResult<bool> {
    let Bson::Array(options) = operand else {
        return Err(StoreError::InvalidOperation(format!("{op} needs an array")));
    };

    Ok(options.iter().any(|option| equals_any(values, option)))
}

pub(crate) fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(value) => *value,
        Bson::Int32(value) => *value != 0,
        Bson::Int64(value) => *value != 0,
        Bson::Double(value) => *value != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

/// Compares two documents by a sort specification. Each key sorts ascending on `1` and
/// descending on `-1`.
pub(crate) fn compare_documents(a: &Document, b: &Document, sort: &Document) -> Ordering {
    for (path, direction) in sort {
        let descending = match direction {
            Bson::Int32(d) => *d < 0,
            Bson::Int64(d) => *d < 0,
            Bson::Double(d) => *d < 0.0,
            _ => false,
        };

        let ordering = sort_order(first(a, path), first(b, path));
        let ordering = if descending { ordering.reverse() } else { ordering };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Stable multi-key sort.
pub(crate) fn sort_documents(documents: &mut [Document], sort: &Document) {
    documents.sort_by(|a, b| compare_documents(a, b, sort));
}

/// Applies a projection to one document.
///
/// A projection either includes (`1`/`true`) or excludes (`0`/`false`) top-level fields.
/// `_id` is kept unless excluded explicitly. A string starting with `$` includes the
/// value at that path under the projected name.
///
/// # Errors
///
/// Returns [`StoreError::InvalidOperation`] when inclusion and exclusion are mixed.
pub(crate) fn project(document: &Document, projection: &Document) -> StoreResult<Document> {
    if projection.is_empty() {
        return Ok(document.clone());
    }

    let is_include = |value: &Bson| truthy(value) || matches!(value, Bson::String(s) if s.starts_with('$'));
    let including = projection
        .iter()
        .any(|(key, value)| key != "_id" && is_include(value));
    let excluding = projection
        .iter()
        .any(|(key, value)| key != "_id" && !is_include(value));

    if including && excluding {
        return Err(StoreError::InvalidOperation(
            "cannot mix inclusion and exclusion in a projection".to_string(),
        ));
    }

    if !including {
        let mut projected = document.clone();
        for (key, _) in projection.iter().filter(|(_, value)| !is_include(*value)) {
            projected.remove(key);
        }
        return Ok(projected);
    }

    let mut projected = Document::new();
    let keep_id = projection
        .get("_id")
        .map(truthy)
        .unwrap_or(true);

    if keep_id {
        if let Some(id) = document.get("_id") {
            projected.insert("_id", id.clone());
        }
    }

    for (key, value) in projection {
        if key == "_id" {
            continue;
        }

        match value {
            Bson::String(reference) if reference.starts_with('$') => {
                if let Some(found) = first(document, &reference[1..]) {
                    projected.insert(key.clone(), found.clone());
                }
            }
            _ => {
                if let Some(found) = document.get(key) {
                    projected.insert(key.clone(), found.clone());
                }
            }
        }
    }

    Ok(projected)
}
