//! Aggregation pipelines over in-memory documents.
//!
//! Supported stages: `$match`, `$group`, `$sort`, `$skip`, `$limit`, `$project` and
//! `$count`. `$group` accumulates with `$sum`, `$avg`, `$min`, `$max`, `$push`,
//! `$first` and `$last`; group keys and accumulator operands are literals, `"$path"`
//! references or documents of those.

use std::cmp::Ordering;
use bson::{Bson, Document};

use docmodel_core::error::{StoreError, StoreResult};

use crate::evaluator::{first, matches, project, sort_documents, sort_order};

fn invalid(message: impl Into<String>) -> StoreError {
    StoreError::InvalidOperation(message.into())
}

/// Runs `pipeline` over `documents`.
pub(crate) fn run_pipeline(mut documents: Vec<Document>, pipeline: &[Document]) -> StoreResult<Vec<Document>> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((name, spec)), None) = (entries.next(), entries.next()) else {
            return Err(invalid("a pipeline stage must have exactly one field"));
        };

        documents = match name.as_str() {
            "$match" => {
                let filter = as_document(name, spec)?;
                let mut kept = Vec::with_capacity(documents.len());
                for document in documents {
                    if matches(&document, filter)? {
                        kept.push(document);
                    }
                }
                kept
            }
            "$sort" => {
                sort_documents(&mut documents, as_document(name, spec)?);
                documents
            }
            "$skip" => {
                let skip = as_count(name, spec)?;
                documents.into_iter().skip(skip).collect()
            }
            "$limit" => {
                let limit = as_count(name, spec)?;
                documents.into_iter().take(limit).collect()
            }
            "$project" => {
                let projection = as_document(name, spec)?;
                documents
                    .iter()
                    .map(|document| project(document, projection))
                    .collect::<StoreResult<Vec<_>>>()?
            }
            "$group" => group(documents, as_document(name, spec)?)?,
            "$count" => {
                let Bson::String(field) = spec else {
                    return Err(invalid("$count needs a field name"));
                };
                if documents.is_empty() {
                    Vec::new()
                } else {
                    let mut counted = Document::new();
                    counted.insert(field.clone(), number(documents.len() as i64));
                    vec![counted]
                }
            }
            other => return Err(invalid(format!("unsupported pipeline stage: {other}"))),
        };
    }

    Ok(documents)
}

fn as_document<'a>(stage: &str, spec: &'a Bson) -> StoreResult<&'a Document> {
    spec.as_document()
        .ok_or_else(|| invalid(format!("{stage} needs a document")))
}

fn as_count(stage: &str, spec: &Bson) -> StoreResult<usize> {
    let value = match spec {
        Bson::Int32(value) => i64::from(*value),
        Bson::Int64(value) => *value,
        Bson::Double(value) if value.fract() == 0.0 => *value as i64,
        _ => return Err(invalid(format!("{stage} needs an integer"))),
    };

    usize::try_from(value).map_err(|_| invalid(format!("{stage} must not be negative")))
}

/// An integer as the store reports it: 32-bit when it fits.
fn number(value: i64) -> Bson {
    match i32::try_from(value) {
        Ok(value) => Bson::Int32(value),
        Err(_) => Bson::Int64(value),
    }
}

/// Evaluates a group key or accumulator operand against one document.
fn evaluate(document: &Document, expression: &Bson) -> Bson {
    match expression {
        Bson::String(reference) if reference.starts_with('$') => first(document, &reference[1..])
            .cloned()
            .unwrap_or(Bson::Null),
        Bson::Document(fields) => Bson::Document(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), evaluate(document, value)))
                .collect(),
        ),
        literal => literal.clone(),
    }
}

#[derive(Debug)]
enum Accumulator {
    Sum { int: i64, double: f64, is_double: bool },
    Avg { total: f64, count: u64 },
    Min(Option<Bson>),
    Max(Option<Bson>),
    Push(Vec<Bson>),
    First(Option<Bson>),
    Last(Bson),
}

/// Adds to an integer sum, moving it to the double total once it no longer fits.
fn add_integer(int: &mut i64, double: &mut f64, is_double: &mut bool, value: i64) {
    match int.checked_add(value) {
        Some(sum) => *int = sum,
        None => {
            *double += *int as f64 + value as f64;
            *int = 0;
            *is_double = true;
        }
    }
}

impl Accumulator {
    fn new(op: &str) -> StoreResult<Self> {
        Ok(match op {
            "$sum" => Accumulator::Sum { int: 0, double: 0.0, is_double: false },
            "$avg" => Accumulator::Avg { total: 0.0, count: 0 },
            "$min" => Accumulator::Min(None),
            "$max" => Accumulator::Max(None),
            "$push" => Accumulator::Push(Vec::new()),
            "$first" => Accumulator::First(None),
            "$last" => Accumulator::Last(Bson::Null),
            other => return Err(invalid(format!("unsupported accumulator: {other}"))),
        })
    }

    fn add(&mut self, value: Bson) {
        match self {
            Accumulator::Sum { int, double, is_double } => match value {
                Bson::Int32(v) => add_integer(int, double, is_double, i64::from(v)),
                Bson::Int64(v) => add_integer(int, double, is_double, v),
                Bson::Double(v) => {
                    *double += v;
                    *is_double = true;
                }
                _ => {}
            },
            Accumulator::Avg { total, count } => {
                let v = match value {
                    Bson::Int32(v) => f64::from(v),
                    Bson::Int64(v) => v as f64,
                    Bson::Double(v) => v,
                    _ => return,
                };
                *total += v;
                *count += 1;
            }
            Accumulator::Min(current) => {
                if !matches!(value, Bson::Null)
                    && current
                        .as_ref()
                        .is_none_or(|c| sort_order(Some(&value), Some(c)) == Ordering::Less)
                {
                    *current = Some(value);
                }
            }
            Accumulator::Max(current) => {
                if !matches!(value, Bson::Null)
                    && current
                        .as_ref()
                        .is_none_or(|c| sort_order(Some(&value), Some(c)) == Ordering::Greater)
                {
                    *current = Some(value);
                }
            }
            Accumulator::Push(items) => items.push(value),
            Accumulator::First(current) => {
                if current.is_none() {
                    *current = Some(value);
                }
            }
            Accumulator::Last(current) => *current = value,
        }
    }

    fn finish(self) -> Bson {
        match self {
            Accumulator::Sum { int, double, is_double } => {
                if is_double {
                    Bson::Double(double + int as f64)
                } else {
                    number(int)
                }
            }
            Accumulator::Avg { total, count } => {
                if count == 0 {
                    Bson::Null
                } else {
                    Bson::Double(total / count as f64)
                }
            }
            Accumulator::Min(value) | Accumulator::Max(value) | Accumulator::First(value) => {
                value.unwrap_or(Bson::Null)
            }
            Accumulator::Push(items) => Bson::Array(items),
            Accumulator::Last(value) => value,
        }
    }
}

struct Group {
    key: Bson,
    accumulators: Vec<(String, Accumulator)>,
}

fn group(documents: Vec<Document>, spec: &Document) -> StoreResult<Vec<Document>> {
    let key_expression = spec
        .get("_id")
        .ok_or_else(|| invalid("$group needs an _id"))?;

    let mut fields = Vec::new();
    for (field, accumulator) in spec.iter().filter(|(field, _)| *field != "_id") {
        let Bson::Document(accumulator) = accumulator else {
            return Err(invalid(format!("$group field '{field}' needs an accumulator")));
        };
        let mut entries = accumulator.iter();
        let (Some((op, operand)), None) = (entries.next(), entries.next()) else {
            return Err(invalid(format!("$group field '{field}' needs exactly one accumulator")));
        };

        Accumulator::new(op)?;
        fields.push((field.clone(), op.clone(), operand.clone()));
    }

    let mut groups: Vec<Group> = Vec::new();

    for document in &documents {
        let key = evaluate(document, key_expression);
        let index = match groups.iter().position(|group| group.key == key) {
            Some(index) => index,
            None => {
                let accumulators = fields
                    .iter()
                    .map(|(field, op, _)| Ok((field.clone(), Accumulator::new(op)?)))
                    .collect::<StoreResult<Vec<_>>>()?;
                groups.push(Group { key, accumulators });
                groups.len() - 1
            }
        };

        for ((_, accumulator), (_, _, operand)) in groups[index].accumulators.iter_mut().zip(&fields) {
            accumulator.add(evaluate(document, operand));
        }
    }

    Ok(groups
        .into_iter()
        .map(|group| {
            let mut out = Document::new();
            out.insert("_id", group.key);
            for (field, accumulator) in group.accumulators {
                out.insert(field, accumulator.finish());
            }
            out
        })
        .collect())
}
