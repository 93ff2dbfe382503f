//! Update operators and replacement documents.
//!
//! Supported operators: `$set`, `$unset`, `$inc`, `$push` (with `$each`) and
//! `$setOnInsert`. `_id` is immutable once stored.

use bson::{Bson, Document};

use docmodel_core::error::{StoreError, StoreResult};

const ID: &str = "_id";

fn invalid(message: impl Into<String>) -> StoreError {
    StoreError::InvalidOperation(message.into())
}

/// Checks that an update consists of operators only.
pub(crate) fn check_update(update: &Document) -> StoreResult<()> {
    if update.is_empty() {
        return Err(invalid("update document must not be empty"));
    }
    if !update.keys().all(|key| key.starts_with('$')) {
        return Err(invalid("update document requires atomic operators"));
    }

    Ok(())
}

/// Checks that a replacement contains no operators.
pub(crate) fn check_replacement(replacement: &Document) -> StoreResult<()> {
    if replacement.keys().any(|key| key.starts_with('$')) {
        return Err(invalid("replacement document must not contain atomic operators"));
    }

    Ok(())
}

/// Applies update operators in place and reports whether the document changed.
///
/// `$setOnInsert` only applies when `inserting` is set.
pub(crate) fn apply_update(document: &mut Document, update: &Document, inserting: bool) -> StoreResult<bool> {
    let before = document.clone();

    for (op, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(invalid(format!("{op} needs a document")));
        };

        for (path, value) in fields {
            if path == ID && op != "$setOnInsert" && before.get(ID).is_some_and(|id| id != value) {
                return Err(invalid("the '_id' field is immutable"));
            }

            match op.as_str() {
                "$set" => set_path(document, path, value.clone())?,
                "$setOnInsert" => {
                    if inserting {
                        set_path(document, path, value.clone())?;
                    }
                }
                "$unset" => {
                    if path == ID {
                        return Err(invalid("the '_id' field is immutable"));
                    }
                    unset_path(document, path);
                }
                "$inc" => {
                    let current = get_path(document, path).cloned();
                    set_path(document, path, increment(path, current, value)?)?;
                }
                "$push" => {
                    let current = get_path(document, path).cloned();
                    set_path(document, path, push(path, current, value)?)?;
                }
                other => return Err(invalid(format!("unknown update operator: {other}"))),
            }
        }
    }

    Ok(*document != before)
}

/// Replaces the contents of `document`, keeping its identity.
pub(crate) fn apply_replacement(document: &mut Document, replacement: &Document) -> StoreResult<bool> {
    let id = document.get(ID).cloned();

    if let (Some(id), Some(new_id)) = (&id, replacement.get(ID)) {
        if id != new_id {
            return Err(invalid("the '_id' field is immutable"));
        }
    }

    let mut next = Document::new();
    if let Some(id) = id {
        next.insert(ID, id);
    }
    for (key, value) in replacement {
        if key != ID {
            next.insert(key.clone(), value.clone());
        }
    }

    let changed = next != *document;
    *document = next;

    Ok(changed)
}

/// The document an upsert starts from: the equality conditions of the filter.
pub(crate) fn upsert_seed(filter: &Document) -> StoreResult<Document> {
    let mut seed = Document::new();

    for (key, condition) in filter {
        if key.starts_with('$') {
            continue;
        }

        match condition {
            Bson::Document(operators) if operators.keys().next().is_some_and(|k| k.starts_with('$')) => {
                if let Some(value) = operators.get("$eq") {
                    set_path(&mut seed, key, value.clone())?;
                }
            }
            value => set_path(&mut seed, key, value.clone())?,
        }
    }

    Ok(seed)
}

fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }

    Some(current)
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> StoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, tail)) => {
            let child = document
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(Document::new()));

            match child {
                Bson::Document(child) => set_path(child, tail, value),
                _ => Err(invalid(format!("cannot create field '{tail}' in non-document '{head}'"))),
            }
        }
    }
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, tail)) => {
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                unset_path(child, tail);
            }
        }
    }
}

fn increment(path: &str, current: Option<Bson>, by: &Bson) -> StoreResult<Bson> {
    let current = current.unwrap_or(Bson::Int32(0));

    let overflow = || invalid(format!("$inc overflow on '{path}'"));

    Ok(match (current, by) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(a) + i64::from(*b)),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(a).checked_add(*b).ok_or_else(overflow)?),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.checked_add(i64::from(*b)).ok_or_else(overflow)?),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b).ok_or_else(overflow)?),
        (Bson::Double(a), Bson::Int32(b)) => Bson::Double(a + f64::from(*b)),
        (Bson::Double(a), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Bson::Int32(a), Bson::Double(b)) => Bson::Double(f64::from(a) + b),
        (Bson::Int64(a), Bson::Double(b)) => Bson::Double(a as f64 + b),
        (Bson::Double(a), Bson::Double(b)) => Bson::Double(a + b),
        _ => return Err(invalid(format!("cannot apply $inc to non-numeric field '{path}'"))),
    })
}

fn push(path: &str, current: Option<Bson>, value: &Bson) -> StoreResult<Bson> {
    let mut items = match current {
        None => Vec::new(),
        Some(Bson::Array(items)) => items,
        Some(_) => return Err(invalid(format!("cannot apply $push to non-array field '{path}'"))),
    };

    match value {
        Bson::Document(modifiers) if modifiers.contains_key("$each") => match modifiers.get("$each") {
            Some(Bson::Array(each)) => items.extend(each.iter().cloned()),
            _ => return Err(invalid("$each needs an array")),
        },
        single => items.push(single.clone()),
    }

    Ok(Bson::Array(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_set_unset_inc() {
        let mut document = doc! { "_id": 1, "name": "Ren", "visits": 1, "hat": "fez" };

        let changed = apply_update(
            &mut document,
            &doc! { "$set": { "owner.name": "Stimpy" }, "$unset": { "hat": "" }, "$inc": { "visits": 2 } },
            false,
        )
        .unwrap();

        assert!(changed);
        assert_eq!(document, doc! { "_id": 1, "name": "Ren", "visits": 3, "owner": { "name": "Stimpy" } });
    }

    #[test]
    fn test_noop_update_reports_unchanged() {
        let mut document = doc! { "_id": 1, "name": "Ren" };

        assert!(!apply_update(&mut document, &doc! { "$set": { "name": "Ren" } }, false).unwrap());
    }

    #[test]
    fn test_push_and_each() {
        let mut document = doc! { "tags": ["a"] };

        apply_update(&mut document, &doc! { "$push": { "tags": "b" } }, false).unwrap();
        apply_update(&mut document, &doc! { "$push": { "tags": { "$each": ["c", "d"] } } }, false).unwrap();

        assert_eq!(document, doc! { "tags": ["a", "b", "c", "d"] });
    }

    #[test]
    fn test_identity_is_immutable() {
        let mut document = doc! { "_id": 1, "name": "Ren" };

        assert!(apply_update(&mut document, &doc! { "$set": { "_id": 2 } }, false).is_err());
        assert!(apply_replacement(&mut document, &doc! { "_id": 2, "name": "Ren" }).is_err());
    }

    #[test]
    fn test_set_on_insert_only_when_inserting() {
        let mut existing = doc! { "name": "Ren" };
        apply_update(&mut existing, &doc! { "$setOnInsert": { "created": true } }, false).unwrap();
        assert!(!existing.contains_key("created"));

        let mut fresh = doc! { "name": "Ren" };
        apply_update(&mut fresh, &doc! { "$setOnInsert": { "created": true } }, true).unwrap();
        assert!(fresh.get_bool("created").unwrap());
    }

    #[test]
    fn test_replacement_keeps_identity() {
        let mut document = doc! { "_id": 1, "name": "Ren", "hat": "fez" };

        apply_replacement(&mut document, &doc! { "name": "Stimpy" }).unwrap();

        assert_eq!(document, doc! { "_id": 1, "name": "Stimpy" });
    }

    #[test]
    fn test_upsert_seed_takes_equality_fields() {
        let seed = upsert_seed(&doc! {
            "name": "Ren",
            "age": { "$gt": 3 },
            "hat": { "$eq": "fez" },
            "$or": [{ "x": 1 }],
        })
        .unwrap();

        assert_eq!(seed, doc! { "name": "Ren", "hat": "fez" });
    }

    #[test]
    fn test_update_shape_checks() {
        assert!(check_update(&doc! { "name": "Ren" }).is_err());
        assert!(check_update(&doc! {}).is_err());
        assert!(check_update(&doc! { "$set": { "name": "Ren" } }).is_ok());
        assert!(check_replacement(&doc! { "$set": { "name": "Ren" } }).is_err());
    }

    #[test]
    fn test_inc_overflow_is_rejected() {
        let mut document = doc! { "_id": 1, "hits": i64::MAX };

        let result = apply_update(&mut document, &doc! { "$inc": { "hits": 1_i64 } }, false);
        assert!(matches!(result, Err(StoreError::InvalidOperation(message)) if message.contains("hits")));

        let result = apply_update(&mut document, &doc! { "$inc": { "hits": 1 } }, false);
        assert!(matches!(result, Err(StoreError::InvalidOperation(_))));
        assert_eq!(document, doc! { "_id": 1, "hits": i64::MAX });
    }

    #[test]
    fn test_inc_widens_int32_overflow() {
        let mut document = doc! { "hits": i32::MAX };

        apply_update(&mut document, &doc! { "$inc": { "hits": 1 } }, false).unwrap();

        assert_eq!(document, doc! { "hits": i64::from(i32::MAX) + 1 });
    }
}
