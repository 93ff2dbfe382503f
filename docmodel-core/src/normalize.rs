//! Conversion of raw store results into model instances.
//!
//! Store operations return driver-native shapes. Each query operation knows which shape
//! it gets back and tags it as a [`RawResult`] variant; [`normalize`] then turns it into
//! a [`Normalized`] value. The per-shape helpers [`one`], [`many`] and [`optional`] are
//! what the query proxy calls directly.
//!
//! Normalization is idempotent: a [`Normalized`] value converts back into a
//! [`RawResult`], and normalizing it again yields the same value. The only failure is
//! a schema rejection while wrapping a document.

use bson::{Bson, Document};

use crate::{
    error::ModelResult,
    model::{ID_FIELD, Model, ModelExt},
};

/// A raw result, tagged with the shape the producing operation declared.
#[derive(Debug, Clone)]
pub enum RawResult<M> {
    /// Documents drained from a cursor.
    Documents(Vec<Document>),
    /// The value of a find-and-modify: the document, or `None` on a miss.
    Modified(Option<Document>),
    /// Documents acknowledged by an insert.
    Inserted(Vec<Document>),
    /// A single bare document.
    Document(Document),
    /// An already wrapped instance.
    Instance(M),
    /// Already wrapped instances.
    Instances(Vec<M>),
    /// Anything without a document shape (counts, distinct values, ...).
    Scalar(Bson),
}

/// The normalized form of a [`RawResult`].
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized<M> {
    One(M),
    Many(Vec<M>),
    /// A find-and-modify miss.
    Absent,
    /// A value passed through unchanged.
    Raw(Bson),
}

impl<M> Normalized<M> {
    pub fn into_one(self) -> Option<M> {
        match self {
            Normalized::One(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn into_many(self) -> Option<Vec<M>> {
        match self {
            Normalized::Many(instances) => Some(instances),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Normalized::Absent)
    }
}

impl<M> From<Normalized<M>> for RawResult<M> {
    fn from(value: Normalized<M>) -> Self {
        match value {
            Normalized::One(instance) => RawResult::Instance(instance),
            Normalized::Many(instances) => RawResult::Instances(instances),
            Normalized::Absent => RawResult::Modified(None),
            Normalized::Raw(value) => RawResult::Scalar(value),
        }
    }
}

/// Normalizes a tagged raw result.
///
/// # Errors
///
/// Returns [`ModelError::Validation`](crate::error::ModelError::Validation) when a
/// document is rejected by the model schema.
pub fn normalize<M: Model>(raw: RawResult<M>) -> ModelResult<Normalized<M>> {
    Ok(match raw {
        RawResult::Documents(documents) | RawResult::Inserted(documents) => Normalized::Many(many(documents)?),
        RawResult::Modified(Some(document)) => Normalized::One(one(document)?),
        RawResult::Modified(None) => Normalized::Absent,
        RawResult::Document(document) if document.contains_key(ID_FIELD) => Normalized::One(one(document)?),
        RawResult::Document(document) => Normalized::Raw(Bson::Document(document)),
        RawResult::Instance(instance) => Normalized::One(instance),
        RawResult::Instances(instances) => Normalized::Many(instances),
        RawResult::Scalar(value) => Normalized::Raw(value),
    })
}

/// Wraps a single document.
pub fn one<M: Model>(document: Document) -> ModelResult<M> {
    M::from_document(document)
}

/// Wraps every document, preserving order. Fails on the first rejected document.
pub fn many<M: Model>(documents: Vec<Document>) -> ModelResult<Vec<M>> {
    documents
        .into_iter()
        .map(M::from_document)
        .collect()
}

/// Wraps a document if there is one.
pub fn optional<M: Model>(document: Option<Document>) -> ModelResult<Option<M>> {
    document.map(M::from_document).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ModelError, model::tests::Dummy};
    use bson::{doc, oid::ObjectId};

    fn stored(name: &str) -> Document {
        doc! { "_id": ObjectId::new(), "name": name }
    }

    #[test]
    fn test_documents_become_instances_in_order() {
        let result = normalize::<Dummy>(RawResult::Documents(vec![stored("Ren"), stored("Stimpy")]))
            .unwrap()
            .into_many()
            .unwrap();

        let names = result.iter().map(|d| d.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Ren", "Stimpy"]);
    }

    #[test]
    fn test_inserted_ops_become_instances() {
        let result = normalize::<Dummy>(RawResult::Inserted(vec![stored("Yak")])).unwrap();

        assert_eq!(result.into_many().map(|v| v.len()), Some(1));
    }

    #[test]
    fn test_modified_value_and_miss() {
        let hit = normalize::<Dummy>(RawResult::Modified(Some(stored("Ren")))).unwrap();
        let miss = normalize::<Dummy>(RawResult::Modified(None)).unwrap();

        assert_eq!(hit.into_one().map(|d| d.name), Some("Ren".to_string()));
        assert!(miss.is_absent());
    }

    #[test]
    fn test_document_without_identity_passes_through() {
        let raw = doc! { "total": 3 };
        let result = normalize::<Dummy>(RawResult::Document(raw.clone())).unwrap();

        assert_eq!(result, Normalized::Raw(Bson::Document(raw)));
    }

    #[test]
    fn test_scalar_passes_through() {
        let result = normalize::<Dummy>(RawResult::Scalar(Bson::Int64(3))).unwrap();

        assert_eq!(result, Normalized::Raw(Bson::Int64(3)));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let inputs = vec![
            RawResult::Document(stored("Ren")),
            RawResult::Documents(vec![stored("Ren"), stored("Stimpy")]),
            RawResult::Modified(None),
            RawResult::Scalar(Bson::Int32(1)),
        ];

        for raw in inputs {
            let once = normalize::<Dummy>(raw).unwrap();
            let twice = normalize::<Dummy>(RawResult::from(once.clone())).unwrap();

            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_rewrapping_serialized_instance_is_equivalent() {
        let instance = one::<Dummy>(stored("Ren")).unwrap();
        let again = one::<Dummy>(instance.to_document().unwrap()).unwrap();

        assert_eq!(instance, again);
    }

    #[test]
    fn test_schema_rejection_surfaces() {
        let result = normalize::<Dummy>(RawResult::Documents(vec![
            stored("Ren"),
            doc! { "_id": ObjectId::new(), "hasHat": true },
        ]));

        assert!(matches!(result, Err(ModelError::Validation(_))));
    }

    #[test]
    fn test_optional() {
        assert_eq!(optional::<Dummy>(None).unwrap(), None);
        assert!(optional::<Dummy>(Some(stored("Ren"))).unwrap().is_some());
    }
}
