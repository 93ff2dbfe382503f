//! Core traits for model types and their instances.
//!
//! A model type is a serde type that names its collection and its [`Schema`]. Instances
//! are only ever built from validated data: [`ModelExt::from_document`] strips the
//! identity field, runs the schema, re-attaches the identity and deserializes the result.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//! use bson::oid::ObjectId;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Customer {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<ObjectId>,
//!     pub name: String,
//! }
//!
//! impl Model for Customer {
//!     fn collection_name() -> &'static str {
//!         "customers"
//!     }
//!
//!     fn schema() -> &'static dyn Schema {
//!         &Permissive
//!     }
//!
//!     fn id(&self) -> Option<&ObjectId> {
//!         self.id.as_ref()
//!     }
//! }
//!
//! let customers = Customer::on(&registry)?.find(doc! {}, FindOptions::default()).await?;
//! ```

use bson::{Bson, Document, de::deserialize_from_document, oid::ObjectId, ser::serialize_to_document};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, to_value};
use std::{fmt::Debug, sync::Arc};

use crate::{
    error::{ModelError, ModelResult, ValidationError},
    options::IndexSpec,
    proxy::ModelProxy,
    registry::{ConnectionRegistry, ConnectionSource},
    schema::Schema,
};

/// Name of the identity field every stored document carries.
pub const ID_FIELD: &str = "_id";

/// Puts `id`, if any, in front of the fields of `document`.
pub(crate) fn with_identity(id: Option<Bson>, document: Document) -> Document {
    let Some(id) = id else {
        return document;
    };

    let mut with_id = Document::new();
    with_id.insert(ID_FIELD, id);

    for (key, value) in document {
        with_id.insert(key, value);
    }

    with_id
}

/// A model type: a collection name, a schema, and optional index declarations.
///
/// The implementing type is the in-memory shape of one stored document. Its serde
/// representation must map the identity to `_id`, usually as
/// `#[serde(rename = "_id", skip_serializing_if = "Option::is_none")] id: Option<ObjectId>`.
pub trait Model: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    /// The collection documents of this type are stored in.
    fn collection_name() -> &'static str;

    /// The schema candidate documents are validated against.
    fn schema() -> &'static dyn Schema;

    /// Indexes created by [`ModelProxy::ensure_indexes`].
    fn indexes() -> Vec<IndexSpec> {
        Vec::new()
    }

    /// The identity of this instance, if it has been stored.
    fn id(&self) -> Option<&ObjectId>;
}

/// Construction, validation and conversion helpers, implemented for every [`Model`].
pub trait ModelExt: Model {
    /// Validates a candidate against the model schema, identity excluded.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Validation`] when the schema rejects the candidate.
    fn validate_document(candidate: Document) -> ModelResult<Document>;

    /// Builds an instance from raw data. This is the only constructor.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Validation`] when the schema rejects the data or the
    /// validated value does not fit the type.
    fn from_document(document: Document) -> ModelResult<Self>;

    /// Serializes this instance, identity included.
    fn to_document(&self) -> ModelResult<Document>;

    /// Re-validates the current state of this instance.
    fn validate(&self) -> ModelResult<()>;

    fn to_json(&self) -> ModelResult<Value>;

    /// Builds a validated instance from a JSON object.
    fn from_json(value: Value) -> ModelResult<Self>;

    /// The query proxy for this model type on the connection `source` resolves to.
    ///
    /// Passing the registry selects the `"default"` connection; passing a
    /// [`Handle`](crate::registry::Handle) selects that connection explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ConnectionNotFound`] if nothing can be resolved.
    fn on<S>(source: &S) -> ModelResult<ModelProxy<Self>>
    where
        S: ConnectionSource + ?Sized;

    /// The memoized query proxy bound to the connection registered as `name`.
    fn with(registry: &ConnectionRegistry, name: &str) -> ModelResult<Arc<ModelProxy<Self>>>;
}

impl<M: Model> ModelExt for M {
    fn validate_document(candidate: Document) -> ModelResult<Document> {
        Ok(M::schema().validate(candidate)?)
    }

    fn from_document(mut document: Document) -> ModelResult<Self> {
        let id = document.remove(ID_FIELD);
        let candidate = with_identity(id, Self::validate_document(document)?);

        deserialize_from_document::<M>(candidate)
            .map_err(|e| ModelError::Validation(ValidationError::new(e.to_string())))
    }

    fn to_document(&self) -> ModelResult<Document> {
        serialize_to_document(self).map_err(|e| ModelError::Serialization(e.to_string()))
    }

    fn validate(&self) -> ModelResult<()> {
        let mut document = self.to_document()?;
        document.remove(ID_FIELD);

        Self::validate_document(document).map(|_| ())
    }

    fn to_json(&self) -> ModelResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> ModelResult<Self> {
        let document = serialize_to_document(&value)
            .map_err(|e| ModelError::Validation(ValidationError::new(e.to_string())))?;

        Self::from_document(document)
    }

    fn on<S>(source: &S) -> ModelResult<ModelProxy<Self>>
    where
        S: ConnectionSource + ?Sized,
    {
        Ok(ModelProxy::new(source.resolve_handle()?))
    }

    fn with(registry: &ConnectionRegistry, name: &str) -> ModelResult<Arc<ModelProxy<Self>>> {
        registry.with::<M>(name)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bson::doc;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub(crate) struct Dummy {
        #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
        pub id: Option<ObjectId>,
        pub name: String,
        #[serde(rename = "hasHat", skip_serializing_if = "Option::is_none")]
        pub has_hat: Option<bool>,
    }

    fn dummy_schema(candidate: Document) -> Result<Document, ValidationError> {
        for key in candidate.keys() {
            if key != "name" && key != "hasHat" {
                return Err(ValidationError::new(format!("\"{key}\" is not allowed")));
            }
        }

        match candidate.get("name") {
            Some(Bson::String(name)) if !name.is_empty() => Ok(candidate),
            _ => Err(ValidationError::new("\"name\" is required")),
        }
    }

    struct DummySchema;

    impl Schema for DummySchema {
        fn validate(&self, candidate: Document) -> Result<Document, ValidationError> {
            dummy_schema(candidate)
        }
    }

    impl Model for Dummy {
        fn collection_name() -> &'static str {
            "dummies"
        }

        fn schema() -> &'static dyn Schema {
            &DummySchema
        }

        fn id(&self) -> Option<&ObjectId> {
            self.id.as_ref()
        }
    }

    #[test]
    fn test_from_document_keeps_identity() {
        let id = ObjectId::new();
        let dummy = Dummy::from_document(doc! { "_id": id, "name": "Ren" }).unwrap();

        assert_eq!(dummy.id(), Some(&id));
        assert_eq!(dummy.name, "Ren");
        assert_eq!(dummy.has_hat, None);
    }

    #[test]
    fn test_from_document_rejects_invalid_data() {
        let result = Dummy::from_document(doc! { "hasHat": true });

        assert!(matches!(result, Err(ModelError::Validation(_))));
    }

    #[test]
    fn test_from_document_rejects_unknown_fields() {
        let result = Dummy::from_document(doc! { "name": "Ren", "role": "admin" });

        assert!(matches!(result, Err(ModelError::Validation(_))));
    }

    #[test]
    fn test_instance_validate_sees_mutations() {
        let mut dummy = Dummy::from_document(doc! { "name": "Stimpy" }).unwrap();
        assert!(dummy.validate().is_ok());

        dummy.name = String::new();
        assert!(matches!(dummy.validate(), Err(ModelError::Validation(_))));
    }

    #[test]
    fn test_json_round_trip_validates() {
        let dummy = Dummy::from_json(serde_json::json!({ "name": "Yak", "hasHat": false })).unwrap();

        assert_eq!(dummy.has_hat, Some(false));
        assert!(Dummy::from_json(serde_json::json!({ "hasHat": false })).is_err());
        assert!(Dummy::from_json(serde_json::json!(["not", "an", "object"])).is_err());
    }
}
