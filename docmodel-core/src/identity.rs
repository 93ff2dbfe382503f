//! Conversion of caller-supplied identifiers into the store identity type.

use bson::oid::ObjectId;

use crate::error::{ModelError, ModelResult};

/// Values that can be cast into an [`ObjectId`].
///
/// Hex strings are parsed; a malformed string fails with [`ModelError::IdentityCast`].
pub trait IntoObjectId {
    fn into_object_id(self) -> ModelResult<ObjectId>;
}

impl IntoObjectId for ObjectId {
    fn into_object_id(self) -> ModelResult<ObjectId> {
        Ok(self)
    }
}

impl IntoObjectId for &ObjectId {
    fn into_object_id(self) -> ModelResult<ObjectId> {
        Ok(*self)
    }
}

impl IntoObjectId for &str {
    fn into_object_id(self) -> ModelResult<ObjectId> {
        ObjectId::parse_str(self)
            .map_err(|e| ModelError::IdentityCast(format!("'{self}' is not a valid ObjectId: {e}")))
    }
}

impl IntoObjectId for String {
    fn into_object_id(self) -> ModelResult<ObjectId> {
        self.as_str().into_object_id()
    }
}

impl IntoObjectId for &String {
    fn into_object_id(self) -> ModelResult<ObjectId> {
        self.as_str().into_object_id()
    }
}
