//! Validator capability boundary.
//!
//! A [`Schema`] receives a candidate document and returns either the validated value
//! (possibly with defaults filled in or values coerced) or a [`ValidationError`].
//! Validation rules themselves live outside this crate: any closure or function with
//! the right signature is a schema.
//!
//! ```ignore
//! fn validate_user(candidate: Document) -> Result<Document, ValidationError> {
//!     match candidate.get("name") {
//!         Some(Bson::String(_)) => Ok(candidate),
//!         _ => Err(ValidationError::new("\"name\" is required")),
//!     }
//! }
//! ```

use bson::Document;

use crate::error::ValidationError;

/// Validates candidate documents for a model type. Must be pure.
pub trait Schema: Send + Sync {
    fn validate(&self, candidate: Document) -> Result<Document, ValidationError>;
}

impl<F> Schema for F
where
    F: Fn(Document) -> Result<Document, ValidationError> + Send + Sync,
{
    fn validate(&self, candidate: Document) -> Result<Document, ValidationError> {
        self(candidate)
    }
}

/// A schema that accepts every document unchanged.
///
/// Useful when the model's serde representation is the only contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct Permissive;

impl Schema for Permissive {
    fn validate(&self, candidate: Document) -> Result<Document, ValidationError> {
        Ok(candidate)
    }
}
