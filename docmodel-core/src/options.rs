//! Typed options for model operations.
//!
//! Each operation takes one options struct with named fields. Operations merge the
//! caller's options onto their own defaults with [`MergeOptions::merge_onto`]: any field the
//! caller set wins, unset fields fall back to the operation default.
//!
//! Sort and projection fields accept the shorthand understood by
//! [`sort_adapter`](crate::adapter::sort_adapter) and
//! [`fields_adapter`](crate::adapter::fields_adapter):
//!
//! ```ignore
//! use docmodel::options::FindOptions;
//!
//! let options = FindOptions::builder()
//!     .with_sort("-created name")
//!     .with_projection("name email -_id")
//!     .with_limit(20)
//!     .build();
//! ```

use bson::{Bson, Document};
use std::time::Duration;

use crate::adapter::{Shorthand, fields_adapter, sort_adapter};

/// Field-by-field merge of caller options onto operation defaults.
pub trait MergeOptions: Sized {
    /// Returns `self` with every unset field taken from `defaults`.
    fn merge_onto(self, defaults: Self) -> Self;
}

/// Which version of a document a find-and-modify operation returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnDocument {
    /// The document as it was before the modification.
    Before,
    /// The document as it is after the modification.
    After,
}

/// Options for `find`, `find_one`, `find_by_id` and paged finds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<Document>,
    pub projection: Option<Document>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
    /// Server-side time limit, passed through to the driver.
    pub max_time: Option<Duration>,
}

impl FindOptions {
    pub fn builder() -> FindOptionsBuilder {
        FindOptionsBuilder::default()
    }
}

impl MergeOptions for FindOptions {
    fn merge_onto(self, defaults: Self) -> Self {
        Self {
            sort: self.sort.or(defaults.sort),
            projection: self.projection.or(defaults.projection),
            limit: self.limit.or(defaults.limit),
            skip: self.skip.or(defaults.skip),
            max_time: self.max_time.or(defaults.max_time),
        }
    }
}

/// Builder for [`FindOptions`].
#[derive(Debug, Clone, Default)]
pub struct FindOptionsBuilder {
    options: FindOptions,
}

impl FindOptionsBuilder {
    pub fn with_sort(mut self, sort: impl Into<Shorthand>) -> Self {
        self.options.sort = Some(sort_adapter(sort));
        self
    }

    pub fn with_projection(mut self, fields: impl Into<Shorthand>) -> Self {
        self.options.projection = Some(fields_adapter(fields));
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.options.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.options.skip = Some(skip);
        self
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.options.max_time = Some(max_time);
        self
    }

    pub fn build(self) -> FindOptions {
        self.options
    }
}

/// Options for the `find_one_and_*` and `find_by_id_and_*` operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindAndModifyOptions {
    pub sort: Option<Document>,
    pub projection: Option<Document>,
    /// Insert a document when nothing matches (update and replace only).
    pub upsert: Option<bool>,
    /// Ignored by deletes, which always return the removed document.
    pub return_document: Option<ReturnDocument>,
    pub max_time: Option<Duration>,
}

impl FindAndModifyOptions {
    pub fn builder() -> FindAndModifyOptionsBuilder {
        FindAndModifyOptionsBuilder::default()
    }

    /// Options that only set the returned document version.
    pub fn returning(return_document: ReturnDocument) -> Self {
        Self {
            return_document: Some(return_document),
            ..Self::default()
        }
    }
}

impl MergeOptions for FindAndModifyOptions {
    fn merge_onto(self, defaults: Self) -> Self {
        Self {
            sort: self.sort.or(defaults.sort),
            projection: self.projection.or(defaults.projection),
            upsert: self.upsert.or(defaults.upsert),
            return_document: self.return_document.or(defaults.return_document),
            max_time: self.max_time.or(defaults.max_time),
        }
    }
}

/// Builder for [`FindAndModifyOptions`].
#[derive(Debug, Clone, Default)]
pub struct FindAndModifyOptionsBuilder {
    options: FindAndModifyOptions,
}

impl FindAndModifyOptionsBuilder {
    pub fn with_sort(mut self, sort: impl Into<Shorthand>) -> Self {
        self.options.sort = Some(sort_adapter(sort));
        self
    }

    pub fn with_projection(mut self, fields: impl Into<Shorthand>) -> Self {
        self.options.projection = Some(fields_adapter(fields));
        self
    }

    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.options.upsert = Some(upsert);
        self
    }

    pub fn with_return_document(mut self, return_document: ReturnDocument) -> Self {
        self.options.return_document = Some(return_document);
        self
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.options.max_time = Some(max_time);
        self
    }

    pub fn build(self) -> FindAndModifyOptions {
        self.options
    }
}

/// Options for `update_one`, `update_many` and `replace_one`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOptions {
    pub upsert: Option<bool>,
    pub comment: Option<Bson>,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        Self {
            upsert: Some(true),
            ..Self::default()
        }
    }
}

impl MergeOptions for UpdateOptions {
    fn merge_onto(self, defaults: Self) -> Self {
        Self {
            upsert: self.upsert.or(defaults.upsert),
            comment: self.comment.or(defaults.comment),
        }
    }
}

/// Options for `delete_one` and `delete_many`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteOptions {
    pub comment: Option<Bson>,
}

impl MergeOptions for DeleteOptions {
    fn merge_onto(self, defaults: Self) -> Self {
        Self {
            comment: self.comment.or(defaults.comment),
        }
    }
}

/// Options for `count`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountOptions {
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub max_time: Option<Duration>,
}

impl MergeOptions for CountOptions {
    fn merge_onto(self, defaults: Self) -> Self {
        Self {
            limit: self.limit.or(defaults.limit),
            skip: self.skip.or(defaults.skip),
            max_time: self.max_time.or(defaults.max_time),
        }
    }
}

/// Options for `aggregate`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateOptions {
    pub allow_disk_use: Option<bool>,
    pub batch_size: Option<u32>,
    pub max_time: Option<Duration>,
}

impl MergeOptions for AggregateOptions {
    fn merge_onto(self, defaults: Self) -> Self {
        Self {
            allow_disk_use: self.allow_disk_use.or(defaults.allow_disk_use),
            batch_size: self.batch_size.or(defaults.batch_size),
            max_time: self.max_time.or(defaults.max_time),
        }
    }
}

/// An index declaration: ordered keys plus optional name and uniqueness.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub keys: Document,
    pub name: Option<String>,
    pub unique: Option<bool>,
}

impl IndexSpec {
    /// Creates an index over the given keys. Accepts sort shorthand (`"name -created"`).
    pub fn new(keys: impl Into<Shorthand>) -> Self {
        Self {
            keys: sort_adapter(keys),
            name: None,
            unique: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = Some(unique);
        self
    }

    /// The name the store assigns when none is given, e.g. `name_1_created_-1`.
    pub fn default_name(&self) -> String {
        self.keys
            .iter()
            .map(|(field, direction)| match direction {
                Bson::Int32(value) => format!("{field}_{value}"),
                Bson::Int64(value) => format!("{field}_{value}"),
                Bson::String(value) => format!("{field}_{value}"),
                other => format!("{field}_{other}"),
            })
            .collect::<Vec<_>>()
            .join("_")
    }

    /// The explicit name, or [`IndexSpec::default_name`].
    pub fn resolved_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.default_name())
    }
}
