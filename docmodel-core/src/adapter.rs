//! Shorthand adapters for projections and sort orders.
//!
//! Both adapters accept either a ready-made mapping, which passes through untouched, or a
//! whitespace-delimited string such as `"name -email"`. A leading `-` on a token flips it
//! to "exclude" for projections and "descending" for sorts.

use bson::{Bson, Document};

/// Input accepted by [`fields_adapter`] and [`sort_adapter`].
#[derive(Debug, Clone, PartialEq)]
pub enum Shorthand {
    /// A whitespace-delimited list of tokens.
    Text(String),
    /// An already built mapping.
    Mapping(Document),
}

impl From<&str> for Shorthand {
    fn from(value: &str) -> Self {
        Shorthand::Text(value.to_string())
    }
}

impl From<String> for Shorthand {
    fn from(value: String) -> Self {
        Shorthand::Text(value)
    }
}

impl From<&String> for Shorthand {
    fn from(value: &String) -> Self {
        Shorthand::Text(value.clone())
    }
}

impl From<Document> for Shorthand {
    fn from(value: Document) -> Self {
        Shorthand::Mapping(value)
    }
}

/// Converts a projection shorthand into a projection document.
///
/// ```ignore
/// let fields = fields_adapter("name -email");
/// assert_eq!(fields, doc! { "name": true, "email": false });
/// ```
pub fn fields_adapter(input: impl Into<Shorthand>) -> Document {
    adapt(input.into(), |excluded| Bson::Boolean(!excluded))
}

/// Converts a sort shorthand into a sort document of `1` / `-1` values.
///
/// ```ignore
/// let sort = sort_adapter("-age name");
/// assert_eq!(sort, doc! { "age": -1, "name": 1 });
/// ```
pub fn sort_adapter(input: impl Into<Shorthand>) -> Document {
    adapt(input.into(), |descending| Bson::Int32(if descending { -1 } else { 1 }))
}

fn adapt(input: Shorthand, value_for: impl Fn(bool) -> Bson) -> Document {
    match input {
        Shorthand::Mapping(document) => document,
        Shorthand::Text(text) => {
            let mut document = Document::new();

            for token in text.split_whitespace() {
                let (field, negated) = match token.strip_prefix('-') {
                    Some(rest) => (rest, true),
                    None => (token, false),
                };

                // Re-inserting an existing key keeps its original position.
                document.insert(field, value_for(negated));
            }

            document
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_fields_adapter_tokens() {
        let fields = fields_adapter("one -two three");

        assert_eq!(fields, doc! { "one": true, "two": false, "three": true });
    }

    #[test]
    fn test_fields_adapter_empty_string() {
        assert!(fields_adapter("").is_empty());
        assert!(fields_adapter("   \t ").is_empty());
    }

    #[test]
    fn test_sort_adapter_tokens() {
        let sort = sort_adapter("one -two three");

        assert_eq!(sort, doc! { "one": 1, "two": -1, "three": 1 });
    }

    #[test]
    fn test_sort_adapter_empty_string() {
        assert!(sort_adapter("").is_empty());
    }

    #[test]
    fn test_mapping_passes_through() {
        let mapping = doc! { "name": -1, "age": 1 };

        assert_eq!(sort_adapter(mapping.clone()), mapping);
        assert_eq!(fields_adapter(mapping.clone()), mapping);
    }

    #[test]
    fn test_duplicate_tokens_overwrite_in_place() {
        let sort = sort_adapter("a b -a");
        let keys = sort.keys().cloned().collect::<Vec<_>>();

        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(sort.get_i32("a").ok(), Some(-1));
    }

    #[test]
    fn test_irregular_whitespace() {
        let fields = fields_adapter("  name\n\t-email  ");

        assert_eq!(fields, doc! { "name": true, "email": false });
    }
}
