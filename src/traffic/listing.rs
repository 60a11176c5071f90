//! List response parsing
//!
//! The target API answers list requests either with a plain JSON array or a
//! paginated envelope `{data, has_more, next_page_state}`. Both shapes are
//! resolved into [`Listing`] once, here.

use crate::traffic::ids::EntityId;
use serde::Deserialize;

/// A list response in either shape
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Paged {
        data: Vec<T>,
        #[serde(default)]
        has_more: bool,
        #[serde(default)]
        next_page_state: Option<serde_json::Value>,
    },
    Plain(Vec<T>),
}

impl<T> Listing<T> {
    pub fn items(&self) -> &[T] {
        match self {
            Listing::Paged { data, .. } => data,
            Listing::Plain(items) => items,
        }
    }

    pub fn into_items(self) -> Vec<T> {
        match self {
            Listing::Paged { data, .. } => data,
            Listing::Plain(items) => items,
        }
    }

    /// Token for the next page, if the server says there is one
    ///
    /// String and numeric tokens are accepted; anything else ends the walk.
    pub fn next_page_token(&self) -> Option<String> {
        match self {
            Listing::Paged {
                has_more: true,
                next_page_state: Some(state),
                ..
            } => match state {
                serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Any entity carrying an `id`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Identified {
    pub id: EntityId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_array() {
        let listing: Listing<Identified> =
            serde_json::from_str(r#"[{"id": 1, "name": "a"}, {"id": 2}]"#).unwrap();
        assert!(matches!(listing, Listing::Plain(_)));
        assert_eq!(listing.items().len(), 2);
        assert_eq!(listing.next_page_token(), None);
    }

    #[test]
    fn test_paged_envelope_without_more() {
        let listing: Listing<Identified> =
            serde_json::from_str(r#"{"data": [{"id": 1}, {"id": 2}], "has_more": false}"#)
                .unwrap();
        assert_eq!(
            listing.into_items(),
            vec![
                Identified { id: EntityId::Int(1) },
                Identified { id: EntityId::Int(2) }
            ]
        );
    }

    #[test]
    fn test_paged_envelope_with_token() {
        let listing: Listing<Identified> = serde_json::from_str(
            r#"{"data": [{"id": "b-1"}], "has_more": true, "next_page_state": "abc"}"#,
        )
        .unwrap();
        assert_eq!(listing.next_page_token(), Some("abc".to_string()));
    }

    #[test]
    fn test_numeric_token_and_missing_token() {
        let numeric: Listing<Identified> = serde_json::from_str(
            r#"{"data": [], "has_more": true, "next_page_state": 2}"#,
        )
        .unwrap();
        assert_eq!(numeric.next_page_token(), Some("2".to_string()));

        let missing: Listing<Identified> =
            serde_json::from_str(r#"{"data": [], "has_more": true}"#).unwrap();
        assert_eq!(missing.next_page_token(), None);
    }

    #[test]
    fn test_unrecognized_shape_is_an_error() {
        let result: Result<Listing<Identified>, _> = serde_json::from_str(r#"{"items": []}"#);
        assert!(result.is_err());
    }
}
