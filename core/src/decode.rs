//! Response decoding.
//!
//! Pure transforms applied to the payload of a successful call: parse the
//! bytes as JSON, pick the value under an optional top-level key, then turn
//! it into one model or a list of models. Each destination of a call is a
//! `Decode` implementation that chains the steps it needs.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{DecodeError, RestError};

/// A type that can be built from a JSON value.
pub trait JsonDecodable: Sized {
    fn decode(value: Value) -> Result<Self, DecodeError>;
}

impl<T: DeserializeOwned> JsonDecodable for T {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        serde_json::from_value(value).map_err(DecodeError::from)
    }
}

pub fn parse_json(bytes: &[u8]) -> Result<Value, RestError> {
    serde_json::from_slice(bytes).map_err(RestError::ParseFailure)
}

/// The value under `keypath` when `json` is an object holding it, else the
/// whole document.
pub fn select_keypath(json: Value, keypath: Option<&str>) -> Value {
    let key = match keypath {
        Some(key) if !key.is_empty() => key,
        _ => return json,
    };
    match json {
        Value::Object(mut map) => match map.remove(key) {
            Some(selected) => selected,
            None => {
                tracing::debug!(keypath = key, "keypath not present, using whole document");
                Value::Object(map)
            }
        },
        other => other,
    }
}

pub fn to_model<T: JsonDecodable>(json: Value) -> Result<T, RestError> {
    T::decode(json).map_err(RestError::DecodeFailure)
}

/// Decode each element of a JSON array. Elements that fail are dropped; a
/// value that is not an array yields an empty list.
pub fn to_models<T: JsonDecodable>(json: Value) -> Vec<T> {
    let Value::Array(items) = json else {
        tracing::debug!("expected a JSON array, decoding to an empty list");
        return Vec::new();
    };
    let total = items.len();
    let models: Vec<T> = items
        .into_iter()
        .filter_map(|item| match T::decode(item) {
            Ok(model) => Some(model),
            Err(err) => {
                tracing::debug!(error = %err, "dropping element that did not decode");
                None
            }
        })
        .collect();
    if models.len() < total {
        tracing::debug!(kept = models.len(), total, "some list elements were dropped");
    }
    models
}

/// Turns a successful payload into the value a call was asked for.
pub trait Decode<P>: Send + 'static {
    type Output: Send + 'static;

    fn decode(&self, payload: P) -> Result<Self::Output, RestError>;
}

/// Payload unchanged: response bytes, or a downloaded file's path.
#[derive(Debug, Clone, Copy, Default)]
pub struct Raw;

impl<P: Send + 'static> Decode<P> for Raw {
    type Output = P;

    fn decode(&self, payload: P) -> Result<P, RestError> {
        Ok(payload)
    }
}

/// Any JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

impl Decode<Vec<u8>> for Json {
    type Output = Value;

    fn decode(&self, payload: Vec<u8>) -> Result<Value, RestError> {
        parse_json(&payload)
    }
}

/// One model, optionally read from under a top-level key.
pub struct Model<T> {
    keypath: Option<String>,
    _model: PhantomData<fn() -> T>,
}

impl<T> Model<T> {
    pub fn new(keypath: Option<String>) -> Self {
        Self {
            keypath,
            _model: PhantomData,
        }
    }
}

impl<T: JsonDecodable + Send + 'static> Decode<Vec<u8>> for Model<T> {
    type Output = T;

    fn decode(&self, payload: Vec<u8>) -> Result<T, RestError> {
        let json = parse_json(&payload)?;
        to_model(select_keypath(json, self.keypath.as_deref()))
    }
}

/// A list of models; see `to_models` for the leniency rules.
pub struct Models<T> {
    keypath: Option<String>,
    _model: PhantomData<fn() -> T>,
}

impl<T> Models<T> {
    pub fn new(keypath: Option<String>) -> Self {
        Self {
            keypath,
            _model: PhantomData,
        }
    }
}

impl<T: JsonDecodable + Send + 'static> Decode<Vec<u8>> for Models<T> {
    type Output = Vec<T>;

    fn decode(&self, payload: Vec<u8>) -> Result<Vec<T>, RestError> {
        let json = parse_json(&payload)?;
        Ok(to_models(select_keypath(json, self.keypath.as_deref())))
    }
}

/// Success only. The body is never parsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Void;

impl<P: Send + 'static> Decode<P> for Void {
    type Output = ();

    fn decode(&self, _payload: P) -> Result<(), RestError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: i64,
    }

    #[test]
    fn keypath_selects_nested_value() {
        let doc = json!({"items": [1, 2], "total": 2});
        assert_eq!(select_keypath(doc, Some("items")), json!([1, 2]));
    }

    #[test]
    fn empty_or_missing_keypath_uses_whole_document() {
        let doc = json!({"a": 1});
        assert_eq!(select_keypath(doc.clone(), None), doc);
        assert_eq!(select_keypath(doc.clone(), Some("")), doc);
        assert_eq!(select_keypath(doc.clone(), Some("b")), doc);
        assert_eq!(select_keypath(json!([1]), Some("a")), json!([1]));
    }

    #[test]
    fn models_drop_elements_that_fail_to_decode() {
        let body = br#"{"items":[{"id":1},{"id":2},{"bad":true}]}"#.to_vec();
        let items = Models::<Item>::new(Some("items".into())).decode(body).unwrap();
        assert_eq!(items, vec![Item { id: 1 }, Item { id: 2 }]);
    }

    #[test]
    fn models_of_non_array_is_empty() {
        let items: Vec<Item> = to_models(json!({"id": 1}));
        assert!(items.is_empty());
    }

    #[test]
    fn model_decode_failure_is_classified() {
        let err = Model::<Item>::new(None).decode(br#"{"id":"one"}"#.to_vec()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeFailure);
    }

    #[test]
    fn model_reads_under_keypath() {
        let item = Model::<Item>::new(Some("data".into()))
            .decode(br#"{"data":{"id":7}}"#.to_vec())
            .unwrap();
        assert_eq!(item, Item { id: 7 });
    }

    #[test]
    fn invalid_json_is_a_parse_failure() {
        let err = Json.decode(b"not json".to_vec()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailure);
        let err = Models::<Item>::new(None).decode(b"<html>".to_vec()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailure);
    }

    #[test]
    fn void_and_raw_never_parse() {
        assert!(Decode::<Vec<u8>>::decode(&Void, b"not json".to_vec()).is_ok());
        assert_eq!(Raw.decode(b"not json".to_vec()).unwrap(), b"not json");
    }
}
