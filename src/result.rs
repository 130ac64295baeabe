//! The `{value, error}` result shape
//!
//! Inside the crate every operation returns [`crate::Result`]. `ResultObject`
//! is the flattened pair for callers that want to serialize an outcome
//! (the CLI prints it as JSON). Exactly one of the two fields is set; the
//! only constructors are `ok`, `err` and the conversions from `Result`, and
//! deserializing refuses any other shape. A value that serializes to `null`
//! therefore does not read back; acknowledgements use [`OK`] instead.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::Result;

/// Value reported for operations that only acknowledge success.
pub const OK: &str = "ok";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultObject<T> {
    value: Option<T>,
    error: Option<String>,
}

impl<T> ResultObject<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value: Some(value),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            value: None,
            error: Some(error.into()),
        }
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> std::result::Result<T, String> {
        match (self.value, self.error) {
            (_, Some(error)) => Err(error),
            (Some(value), None) => Ok(value),
            (None, None) => Err("empty result".to_string()),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for ResultObject<T> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wire<T> {
            value: Option<T>,
            error: Option<String>,
        }

        let wire = Wire::<T>::deserialize(deserializer)?;
        match (wire.value, wire.error) {
            (Some(value), None) => Ok(Self::ok(value)),
            (None, Some(error)) => Ok(Self::err(error)),
            (None, None) => Err(D::Error::custom("result has neither a value nor an error")),
            (Some(_), Some(_)) => Err(D::Error::custom("result has both a value and an error")),
        }
    }
}

impl ResultObject<String> {
    /// Flatten an acknowledgement into `{value: "ok"}`.
    pub fn acknowledge(result: Result<()>) -> Self {
        result.map(|()| OK.to_string()).into()
    }
}

impl<T> From<Result<T>> for ResultObject<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_exactly_one_field_is_set() {
        let ok: ResultObject<u64> = Ok(42).into();
        assert_eq!(ok.value(), Some(&42));
        assert_eq!(ok.error(), None);

        let err: ResultObject<u64> = Err(Error::BucketNotFound("b1".into())).into();
        assert_eq!(err.value(), None);
        assert_eq!(err.error(), Some("No bucket 'b1' found"));
    }

    #[test]
    fn test_acknowledge_serializes_ok() {
        let ack = ResultObject::acknowledge(Ok(()));
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json, serde_json::json!({"value": "ok", "error": null}));

        let failed = ResultObject::acknowledge(Err(Error::NoBucket));
        assert_eq!(
            failed.into_result(),
            Err("Please provide or select a bucket".to_string())
        );
    }

    #[test]
    fn test_deserialize_requires_exactly_one_field() {
        let ok: ResultObject<u64> =
            serde_json::from_value(serde_json::json!({"value": 7, "error": null})).unwrap();
        assert_eq!(ok, ResultObject::ok(7));

        let err: ResultObject<u64> =
            serde_json::from_value(serde_json::json!({"error": "No bucket 'b1' found"})).unwrap();
        assert_eq!(err.error(), Some("No bucket 'b1' found"));

        for shape in [
            serde_json::json!({"value": null, "error": null}),
            serde_json::json!({}),
            serde_json::json!({"value": 7, "error": "boom"}),
        ] {
            assert!(
                serde_json::from_value::<ResultObject<u64>>(shape.clone()).is_err(),
                "{shape} should be rejected"
            );
        }
    }
}
