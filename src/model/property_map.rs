//! PropertyMap: the key-value store on nodes and relationships.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Value;
use crate::{Error, Result};

/// A map of property names to values.
pub type PropertyMap = HashMap<String, Value>;

/// Typed reads of engine-owned properties.
///
/// A missing or mistyped key means the store holds a record the engine did
/// not write, which is reported as [`Error::TypeError`].
pub trait PropertyMapExt {
    fn require(&self, key: &str) -> Result<&Value>;
    fn require_str(&self, key: &str) -> Result<&str>;
    fn require_int(&self, key: &str) -> Result<i64>;
    fn require_uuid(&self, key: &str) -> Result<Uuid>;
    fn require_datetime(&self, key: &str) -> Result<DateTime<Utc>>;
    fn optional_str(&self, key: &str) -> Result<Option<&str>>;
    fn optional_uuid(&self, key: &str) -> Result<Option<Uuid>>;
    fn optional_datetime(&self, key: &str) -> Result<Option<DateTime<Utc>>>;
}

fn mismatch(key: &str, expected: &str, got: &Value) -> Error {
    Error::TypeError {
        expected: format!("{expected} at '{key}'"),
        got: got.type_name().into(),
    }
}

fn parse_uuid(key: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| Error::TypeError {
        expected: format!("UUID at '{key}'"),
        got: format!("\"{raw}\""),
    })
}

impl PropertyMapExt for PropertyMap {
    fn require(&self, key: &str) -> Result<&Value> {
        self.get(key).ok_or_else(|| Error::TypeError {
            expected: format!("property '{key}'"),
            got: "nothing".into(),
        })
    }

    fn require_str(&self, key: &str) -> Result<&str> {
        let val = self.require(key)?;
        val.as_str().ok_or_else(|| mismatch(key, "STRING", val))
    }

    fn require_int(&self, key: &str) -> Result<i64> {
        let val = self.require(key)?;
        val.as_int().ok_or_else(|| mismatch(key, "INTEGER", val))
    }

    fn require_uuid(&self, key: &str) -> Result<Uuid> {
        parse_uuid(key, self.require_str(key)?)
    }

    fn require_datetime(&self, key: &str) -> Result<DateTime<Utc>> {
        let val = self.require(key)?;
        val.as_datetime().ok_or_else(|| mismatch(key, "DATETIME", val))
    }

    fn optional_str(&self, key: &str) -> Result<Option<&str>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(mismatch(key, "STRING", other)),
        }
    }

    fn optional_uuid(&self, key: &str) -> Result<Option<Uuid>> {
        self.optional_str(key)?.map(|raw| parse_uuid(key, raw)).transpose()
    }

    fn optional_datetime(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::DateTime(dt)) => Ok(Some(*dt)),
            Some(other) => Err(mismatch(key, "DATETIME", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_type_error() {
        let props = PropertyMap::new();
        assert!(matches!(props.require_str("prov:id"), Err(Error::TypeError { .. })));
    }

    #[test]
    fn test_optional_null_is_none() {
        let mut props = PropertyMap::new();
        props.insert("until".into(), Value::Null);
        assert_eq!(props.optional_datetime("until").unwrap(), None);
        assert_eq!(props.optional_uuid("absent").unwrap(), None);
    }

    #[test]
    fn test_bad_uuid_rejected() {
        let mut props = PropertyMap::new();
        props.insert("prov:uuid".into(), Value::from("not-a-uuid"));
        assert!(props.require_uuid("prov:uuid").is_err());
    }
}
