// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use std::marker::PhantomData;

use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// Validator attached to a method's request or response.
pub trait Schema: Send + Sync {
    /// Validate `value` and return its normalized form.
    fn parse(&self, value: Value) -> Result<Value, String>;

    /// JSON schema reported by discovery.
    fn describe(&self) -> Value;

    /// A void schema discards the value instead of parsing it.
    fn is_void(&self) -> bool {
        false
    }
}

/// No payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoidSchema;

impl Schema for VoidSchema {
    fn parse(&self, _value: Value) -> Result<Value, String> {
        Ok(Value::Null)
    }

    fn describe(&self) -> Value {
        json!({ "type": "null" })
    }

    fn is_void(&self) -> bool {
        true
    }
}

/// Accepts anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnySchema;

impl Schema for AnySchema {
    fn parse(&self, value: Value) -> Result<Value, String> {
        Ok(value)
    }

    fn describe(&self) -> Value {
        json!({})
    }
}

/// Schema backed by a Rust type: values must deserialize into `T`, and are
/// normalized by serializing `T` back.
pub struct TypedSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T> {
    pub fn new() -> Self {
        TypedSchema {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedSchema<T> {
    fn default() -> Self {
        TypedSchema::new()
    }
}

impl<T> Schema for TypedSchema<T>
where
    T: JsonSchema + Serialize + DeserializeOwned,
{
    fn parse(&self, value: Value) -> Result<Value, String> {
        let parsed: T = serde_json::from_value(value).map_err(|e| e.to_string())?;
        serde_json::to_value(parsed).map_err(|e| e.to_string())
    }

    fn describe(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default()
    }
}
