// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! JSON payload codec. The empty string travels as an empty payload.

use bytes::Bytes;
use serde_json::Value;

use crate::errors::BrokerError;

pub fn encode(value: &Value) -> Result<Bytes, BrokerError> {
    match value {
        Value::String(s) if s.is_empty() => Ok(Bytes::new()),
        _ => Ok(Bytes::from(serde_json::to_vec(value)?)),
    }
}

pub fn decode(payload: &[u8]) -> Result<Value, BrokerError> {
    if payload.is_empty() {
        return Ok(Value::String(String::new()));
    }
    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_payload() {
        assert!(encode(&json!("")).unwrap().is_empty());
        assert_eq!(decode(b"").unwrap(), json!(""));
    }

    #[test]
    fn test_falsy_values_preserved() {
        for value in [json!(null), json!(0), json!(false), json!([])] {
            let bytes = encode(&value).unwrap();
            assert!(!bytes.is_empty());
            assert_eq!(decode(&bytes).unwrap(), value);
        }
    }

    #[test]
    fn test_invalid_payload() {
        assert!(matches!(decode(b"{oops"), Err(BrokerError::Codec(_))));
    }
}
