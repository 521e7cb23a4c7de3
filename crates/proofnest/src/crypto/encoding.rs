//! Base64 helpers for byte fields in serialized records.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Encode bytes as standard base64.
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64.
pub fn from_base64(s: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(s)
}

/// `#[serde(with = "...")]` adapter for `Vec<u8>` fields.
pub mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_base64(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

/// `#[serde(with = "...")]` adapter for `Option<Vec<u8>>` fields.
pub mod base64_bytes_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => serializer.serialize_some(&super::to_base64(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| super::from_base64(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Wrapper {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        #[serde(with = "base64_bytes_opt")]
        extra: Option<Vec<u8>>,
    }

    #[test]
    fn test_wrapper_json_shape() {
        let w = Wrapper {
            data: vec![1, 2, 3],
            extra: None,
        };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"data":"AQID","extra":null}"#);
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let r: Result<Wrapper, _> = serde_json::from_str(r#"{"data":"!!!","extra":null}"#);
        assert!(r.is_err());
    }
}
