//! Text encodings used on the wire and in rendered views
//!
//! Keys, signatures and hashes travel as base64url without padding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

pub use base64::DecodeError;

/// Encode bytes as base64url without padding
pub fn encode_base64url(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode base64url without padding
pub fn decode_base64url(text: &str) -> Result<Vec<u8>, DecodeError> {
    URL_SAFE_NO_PAD.decode(text)
}

/// Serde adapter storing byte fields as base64url strings
pub mod base64url {
    use super::{decode_base64url, encode_base64url};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode_base64url(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        decode_base64url(&text).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional byte fields
pub mod base64url_option {
    use super::{decode_base64url, encode_base64url};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        data: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match data {
            Some(bytes) => serializer.serialize_some(&encode_base64url(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) => decode_base64url(&text)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_padding() {
        assert_eq!(encode_base64url(b"a"), "YQ");
        assert_eq!(encode_base64url(&[0xfb, 0xff]), "-_8");
    }

    #[test]
    fn test_padded_input_rejected() {
        assert_eq!(decode_base64url("YQ").unwrap(), b"a");
        assert!(decode_base64url("YQ==").is_err());
        assert!(decode_base64url("not base64!").is_err());
    }
}
