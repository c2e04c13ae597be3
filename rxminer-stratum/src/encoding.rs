//! Hex <-> binary conversion for blob, target and seed fields.
//!
//! Odd-length input is truncated: the trailing nibble is dropped, as pools
//! have historically been decoded. Any non-hex pair is an error.

use crate::error::{Result, StratumError};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use tracing::trace;

/// Decode hex text into bytes
pub fn decode(hex: &str) -> Result<Vec<u8>> {
    let even = hex.len() & !1;
    if even != hex.len() {
        trace!(len = hex.len(), "Dropping trailing nibble of odd-length hex");
    }

    ::hex::decode(&hex.as_bytes()[..even])
        .map_err(|e| StratumError::InvalidEncoding(format!("{}: {:?}", e, hex)))
}

/// Encode bytes as lowercase, two digits per byte
pub fn encode(bytes: &[u8]) -> String {
    ::hex::encode(bytes)
}

/// Read the first four bytes as a little-endian u32
pub fn to_u32(bytes: &[u8]) -> Result<u32> {
    let head: [u8; 4] = bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or(StratumError::BufferTooShort {
            needed: 4,
            actual: bytes.len(),
        })?;

    Ok(u32::from_le_bytes(head))
}

/// A value kept in both binary and hex text form
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HexString {
    bytes: Vec<u8>,
    text: String,
}

impl HexString {
    /// Parse hex text. The stored text is the canonical lowercase form.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let bytes = decode(hex)?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let text = encode(&bytes);
        Self { bytes, text }
    }

    /// Little-endian byte layout of `value`
    pub fn from_u32(value: u32) -> Self {
        Self::from_bytes(value.to_le_bytes().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn to_u32(&self) -> Result<u32> {
        to_u32(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Display for HexString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<Vec<u8>> for HexString {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl Serialize for HexString {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for HexString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        HexString::from_hex(&text).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_known_bytes() {
        assert_eq!(decode("deadbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(decode("DEADBEEF").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(decode("").unwrap().is_empty());
    }

    #[test]
    fn test_decode_odd_length_truncates() {
        assert_eq!(decode("abc").unwrap(), vec![0xab]);
        assert!(decode("f").unwrap().is_empty());
    }

    #[test]
    fn test_decode_rejects_invalid_pair() {
        let err = decode("zz00").unwrap_err();
        assert!(matches!(err, StratumError::InvalidEncoding(_)));
    }

    #[test]
    fn test_encode_is_lowercase_and_padded() {
        assert_eq!(encode(&[0x00, 0x0a, 0xff]), "000aff");
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn test_hex_text_survives_decode_encode() {
        for s in ["", "00", "0123456789abcdef", "cafebabe", "ffffffff00"] {
            assert_eq!(encode(&decode(s).unwrap()), s);
        }
    }

    #[test]
    fn test_bytes_survive_encode_decode() {
        let all: Vec<u8> = (0..=255).collect();
        assert_eq!(decode(&encode(&all)).unwrap(), all);
    }

    #[test]
    fn test_to_u32_little_endian() {
        assert_eq!(to_u32(&[0x01, 0x00, 0x00, 0x00]).unwrap(), 1);
        assert_eq!(to_u32(&[0xef, 0xbe, 0xad, 0xde, 0x99]).unwrap(), 0xdeadbeef);
    }

    #[test]
    fn test_to_u32_short_buffer() {
        match to_u32(&[1, 2, 3]) {
            Err(StratumError::BufferTooShort { needed, actual }) => {
                assert_eq!(needed, 4);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_hex_string_canonicalizes_text() {
        let value = HexString::from_hex("CAFEBABE").unwrap();
        assert_eq!(value.as_str(), "cafebabe");
        assert_eq!(value.as_bytes(), &[0xca, 0xfe, 0xba, 0xbe]);
        assert_eq!(value.len(), 4);
    }

    #[test]
    fn test_hex_string_from_u32() {
        let value = HexString::from_u32(0x12345678);
        assert_eq!(value.as_str(), "78563412");
        assert_eq!(value.to_u32().unwrap(), 0x12345678);
    }

    #[test]
    fn test_hex_string_serde() {
        let value: HexString = serde_json::from_str("\"00ff\"").unwrap();
        assert_eq!(value.as_bytes(), &[0x00, 0xff]);
        assert_eq!(serde_json::to_string(&value).unwrap(), "\"00ff\"");
        assert!(serde_json::from_str::<HexString>("\"xyz0\"").is_err());
    }
}
