//! JSON and hex helpers.
//!
//! Genomes travel as their symbol strings inside JSON; the hex form wraps
//! that JSON so it can be pasted on a command line.

use crate::error::{IoError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Serializes data to JSON.
pub fn to_json<T>(data: &T) -> Result<String>
where
    T: Serialize,
{
    serde_json::to_string(data)
        .map_err(|e| IoError::serialization(format!("JSON serialization failed: {}", e)))
}

/// Serializes data to pretty-printed JSON.
pub fn to_json_pretty<T>(data: &T) -> Result<String>
where
    T: Serialize,
{
    serde_json::to_string_pretty(data)
        .map_err(|e| IoError::serialization(format!("JSON serialization failed: {}", e)))
}

/// Deserializes data from a JSON string. Empty input is rejected before
/// parsing.
pub fn from_json<T>(json: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    if json.trim().is_empty() {
        return Err(IoError::validation("Empty JSON string"));
    }

    serde_json::from_str(json)
        .map_err(|e| IoError::serialization(format!("JSON deserialization failed: {}", e)))
}

/// Hex-encoded JSON.
pub fn to_hex<T>(data: &T) -> Result<String>
where
    T: Serialize,
{
    let json = to_json(data)?;
    Ok(hex::encode(json.as_bytes()))
}

pub fn from_hex<T>(hex_str: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    if hex_str.trim().is_empty() {
        return Err(IoError::validation("Empty hex string"));
    }
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| IoError::validation(format!("Invalid hex encoding: {}", e)))?;
    let json = String::from_utf8(bytes)
        .map_err(|e| IoError::validation(format!("Invalid UTF-8 in hex: {}", e)))?;
    from_json(&json)
}

pub fn write_json_file<T, P>(data: &T, path: P) -> Result<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let json = to_json_pretty(data)?;
    std::fs::write(&path, json).map_err(|e| {
        IoError::FileSystem(e).with_context(format!("writing JSON to {:?}", path.as_ref()))
    })?;
    Ok(())
}

pub fn read_json_file<T, P>(path: P) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let json = std::fs::read_to_string(&path).map_err(|e| {
        IoError::FileSystem(e).with_context(format!("reading JSON from {:?}", path.as_ref()))
    })?;
    from_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use replicon_data::Sequence;

    #[test]
    fn test_sequence_json_is_symbol_string() {
        let genome = Sequence::from_symbols("wcczvfcaxgab").unwrap();
        assert_eq!(to_json(&genome).unwrap(), "\"wcczvfcaxgab\"");
        let restored: Sequence = from_json("\"wcczvfcaxgab\"").unwrap();
        assert_eq!(restored, genome);
    }

    #[test]
    fn test_hex_wraps_json() {
        let genome = Sequence::from_symbols("abc").unwrap();
        let hex = to_hex(&genome).unwrap();
        assert_eq!(hex, hex::encode("\"abc\""));
        let restored: Sequence = from_hex(&hex).unwrap();
        assert_eq!(restored, genome);
    }

    #[test]
    fn test_empty_inputs_fail() {
        assert!(matches!(
            from_json::<Sequence>("  "),
            Err(IoError::Validation(_))
        ));
        assert!(from_hex::<Sequence>("").is_err());
        assert!(from_hex::<Sequence>("zz").is_err());
    }

    #[test]
    fn test_invalid_symbol_fails() {
        assert!(from_json::<Sequence>("\"ab!\"").is_err());
    }

    #[test]
    fn test_json_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genome.json");
        let genome = Sequence::from_symbols("wzv").unwrap();
        write_json_file(&genome, &path).unwrap();
        let restored: Sequence = read_json_file(&path).unwrap();
        assert_eq!(restored, genome);
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = read_json_file::<Sequence, _>("/nonexistent/genome.json").unwrap_err();
        assert!(matches!(err, IoError::Context { .. }));
    }
}
