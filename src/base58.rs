//! Base58 and Base58Check encoding

use crate::error::{ConsensusError, Result};
use crate::hashes::hash256;

/// Encode bytes in base58; each leading zero byte becomes a `'1'`
pub fn encode_base58(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

/// Base58 of `data || hash256(data)[..4]`
pub fn encode_base58_checksum(data: &[u8]) -> String {
    let mut payload = data.to_vec();
    payload.extend_from_slice(&hash256(data)[..4]);
    encode_base58(&payload)
}

/// Decode a base58 string to bytes
pub fn decode_base58(s: &str) -> Result<Vec<u8>> {
    bs58::decode(s)
        .into_vec()
        .map_err(|e| ConsensusError::malformed("base58", e.to_string()))
}

/// Decode a Base58Check string, verify its checksum and return the payload
/// without the checksum
pub fn decode_base58_checksum(s: &str) -> Result<Vec<u8>> {
    let raw = decode_base58(s)?;
    if raw.len() < 4 {
        return Err(ConsensusError::Truncated {
            field: "base58 checksum",
            needed: 4,
            available: raw.len(),
        });
    }
    let (payload, checksum) = raw.split_at(raw.len() - 4);
    if hash256(payload)[..4] != *checksum {
        return Err(ConsensusError::malformed(
            "base58 checksum",
            format!("bad checksum for {}", s),
        ));
    }
    Ok(payload.to_vec())
}
