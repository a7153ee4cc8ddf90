//! Block headers and the `headers` message payload

use crate::codec::{encode_varint, ByteReader};
use crate::constants::BLOCK_HEADER_SIZE;
use crate::error::{ConsensusError, Result};
use crate::hashes::hash256;
use crate::pow;
use crate::types::*;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 80-byte block header
///
/// `prev_block_hash` and `merkle_root` are held in display order; the wire
/// form reverses them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_block_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Parse exactly one serialised header
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let header = Self::parse_from(&mut reader)?;
        reader.finish("block header")?;
        Ok(header)
    }

    pub fn parse_from(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(BlockHeader {
            version: reader.read_u32_le("block version")?,
            prev_block_hash: reader.read_hash_reversed("previous block hash")?,
            merkle_root: reader.read_hash_reversed("merkle root")?,
            timestamp: reader.read_u32_le("block timestamp")?,
            bits: reader.read_u32_le("block bits")?,
            nonce: reader.read_u32_le("block nonce")?,
        })
    }

    pub fn serialize(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut out = [0u8; BLOCK_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        let mut prev = self.prev_block_hash;
        prev.reverse();
        out[4..36].copy_from_slice(&prev);
        let mut merkle = self.merkle_root;
        merkle.reverse();
        out[36..68].copy_from_slice(&merkle);
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    /// hash256 of the serialised header, in wire (little-endian) order
    pub fn hash(&self) -> Hash {
        hash256(&self.serialize())
    }

    /// Block id: the header hash reversed, as hex
    pub fn id(&self) -> String {
        let mut hash = self.hash();
        hash.reverse();
        hex::encode(hash)
    }

    /// BIP9 version-bits signalling: top three bits are 001
    pub fn bip9(&self) -> bool {
        self.version >> 29 == 0b001
    }

    /// BIP91 (segwit lock-in) signals on bit 4
    pub fn bip91(&self) -> bool {
        (self.version >> 4) & 1 == 1
    }

    /// BIP141 (segwit) signals on bit 1
    pub fn bip141(&self) -> bool {
        (self.version >> 1) & 1 == 1
    }

    pub fn target(&self) -> Result<BigUint> {
        pow::bits_to_target(self.bits)
    }

    pub fn difficulty(&self) -> Result<f64> {
        pow::difficulty(self.bits)
    }

    /// Whether the header hash meets its own target
    pub fn check_pow(&self) -> Result<bool> {
        pow::check_proof_of_work(self)
    }
}

impl fmt::Display for BlockHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block {} (version {:#010x}, bits {:#010x}, time {})",
            self.id(),
            self.version,
            self.bits,
            self.timestamp
        )
    }
}

/// Parse the payload of a `headers` message
///
/// Each header is followed by a transaction count, which is always zero in
/// this message.
pub fn parse_headers_payload(payload: &[u8]) -> Result<Vec<BlockHeader>> {
    let mut reader = ByteReader::new(payload);
    let count = reader.read_varint("header count")?;
    let mut headers = Vec::new();
    for _ in 0..count {
        headers.push(BlockHeader::parse_from(&mut reader)?);
        let tx_count = reader.read_varint("header transaction count")?;
        if tx_count != 0 {
            return Err(ConsensusError::malformed(
                "header transaction count",
                format!("expected 0, got {}", tx_count),
            ));
        }
    }
    reader.finish("headers payload")?;
    Ok(headers)
}

/// Serialise headers into a `headers` message payload
pub fn serialize_headers_payload(headers: &[BlockHeader]) -> ByteString {
    let mut out = encode_varint(headers.len() as u64);
    for header in headers {
        out.extend_from_slice(&header.serialize());
        out.push(0x00);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c";

    fn genesis() -> BlockHeader {
        BlockHeader::parse(&hex::decode(GENESIS).unwrap()).unwrap()
    }

    #[test]
    fn test_parse_genesis() {
        let header = genesis();
        assert_eq!(header.version, 1);
        assert_eq!(header.prev_block_hash, [0u8; 32]);
        assert_eq!(
            hex::encode(header.merkle_root),
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
        );
        assert_eq!(header.timestamp, 1231006505);
        assert_eq!(header.bits, 0x1d00ffff);
        assert_eq!(header.nonce, 2083236893);
    }

    #[test]
    fn test_serialize_and_id() {
        let header = genesis();
        assert_eq!(hex::encode(header.serialize()), GENESIS);
        assert_eq!(
            header.id(),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
    }

    #[test]
    fn test_genesis_pow() {
        let header = genesis();
        assert!(header.check_pow().unwrap());
        assert_eq!(header.difficulty().unwrap(), 1.0);

        let mut tampered = header;
        tampered.nonce = tampered.nonce.wrapping_add(1);
        assert!(!tampered.check_pow().unwrap());
    }

    #[test]
    fn test_version_bits() {
        let mut header = genesis();
        assert!(!header.bip9());
        header.version = 0x2000_0002;
        assert!(header.bip9());
        assert!(header.bip141());
        assert!(!header.bip91());
        header.version = 0x2000_0010;
        assert!(header.bip91());
        assert!(!header.bip141());
    }

    #[test]
    fn test_parse_requires_exact_length() {
        let mut bytes = hex::decode(GENESIS).unwrap();
        assert!(matches!(
            BlockHeader::parse(&bytes[..79]),
            Err(ConsensusError::Truncated { .. })
        ));
        bytes.push(0);
        assert!(BlockHeader::parse(&bytes).is_err());
    }

    #[test]
    fn test_headers_payload() {
        let header = genesis();
        let payload = serialize_headers_payload(&[header, header]);
        assert_eq!(payload.len(), 1 + 2 * 81);
        assert_eq!(parse_headers_payload(&payload).unwrap(), vec![header, header]);
    }

    #[test]
    fn test_headers_payload_rejects_transactions() {
        let mut payload = serialize_headers_payload(&[genesis()]);
        let last = payload.len() - 1;
        payload[last] = 0x01;
        assert!(matches!(
            parse_headers_payload(&payload),
            Err(ConsensusError::Malformed { .. })
        ));
    }
}
