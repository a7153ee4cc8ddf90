//! Little-endian integers, variable-length integers and a bounds-checked reader
//!
//! Every read reports a [`ConsensusError::Truncated`] naming the field when the
//! buffer runs out, so parsers abort without producing partial results.

use crate::error::{ConsensusError, Result};

/// Cursor over a byte slice
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek_u8(&self, field: &'static str) -> Result<u8> {
        self.data.get(self.pos).copied().ok_or(ConsensusError::Truncated {
            field,
            needed: 1,
            available: 0,
        })
    }

    pub fn read_bytes(&mut self, len: usize, field: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(ConsensusError::Truncated {
                field,
                needed: len,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N, field)?);
        Ok(out)
    }

    pub fn read_u8(&mut self, field: &'static str) -> Result<u8> {
        Ok(self.read_array::<1>(field)?[0])
    }

    pub fn read_u16_le(&mut self, field: &'static str) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array(field)?))
    }

    pub fn read_u32_le(&mut self, field: &'static str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array(field)?))
    }

    pub fn read_u64_le(&mut self, field: &'static str) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array(field)?))
    }

    /// Read a 32-byte hash stored little-endian on the wire, returning it in
    /// display (big-endian) order
    pub fn read_hash_reversed(&mut self, field: &'static str) -> Result<[u8; 32]> {
        let mut hash = self.read_array::<32>(field)?;
        hash.reverse();
        Ok(hash)
    }

    pub fn read_varint(&mut self, field: &'static str) -> Result<u64> {
        match self.read_u8(field)? {
            0xfd => Ok(self.read_u16_le(field)? as u64),
            0xfe => Ok(self.read_u32_le(field)? as u64),
            0xff => self.read_u64_le(field),
            n => Ok(n as u64),
        }
    }

    /// Read a varint length and then that many bytes
    pub fn read_var_bytes(&mut self, field: &'static str) -> Result<&'a [u8]> {
        let len = self.read_varint(field)?;
        let len = usize::try_from(len)
            .map_err(|_| ConsensusError::malformed(field, format!("length {} too large", len)))?;
        self.read_bytes(len, field)
    }

    /// Fail unless the whole buffer was consumed
    pub fn finish(&self, field: &'static str) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ConsensusError::malformed(
                field,
                format!("{} trailing bytes", self.remaining()),
            ))
        }
    }
}

/// Encode an integer using Bitcoin's variable-length integer format
pub fn encode_varint(value: u64) -> Vec<u8> {
    if value < 0xfd {
        vec![value as u8]
    } else if value <= 0xffff {
        let mut out = vec![0xfd];
        out.extend_from_slice(&(value as u16).to_le_bytes());
        out
    } else if value <= 0xffff_ffff {
        let mut out = vec![0xfe];
        out.extend_from_slice(&(value as u32).to_le_bytes());
        out
    } else {
        let mut out = vec![0xff];
        out.extend_from_slice(&value.to_le_bytes());
        out
    }
}

/// Decode a varint from the start of `bytes`, returning the value and the
/// number of bytes it occupied
pub fn decode_varint(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut reader = ByteReader::new(bytes);
    let value = reader.read_varint("varint")?;
    Ok((value, reader.position()))
}

/// Encode `value` as exactly `len` little-endian bytes (`len <= 8`)
pub fn int_to_little_endian(value: u64, len: usize) -> Vec<u8> {
    value.to_le_bytes()[..len.min(8)].to_vec()
}

/// Interpret up to 8 bytes as a little-endian unsigned integer
pub fn little_endian_to_int(bytes: &[u8]) -> Result<u64> {
    if bytes.len() > 8 {
        return Err(ConsensusError::malformed(
            "little-endian integer",
            format!("expected at most 8 bytes, got {}", bytes.len()),
        ));
    }
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(u64::from_le_bytes(buf))
}
