//! ECDSA signatures and private keys over secp256k1

use crate::base58::encode_base58_checksum;
use crate::codec::ByteReader;
use crate::curve::{scalar_base_mul, to_bytes32, N};
use crate::error::{ConsensusError, Result};
use crate::field::FieldElement;
use crate::point::Point;
use crate::types::Network;
use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::rngs::OsRng;
use std::fmt;

/// An `(r, s)` pair, both reduced modulo the group order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    r: FieldElement,
    s: FieldElement,
}

impl Signature {
    /// Both components must be below `N`
    pub fn new(r: BigUint, s: BigUint) -> Result<Signature> {
        Ok(Signature {
            r: FieldElement::new(r, (*N).clone())?,
            s: FieldElement::new(s, (*N).clone())?,
        })
    }

    pub fn r(&self) -> &FieldElement {
        &self.r
    }

    pub fn s(&self) -> &FieldElement {
        &self.s
    }

    /// Whether `s` lies in the lower half of the group order
    pub fn is_low_s(&self) -> bool {
        self.s.value() <= &(&*N >> 1u32)
    }

    /// DER encoding: `0x30 len 0x02 len(r) r 0x02 len(s) s`
    pub fn der(&self) -> Vec<u8> {
        let r = der_integer(self.r.value());
        let s = der_integer(self.s.value());
        let mut out = Vec::with_capacity(6 + r.len() + s.len());
        out.push(0x30);
        out.push((4 + r.len() + s.len()) as u8);
        out.push(0x02);
        out.push(r.len() as u8);
        out.extend_from_slice(&r);
        out.push(0x02);
        out.push(s.len() as u8);
        out.extend_from_slice(&s);
        out
    }

    /// Strict DER decoding; every declared length must match the buffer
    pub fn parse_der(bytes: &[u8]) -> Result<Signature> {
        let mut reader = ByteReader::new(bytes);
        if reader.read_u8("der signature marker")? != 0x30 {
            return Err(ConsensusError::malformed(
                "der signature marker",
                "expected compound marker 0x30",
            ));
        }
        let length = reader.read_u8("der signature length")? as usize;
        if length + 2 != bytes.len() {
            return Err(ConsensusError::malformed(
                "der signature length",
                format!("declared {} bytes, buffer holds {}", length, bytes.len() - 2),
            ));
        }
        let r = read_der_integer(&mut reader, "der r")?;
        let s = read_der_integer(&mut reader, "der s")?;
        reader.finish("der signature")?;
        if r.len() + s.len() + 4 != length {
            return Err(ConsensusError::malformed(
                "der signature length",
                "component lengths do not add up",
            ));
        }
        let r = BigUint::from_bytes_be(r);
        let s = BigUint::from_bytes_be(s);
        if r >= *N || s >= *N {
            return Err(ConsensusError::malformed(
                "der signature",
                "component is not below the group order",
            ));
        }
        Signature::new(r, s)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({:x},{:x})", self.r.value(), self.s.value())
    }
}

/// Minimal big-endian bytes, `0x00`-prefixed when the high bit is set
fn der_integer(value: &BigUint) -> Vec<u8> {
    let mut bytes = to_bytes32(value).to_vec();
    while bytes.len() > 1 && bytes[0] == 0 {
        bytes.remove(0);
    }
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0x00);
    }
    bytes
}

fn read_der_integer<'a>(reader: &mut ByteReader<'a>, field: &'static str) -> Result<&'a [u8]> {
    if reader.read_u8(field)? != 0x02 {
        return Err(ConsensusError::malformed(field, "expected integer marker 0x02"));
    }
    let len = reader.read_u8(field)? as usize;
    if len == 0 {
        return Err(ConsensusError::malformed(field, "empty integer"));
    }
    reader.read_bytes(len, field)
}

/// A secret scalar and its public point
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    secret: BigUint,
    point: Point,
}

impl PrivateKey {
    /// Requires `1 <= secret < N`
    pub fn new(secret: BigUint) -> Result<PrivateKey> {
        if secret.is_zero() || secret >= *N {
            return Err(ConsensusError::ArithmeticPrecondition(
                "private key must be in range 1 to N - 1".to_string(),
            ));
        }
        let point = scalar_base_mul(&secret)?;
        Ok(PrivateKey { secret, point })
    }

    /// A fresh key drawn from the operating system's CSPRNG
    pub fn generate() -> Result<PrivateKey> {
        let secret = OsRng.gen_biguint_range(&BigUint::one(), &N);
        PrivateKey::new(secret)
    }

    pub fn secret(&self) -> &BigUint {
        &self.secret
    }

    pub fn public_point(&self) -> &Point {
        &self.point
    }

    /// Sign the digest `z` with a random nonce, normalised to low s
    pub fn sign(&self, z: &BigUint) -> Result<Signature> {
        loop {
            let k = OsRng.gen_biguint_range(&BigUint::one(), &N);
            if let Some(sig) = self.sign_with_nonce(z, &k)? {
                return Ok(sig);
            }
            log::debug!("nonce produced a degenerate signature, retrying");
        }
    }

    /// `None` when the nonce yields `r == 0` or `s == 0`
    pub(crate) fn sign_with_nonce(&self, z: &BigUint, k: &BigUint) -> Result<Option<Signature>> {
        let n = &*N;
        let r = match scalar_base_mul(k)?.x() {
            Some(x) => x.value() % n,
            None => return Ok(None),
        };
        if r.is_zero() {
            return Ok(None);
        }
        let k = FieldElement::reduce(k, n)?;
        let numerator = FieldElement::reduce(&(z + &r * &self.secret), n)?;
        let mut s = numerator.div(&k)?;
        if s.is_zero() {
            return Ok(None);
        }
        if s.value() > &(n >> 1u32) {
            s = s.negate();
        }
        Ok(Some(Signature {
            r: FieldElement::new(r, n.clone())?,
            s,
        }))
    }

    /// Wallet import format
    pub fn wif(&self, compressed: bool, network: Network) -> String {
        let mut payload = Vec::with_capacity(34);
        payload.push(network.wif_prefix());
        payload.extend_from_slice(&to_bytes32(&self.secret));
        if compressed {
            payload.push(0x01);
        }
        encode_base58_checksum(&payload)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("secret", &"<redacted>")
            .field("point", &self.point)
            .finish()
    }
}
