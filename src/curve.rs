//! secp256k1 parameters and public-key encodings
//!
//! `P`, `N` and `G` are initialised once per process on first use and are
//! read-only afterwards.

use crate::base58::encode_base58_checksum;
use crate::constants::*;
use crate::ecdsa::Signature;
use crate::error::{ConsensusError, Result};
use crate::field::FieldElement;
use crate::hashes::hash160;
use crate::point::Point;
use crate::types::{Hash160, Network};
use num_bigint::BigUint;
use num_traits::Zero;
use once_cell::sync::Lazy;

fn parse_hex_constant(hex: &str) -> BigUint {
    BigUint::parse_bytes(hex.as_bytes(), 16).expect("valid curve constant")
}

/// Field prime
pub static P: Lazy<BigUint> = Lazy::new(|| parse_hex_constant(SECP256K1_P_HEX));

/// Group order
pub static N: Lazy<BigUint> = Lazy::new(|| parse_hex_constant(SECP256K1_N_HEX));

/// Generator point
pub static G: Lazy<Point> = Lazy::new(|| {
    let x = s256_field(&parse_hex_constant(SECP256K1_GX_HEX));
    let y = s256_field(&parse_hex_constant(SECP256K1_GY_HEX));
    Point::new(Some(x), Some(y), curve_a(), curve_b()).expect("generator is on the curve")
});

/// An element of the secp256k1 base field, reduced modulo `P`
pub fn s256_field(value: &BigUint) -> FieldElement {
    FieldElement::reduce_trusted(value, &P)
}

fn curve_a() -> FieldElement {
    s256_field(&BigUint::from(SECP256K1_A))
}

fn curve_b() -> FieldElement {
    s256_field(&BigUint::from(SECP256K1_B))
}

/// A point on secp256k1; both coordinates are reduced modulo `P` first
pub fn s256_point(x: &BigUint, y: &BigUint) -> Result<Point> {
    Point::new(Some(s256_field(x)), Some(s256_field(y)), curve_a(), curve_b())
}

/// `k * G` with the scalar reduced modulo `N`
pub fn scalar_base_mul(k: &BigUint) -> Result<Point> {
    G.scalar_mul(&(k % &*N))
}

/// Big-endian, left-padded to 32 bytes
pub fn to_bytes32(value: &BigUint) -> [u8; 32] {
    let bytes = value.to_bytes_be();
    let mut out = [0u8; 32];
    let start = 32usize.saturating_sub(bytes.len());
    out[start..].copy_from_slice(&bytes[bytes.len().saturating_sub(32)..]);
    out
}

impl Point {
    /// SEC encoding: `0x04 || x || y`, or `0x02/0x03 || x` by the parity of y
    pub fn sec(&self, compressed: bool) -> Result<Vec<u8>> {
        let (x, y) = match (self.x(), self.y()) {
            (Some(x), Some(y)) => (x, y),
            _ => {
                return Err(ConsensusError::ArithmeticPrecondition(
                    "point at infinity has no SEC encoding".to_string(),
                ))
            }
        };
        let mut out = Vec::with_capacity(if compressed { 33 } else { 65 });
        if compressed {
            out.push(if y.is_even() { 0x02 } else { 0x03 });
            out.extend_from_slice(&to_bytes32(x.value()));
        } else {
            out.push(0x04);
            out.extend_from_slice(&to_bytes32(x.value()));
            out.extend_from_slice(&to_bytes32(y.value()));
        }
        Ok(out)
    }

    /// Decode a SEC public key (compressed or uncompressed)
    pub fn parse_sec(bytes: &[u8]) -> Result<Point> {
        match (bytes.first(), bytes.len()) {
            (Some(0x04), 65) => {
                let x = BigUint::from_bytes_be(&bytes[1..33]);
                let y = BigUint::from_bytes_be(&bytes[33..65]);
                s256_point(&x, &y)
            }
            (Some(prefix @ (0x02 | 0x03)), 33) => {
                let x = s256_field(&BigUint::from_bytes_be(&bytes[1..]));
                let alpha = x.pow_u32(3)?.add(&curve_b())?;
                let beta = alpha.sqrt()?;
                if beta.pow_u32(2)? != alpha {
                    return Err(ConsensusError::NotOnCurve {
                        x: x.value().to_str_radix(16),
                        y: "?".to_string(),
                    });
                }
                let want_even = *prefix == 0x02;
                let y = if beta.is_even() == want_even {
                    beta
                } else {
                    beta.negate()
                };
                Point::new(Some(x), Some(y), curve_a(), curve_b())
            }
            (Some(prefix), len) => Err(ConsensusError::malformed(
                "sec public key",
                format!("prefix 0x{:02x} with length {}", prefix, len),
            )),
            (None, _) => Err(ConsensusError::Truncated {
                field: "sec public key",
                needed: 33,
                available: 0,
            }),
        }
    }

    /// hash160 of the SEC encoding
    pub fn hash160(&self, compressed: bool) -> Result<Hash160> {
        Ok(hash160(&self.sec(compressed)?))
    }

    /// Base58Check pay-to-pubkey-hash address
    pub fn address(&self, compressed: bool, network: Network) -> Result<String> {
        let mut payload = vec![network.p2pkh_prefix()];
        payload.extend_from_slice(&self.hash160(compressed)?);
        Ok(encode_base58_checksum(&payload))
    }

    /// ECDSA verification of `sig` over the digest `z` with this public key.
    ///
    /// A zero `r` or `s` is a failed verification, not an error.
    pub fn verify(&self, z: &BigUint, sig: &Signature) -> Result<bool> {
        if sig.r().is_zero() || sig.s().is_zero() || self.is_infinity() {
            return Ok(false);
        }
        let z = FieldElement::reduce_trusted(z, &N);
        let s_inv = sig.s().inverse()?;
        let u = z.mul(&s_inv)?;
        let v = sig.r().mul(&s_inv)?;
        let total = G.scalar_mul(u.value())?.add(&self.scalar_mul(v.value())?)?;
        match total.x() {
            Some(x) => Ok(&(x.value() % &*N) == sig.r().value()),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::One;

    fn big(hex: &str) -> BigUint {
        BigUint::parse_bytes(hex.as_bytes(), 16).unwrap()
    }

    #[test]
    fn test_generator_order() {
        assert!(G.scalar_mul(&N).unwrap().is_infinity());
        assert_eq!(scalar_base_mul(&(&*N + 1u32)).unwrap(), *G);
    }

    #[test]
    fn test_sec_of_private_key_one() {
        let p = scalar_base_mul(&BigUint::one()).unwrap();
        assert_eq!(
            hex::encode(p.sec(true).unwrap()),
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );
        assert_eq!(
            hex::encode(p.sec(false).unwrap()),
            "0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\
             483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8"
        );
    }

    #[test]
    fn test_parse_sec_recovers_point() {
        for secret in [1u64, 2, 999, 123456789] {
            let p = scalar_base_mul(&BigUint::from(secret)).unwrap();
            assert_eq!(Point::parse_sec(&p.sec(true).unwrap()).unwrap(), p);
            assert_eq!(Point::parse_sec(&p.sec(false).unwrap()).unwrap(), p);
        }
    }

    #[test]
    fn test_parse_sec_rejects_bad_input() {
        assert!(matches!(
            Point::parse_sec(&[0x05; 33]).unwrap_err(),
            ConsensusError::Malformed { .. }
        ));
        assert!(Point::parse_sec(&[0x02; 32]).is_err());
        assert!(Point::parse_sec(&[]).is_err());
        // Uncompressed encoding with y flipped by one is off the curve
        let mut sec = G.sec(false).unwrap();
        sec[64] ^= 1;
        assert!(matches!(
            Point::parse_sec(&sec).unwrap_err(),
            ConsensusError::NotOnCurve { .. }
        ));
    }

    #[test]
    fn test_address_of_private_key_one() {
        let p = scalar_base_mul(&BigUint::one()).unwrap();
        assert_eq!(
            p.address(true, Network::Mainnet).unwrap(),
            "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"
        );
        assert_eq!(
            p.address(false, Network::Mainnet).unwrap(),
            "1EHNa6Q4Jz2uvNExL497mE43ikXhwF6kZm"
        );
    }

    #[test]
    fn test_verify_known_signature() {
        // Signature vector from "Programming Bitcoin", chapter 3
        let point = s256_point(
            &big("887387e452b8eacc4acfde10d9aaf7f6d9a0f975aabb10d006e4da568744d06c"),
            &big("61de6d95231cd89026e286df3b6ae4a894a3378e393e93a0f45b666329a0ae34"),
        )
        .unwrap();
        let z = big("ec208baa0fc1c19f708a9ca96fdeff3ac3f230bb4a7ba4aede4942ad003c0f60");
        let r = big("ac8d1c87e51d0d441be8b3dd5b05c8795b48875dffe00b7ffcfac23010d3a395");
        let s = big("68342ceff8935ededd102dd876ffd6ba72d6a427a3edb13d26eb0781cb423c4");
        let sig = Signature::new(r, s).unwrap();
        assert!(point.verify(&z, &sig).unwrap());
        assert!(!point.verify(&(z + 1u32), &sig).unwrap());
    }

    #[test]
    fn test_verify_zero_components_is_false() {
        let sig = Signature::new(BigUint::zero(), BigUint::one()).unwrap();
        assert!(!G.verify(&BigUint::one(), &sig).unwrap());
        let sig = Signature::new(BigUint::one(), BigUint::zero()).unwrap();
        assert!(!G.verify(&BigUint::one(), &sig).unwrap());
    }

    #[test]
    fn test_to_bytes32_pads() {
        let bytes = to_bytes32(&BigUint::from(0x0102u32));
        assert_eq!(bytes[30], 0x01);
        assert_eq!(bytes[31], 0x02);
        assert!(bytes[..30].iter().all(|b| *b == 0));
    }
}
