//! ECDSA cross-checked against libsecp256k1

use consensus_core::hashes::hash256;
use consensus_core::*;
use num_bigint::BigUint;
use secp256k1::{ecdsa, Message, PublicKey, Secp256k1, SecretKey};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const SECRETS: [&str; 3] = [
    "0000000000000000000000000000000000000000000000000000000000000001",
    "e9873d79c6d87dc0fb6a5778633389f4453213303da61f20bd67fc233aa33262",
    "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364140",
];

fn key_pair(secret_hex: &str) -> anyhow::Result<(PrivateKey, SecretKey)> {
    let bytes = hex::decode(secret_hex)?;
    let ours = PrivateKey::new(BigUint::from_bytes_be(&bytes))?;
    let theirs = SecretKey::from_slice(&bytes)?;
    Ok((ours, theirs))
}

#[test]
fn test_public_keys_match_libsecp256k1() -> anyhow::Result<()> {
    init_logging();
    let secp = Secp256k1::new();
    for secret in SECRETS {
        let (ours, theirs) = key_pair(secret)?;
        let expected = PublicKey::from_secret_key(&secp, &theirs);
        assert_eq!(ours.public_point().sec(true)?, expected.serialize().to_vec());
        assert_eq!(
            ours.public_point().sec(false)?,
            expected.serialize_uncompressed().to_vec()
        );
    }
    Ok(())
}

#[test]
fn test_our_signatures_verify_in_libsecp256k1() -> anyhow::Result<()> {
    init_logging();
    let secp = Secp256k1::new();
    for (i, secret) in SECRETS.iter().enumerate() {
        let (ours, theirs) = key_pair(secret)?;
        let digest = hash256(format!("message {}", i).as_bytes());
        let z = BigUint::from_bytes_be(&digest);

        let sig = ours.sign(&z)?;
        assert!(sig.is_low_s());
        let parsed = ecdsa::Signature::from_der(&sig.der())?;
        let message = Message::from_digest_slice(&digest)?;
        let public = PublicKey::from_secret_key(&secp, &theirs);
        assert!(secp.verify_ecdsa(&message, &parsed, &public).is_ok());
    }
    Ok(())
}

#[test]
fn test_libsecp256k1_signatures_verify_here() -> anyhow::Result<()> {
    init_logging();
    let secp = Secp256k1::new();
    for (i, secret) in SECRETS.iter().enumerate() {
        let (ours, theirs) = key_pair(secret)?;
        let digest = hash256(format!("oracle {}", i).as_bytes());
        let message = Message::from_digest_slice(&digest)?;
        let der = secp.sign_ecdsa(&message, &theirs).serialize_der().to_vec();

        let sig = Signature::parse_der(&der)?;
        assert_eq!(sig.der(), der);
        let z = BigUint::from_bytes_be(&digest);
        assert!(ours.public_point().verify(&z, &sig)?);

        let wrong = BigUint::from_bytes_be(&hash256(b"something else"));
        assert!(!ours.public_point().verify(&wrong, &sig)?);
    }
    Ok(())
}

#[test]
fn test_parse_sec_accepts_libsecp256k1_keys() -> anyhow::Result<()> {
    init_logging();
    let secp = Secp256k1::new();
    for secret in SECRETS {
        let (ours, theirs) = key_pair(secret)?;
        let public = PublicKey::from_secret_key(&secp, &theirs);
        assert_eq!(&Point::parse_sec(&public.serialize())?, ours.public_point());
        assert_eq!(
            &Point::parse_sec(&public.serialize_uncompressed())?,
            ours.public_point()
        );
    }
    Ok(())
}

#[test]
fn test_generated_keys_round_trip() -> anyhow::Result<()> {
    init_logging();
    let secp = Secp256k1::new();
    let key = PrivateKey::generate()?;
    let theirs = SecretKey::from_slice(&curve::to_bytes32(key.secret()))?;
    let public = PublicKey::from_secret_key(&secp, &theirs);
    assert_eq!(key.public_point().sec(true)?, public.serialize().to_vec());
    assert!(!format!("{:?}", key).contains(&key.secret().to_str_radix(16)));
    Ok(())
}
