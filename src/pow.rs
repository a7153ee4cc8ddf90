//! Proof of work: compact target encoding, difficulty retargeting and the
//! header hash check

use crate::block::BlockHeader;
use crate::constants::*;
use crate::error::{ConsensusError, Result};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use once_cell::sync::Lazy;

/// Target encoded by `MAX_TARGET_BITS`, the easiest target allowed
static MAX_TARGET: Lazy<BigUint> = Lazy::new(|| {
    BigUint::from(MAX_TARGET_BITS & 0x007f_ffff) << (8 * ((MAX_TARGET_BITS >> 24) - 3))
});

/// ExpandTarget: ℕ₃₂ → ℕ₂₅₆
///
/// Decode the compact representation used in the header's `bits` field:
/// 1. exponent = bits >> 24, mantissa = bits & 0x007fffff
/// 2. If the sign bit (0x00800000) is set with a non-zero mantissa: reject
/// 3. If exponent ≤ 3: target = mantissa >> 8 × (3 - exponent)
/// 4. Otherwise: target = mantissa << 8 × (exponent - 3)
/// 5. Reject targets wider than 256 bits
pub fn bits_to_target(bits: u32) -> Result<BigUint> {
    let exponent = bits >> 24;
    let mantissa = bits & 0x007f_ffff;

    if bits & 0x0080_0000 != 0 && mantissa != 0 {
        return Err(ConsensusError::InvalidProofOfWork(format!(
            "compact target {:#010x} is negative",
            bits
        )));
    }

    let target = if exponent <= 3 {
        BigUint::from(mantissa >> (8 * (3 - exponent)))
    } else {
        BigUint::from(mantissa) << (8 * (exponent - 3))
    };

    if target.bits() > 256 {
        return Err(ConsensusError::InvalidProofOfWork(format!(
            "compact target {:#010x} overflows 256 bits",
            bits
        )));
    }
    Ok(target)
}

/// Encode a target in compact form, the inverse of [`bits_to_target`]
///
/// Precision below the top three significant bytes is dropped.
pub fn target_to_bits(target: &BigUint) -> u32 {
    if target.is_zero() {
        return 0;
    }
    let mut size = target.to_bytes_be().len() as u32;
    let mut mantissa = if size <= 3 {
        (target << (8 * (3 - size)))
            .to_u32()
            .unwrap_or_default()
    } else {
        (target >> (8 * (size - 3)))
            .to_u32()
            .unwrap_or_default()
    };
    // The top mantissa bit is the sign; move it into the next byte
    if mantissa & 0x0080_0000 != 0 {
        mantissa >>= 8;
        size += 1;
    }
    (size << 24) | mantissa
}

/// Difficulty: how many times harder `bits` is than the easiest target
pub fn difficulty(bits: u32) -> Result<f64> {
    let target = bits_to_target(bits)?;
    if target.is_zero() {
        return Err(ConsensusError::InvalidProofOfWork(
            "zero target has no difficulty".to_string(),
        ));
    }
    let max = MAX_TARGET.to_f64().unwrap_or(f64::INFINITY);
    let current = target.to_f64().unwrap_or(f64::INFINITY);
    Ok(max / current)
}

/// CalculateNewBits: ℕ₃₂ × ℤ → ℕ₃₂
///
/// Retarget after one adjustment interval:
/// 1. Clamp timeSpan to [TWO_WEEKS / 4, TWO_WEEKS × 4]
/// 2. newTarget = ExpandTarget(previousBits) × timeSpan / TWO_WEEKS
/// 3. Return Compact(min(newTarget, maxTarget))
pub fn calculate_new_bits(previous_bits: u32, time_differential: i64) -> Result<u32> {
    let lower = (TWO_WEEKS / 4) as i64;
    let upper = (TWO_WEEKS * 4) as i64;
    let time_span = time_differential.clamp(lower, upper) as u64;

    let previous_target = bits_to_target(previous_bits)?;
    let new_target = previous_target * time_span / TWO_WEEKS;
    let new_target = new_target.min((*MAX_TARGET).clone());
    Ok(target_to_bits(&new_target))
}

/// GetNextWorkRequired: ℋ × ℋ → ℕ₃₂
///
/// `first` and `last` are the first and last headers of the interval that
/// just ended; the time span between them drives the adjustment.
pub fn get_next_work_required(first: &BlockHeader, last: &BlockHeader) -> Result<u32> {
    let time_span = last.timestamp as i64 - first.timestamp as i64;
    log::debug!(
        "retargeting from {:#010x} over {} seconds",
        last.bits,
        time_span
    );
    calculate_new_bits(last.bits, time_span)
}

/// CheckProofOfWork: ℋ → {true, false}
///
/// Formula: LE(SHA256(SHA256(header))) < ExpandTarget(header.bits)
pub fn check_proof_of_work(header: &BlockHeader) -> Result<bool> {
    let target = bits_to_target(header.bits)?;
    let hash_value = BigUint::from_bytes_le(&header.hash());
    Ok(hash_value < target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_to_target_genesis() {
        let target = bits_to_target(0x1d00ffff).unwrap();
        assert_eq!(
            format!("{:064x}", target),
            "00000000ffff0000000000000000000000000000000000000000000000000000"
        );
        assert_eq!(target, *MAX_TARGET);
    }

    #[test]
    fn test_bits_to_target_small_exponent() {
        assert_eq!(bits_to_target(0x01120000).unwrap(), BigUint::from(0x12u32));
        assert_eq!(bits_to_target(0x02008000).unwrap(), BigUint::from(0x80u32));
        assert_eq!(bits_to_target(0x00000000).unwrap(), BigUint::zero());
    }

    #[test]
    fn test_bits_to_target_rejects_negative() {
        let result = bits_to_target(0x04923456);
        assert!(matches!(result, Err(ConsensusError::InvalidProofOfWork(_))));
    }

    #[test]
    fn test_bits_to_target_rejects_overflow() {
        let result = bits_to_target(0xff123456);
        assert!(matches!(result, Err(ConsensusError::InvalidProofOfWork(_))));
    }

    #[test]
    fn test_target_to_bits_round_trip() {
        for bits in [0x1d00ffffu32, 0x18013ce9, 0x1c7fff80, 0x17761500] {
            let target = bits_to_target(bits).unwrap();
            assert_eq!(target_to_bits(&target), bits);
        }
        assert_eq!(target_to_bits(&BigUint::from(0x80u32)), 0x02008000);
        assert_eq!(target_to_bits(&BigUint::from(0x12u32)), 0x01120000);
        assert_eq!(target_to_bits(&BigUint::zero()), 0);
    }

    #[test]
    fn test_difficulty() {
        assert_eq!(difficulty(0x1d00ffff).unwrap(), 1.0);
        let harder = difficulty(0x1c7fff80).unwrap();
        assert!((harder - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_calculate_new_bits_unchanged_on_schedule() {
        assert_eq!(calculate_new_bits(0x18013ce9, TWO_WEEKS as i64).unwrap(), 0x18013ce9);
    }

    #[test]
    fn test_calculate_new_bits_fast_interval() {
        assert_eq!(
            calculate_new_bits(0x1d00ffff, (TWO_WEEKS / 2) as i64).unwrap(),
            0x1c7fff80
        );
        assert_eq!(
            calculate_new_bits(0x18013ce9, (TWO_WEEKS / 3) as i64).unwrap(),
            0x1769a300
        );
    }

    #[test]
    fn test_calculate_new_bits_clamped() {
        // A one-second interval is treated as a quarter of two weeks
        assert_eq!(calculate_new_bits(0x1d00ffff, 1).unwrap(), 0x1c3fffc0);
        assert_eq!(calculate_new_bits(0x1d00ffff, -50).unwrap(), 0x1c3fffc0);
        // Slow intervals never ease past the maximum target
        assert_eq!(
            calculate_new_bits(0x1d00ffff, (TWO_WEEKS * 8) as i64).unwrap(),
            MAX_TARGET_BITS
        );
    }
}
