//! Finite field arithmetic over a prime order
//!
//! A [`FieldElement`] is an immutable value in `[0, order)`. Every operation
//! returns a new element; combining elements of different orders is an
//! arithmetic precondition violation reported as an error rather than coerced.

use crate::error::{ConsensusError, Result};
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, Zero};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldElement {
    value: BigUint,
    order: BigUint,
}

impl FieldElement {
    /// Create an element, failing if `value >= order` or the order is below 2
    pub fn new(value: BigUint, order: BigUint) -> Result<Self> {
        if order < BigUint::from(2u32) {
            return Err(ConsensusError::ArithmeticPrecondition(format!(
                "field order {} is too small",
                order
            )));
        }
        if value >= order {
            return Err(ConsensusError::ArithmeticPrecondition(format!(
                "value {} is not in field range 0 to {}",
                value,
                &order - 1u32
            )));
        }
        Ok(FieldElement { value, order })
    }

    pub fn from_u64(value: u64, order: u64) -> Result<Self> {
        FieldElement::new(BigUint::from(value), BigUint::from(order))
    }

    /// Reduce an arbitrary integer into the field
    pub fn reduce(value: &BigUint, order: &BigUint) -> Result<Self> {
        if order.is_zero() {
            return Err(ConsensusError::ArithmeticPrecondition(
                "field order must be non-zero".to_string(),
            ));
        }
        FieldElement::new(value % order, order.clone())
    }

    /// `value mod order` where the order is already known to be valid
    pub(crate) fn reduce_trusted(value: &BigUint, order: &BigUint) -> Self {
        FieldElement {
            value: value % order,
            order: order.clone(),
        }
    }

    pub fn zero(order: &BigUint) -> Result<Self> {
        FieldElement::new(BigUint::zero(), order.clone())
    }

    pub fn one(order: &BigUint) -> Result<Self> {
        FieldElement::new(BigUint::one(), order.clone())
    }

    pub fn value(&self) -> &BigUint {
        &self.value
    }

    pub fn order(&self) -> &BigUint {
        &self.order
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_even(&self) -> bool {
        (&self.value % 2u32).is_zero()
    }

    /// An element in the same field
    fn with_value(&self, value: BigUint) -> FieldElement {
        FieldElement {
            value,
            order: self.order.clone(),
        }
    }

    fn check_order(&self, other: &FieldElement, op: &str) -> Result<()> {
        if self.order != other.order {
            return Err(ConsensusError::ArithmeticPrecondition(format!(
                "cannot {} elements of order {} and {}",
                op, self.order, other.order
            )));
        }
        Ok(())
    }

    pub fn add(&self, other: &FieldElement) -> Result<FieldElement> {
        self.check_order(other, "add")?;
        Ok(self.with_value((&self.value + &other.value) % &self.order))
    }

    pub fn sub(&self, other: &FieldElement) -> Result<FieldElement> {
        self.check_order(other, "subtract")?;
        Ok(self.with_value((&self.value + &self.order - &other.value) % &self.order))
    }

    pub fn mul(&self, other: &FieldElement) -> Result<FieldElement> {
        self.check_order(other, "multiply")?;
        Ok(self.with_value((&self.value * &other.value) % &self.order))
    }

    /// `self / other` computed as `self * other^(order - 2)`; the order must be prime
    pub fn div(&self, other: &FieldElement) -> Result<FieldElement> {
        self.check_order(other, "divide")?;
        self.mul(&other.inverse()?)
    }

    /// Multiply by an integer, reduced modulo the order
    pub fn scalar_mul(&self, k: &BigUint) -> FieldElement {
        self.with_value((k % &self.order) * &self.value % &self.order)
    }

    /// `self^exponent` with the exponent reduced modulo `order - 1`
    pub fn pow(&self, exponent: &BigInt) -> Result<FieldElement> {
        if self.is_zero() {
            return match exponent.sign() {
                Sign::NoSign => Ok(self.with_value(BigUint::one())),
                Sign::Plus => Ok(self.clone()),
                Sign::Minus => Err(ConsensusError::ArithmeticPrecondition(
                    "zero raised to a negative power".to_string(),
                )),
            };
        }
        let group_order = BigInt::from(&self.order - 1u32);
        let reduced = ((exponent % &group_order) + &group_order) % &group_order;
        let (_, magnitude) = reduced.into_parts();
        Ok(self.with_value(self.value.modpow(&magnitude, &self.order)))
    }

    pub fn pow_u32(&self, exponent: u32) -> Result<FieldElement> {
        self.pow(&BigInt::from(exponent))
    }

    /// Additive inverse; the negation of zero is zero
    pub fn negate(&self) -> FieldElement {
        if self.is_zero() {
            return self.clone();
        }
        self.with_value(&self.order - &self.value)
    }

    /// Multiplicative inverse via Fermat's little theorem
    pub fn inverse(&self) -> Result<FieldElement> {
        if self.is_zero() {
            return Err(ConsensusError::ArithmeticPrecondition(
                "zero has no multiplicative inverse".to_string(),
            ));
        }
        let exponent = &self.order - 2u32;
        Ok(self.with_value(self.value.modpow(&exponent, &self.order)))
    }

    /// `value^((order + 1) / 4)`, a square root when one exists.
    ///
    /// Only defined for orders congruent to 3 mod 4. The caller is responsible
    /// for checking that the result squares back to `self`.
    pub fn sqrt(&self) -> Result<FieldElement> {
        if &self.order % 4u32 != BigUint::from(3u32) {
            return Err(ConsensusError::ArithmeticPrecondition(format!(
                "square root requires order = 3 mod 4, got order {}",
                self.order
            )));
        }
        let exponent = (&self.order + 1u32) / 4u32;
        Ok(self.with_value(self.value.modpow(&exponent, &self.order)))
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement_{}({})", self.order, self.value)
    }
}
