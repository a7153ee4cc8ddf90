//! Elliptic curve points over a prime field
//!
//! Curve: y^2 = x^3 + a*x + b. A point is either the identity (point at
//! infinity) or an affine pair that was checked to lie on the curve when it
//! was constructed. Results of the group law are trusted without re-checking.

use crate::error::{ConsensusError, Result};
use crate::field::FieldElement;
use num_bigint::BigUint;
use num_traits::Zero;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Point {
    coordinates: Option<(FieldElement, FieldElement)>,
    a: FieldElement,
    b: FieldElement,
}

impl Point {
    /// Create a point. Both coordinates absent gives the identity; otherwise
    /// the pair must satisfy the curve equation.
    pub fn new(
        x: Option<FieldElement>,
        y: Option<FieldElement>,
        a: FieldElement,
        b: FieldElement,
    ) -> Result<Point> {
        match (x, y) {
            (None, None) => Ok(Point::infinity(a, b)),
            (Some(x), Some(y)) => {
                let left = y.pow_u32(2)?;
                let right = x.pow_u32(3)?.add(&a.mul(&x)?)?.add(&b)?;
                if left != right {
                    return Err(ConsensusError::NotOnCurve {
                        x: x.value().to_str_radix(16),
                        y: y.value().to_str_radix(16),
                    });
                }
                Ok(Point {
                    coordinates: Some((x, y)),
                    a,
                    b,
                })
            }
            _ => Err(ConsensusError::malformed(
                "point",
                "exactly one coordinate is missing",
            )),
        }
    }

    /// The identity element of the curve `a`, `b`
    pub fn infinity(a: FieldElement, b: FieldElement) -> Point {
        Point {
            coordinates: None,
            a,
            b,
        }
    }

    fn trusted(&self, x: FieldElement, y: FieldElement) -> Point {
        Point {
            coordinates: Some((x, y)),
            a: self.a.clone(),
            b: self.b.clone(),
        }
    }

    fn identity(&self) -> Point {
        Point::infinity(self.a.clone(), self.b.clone())
    }

    pub fn is_infinity(&self) -> bool {
        self.coordinates.is_none()
    }

    pub fn x(&self) -> Option<&FieldElement> {
        self.coordinates.as_ref().map(|(x, _)| x)
    }

    pub fn y(&self) -> Option<&FieldElement> {
        self.coordinates.as_ref().map(|(_, y)| y)
    }

    pub fn a(&self) -> &FieldElement {
        &self.a
    }

    pub fn b(&self) -> &FieldElement {
        &self.b
    }

    /// Reflect across the x axis
    pub fn negate(&self) -> Point {
        match &self.coordinates {
            None => self.clone(),
            Some((x, y)) => self.trusted(x.clone(), y.negate()),
        }
    }

    /// Group law
    pub fn add(&self, other: &Point) -> Result<Point> {
        if self.a != other.a || self.b != other.b {
            return Err(ConsensusError::ArithmeticPrecondition(format!(
                "points are on different curves ({}, {}) and ({}, {})",
                self.a, self.b, other.a, other.b
            )));
        }

        let (x1, y1) = match &self.coordinates {
            None => return Ok(other.clone()),
            Some(c) => c,
        };
        let (x2, y2) = match &other.coordinates {
            None => return Ok(self.clone()),
            Some(c) => c,
        };

        let slope = if x1 == x2 {
            // Additive inverses, or doubling a point with a vertical tangent
            if y1.add(y2)?.is_zero() {
                return Ok(self.identity());
            }
            // x1 == x2 and y1 != -y2 leaves only y1 == y2
            let numerator = x1.pow_u32(2)?.scalar_mul(&BigUint::from(3u32)).add(&self.a)?;
            let denominator = y1.scalar_mul(&BigUint::from(2u32));
            numerator.div(&denominator)?
        } else {
            y2.sub(y1)?.div(&x2.sub(x1)?)?
        };

        let x3 = slope.pow_u32(2)?.sub(x1)?.sub(x2)?;
        let y3 = slope.mul(&x1.sub(&x3)?)?.sub(y1)?;
        Ok(self.trusted(x3, y3))
    }

    /// `k * self` by double-and-add, least significant bit first
    pub fn scalar_mul(&self, k: &BigUint) -> Result<Point> {
        let mut result = self.identity();
        if k.is_zero() {
            return Ok(result);
        }
        let bytes = k.to_bytes_le();
        let bits = k.bits();
        let mut current = self.clone();
        for i in 0..bits {
            let byte = bytes[(i / 8) as usize];
            if (byte >> (i % 8)) & 1 == 1 {
                result = result.add(&current)?;
            }
            if i + 1 < bits {
                current = current.add(&current)?;
            }
        }
        Ok(result)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.coordinates {
            None => write!(f, "Point(infinity)"),
            Some((x, y)) => write!(
                f,
                "Point({:x},{:x})_{:x}_{:x} FieldElement({:x})",
                x.value(),
                y.value(),
                self.a.value(),
                self.b.value(),
                x.order()
            ),
        }
    }
}
