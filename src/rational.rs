//! Time bases

use std::cmp::Ordering;
use std::fmt;

/// A rational number, used as the unit of packet timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    /// Milliseconds, the default stream time base
    pub const MILLIS: Rational = Rational { num: 1, den: 1000 };

    pub fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// A usable time base has a positive numerator and denominator
    pub fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0
    }

    /// Reduce to lowest terms
    pub fn reduced(&self) -> Rational {
        let g = gcd(self.num.unsigned_abs(), self.den.unsigned_abs()).max(1) as i32;
        Rational::new(self.num / g, self.den / g)
    }

    /// Convert `ts` expressed in `self` into `to` units, rounding to nearest
    pub fn rescale(&self, ts: i64, to: Rational) -> i64 {
        let n = ts as i128 * self.num as i128 * to.den as i128;
        let d = self.den as i128 * to.num as i128;
        if d == 0 {
            return ts;
        }
        // round half away from zero
        let magnitude = (n.abs() + d.abs() / 2) / d.abs();
        let rounded = if (n < 0) != (d < 0) {
            -magnitude
        } else {
            magnitude
        };
        rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

impl Default for Rational {
    fn default() -> Self {
        Rational::MILLIS
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Compare two timestamps expressed in different time bases, exactly
pub fn compare_ts(a: i64, a_base: Rational, b: i64, b_base: Rational) -> Ordering {
    let lhs = a as i128 * a_base.num as i128 * b_base.den as i128;
    let rhs = b as i128 * b_base.num as i128 * a_base.den as i128;
    lhs.cmp(&rhs)
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(10, Rational::new(1, 1000), 1, Rational::new(1, 100), Ordering::Equal)]
    #[case(9, Rational::new(1, 1000), 1, Rational::new(1, 100), Ordering::Less)]
    #[case(3000, Rational::new(1, 90000), 33, Rational::new(1, 1000), Ordering::Greater)]
    #[case(-5, Rational::new(1, 1000), 0, Rational::new(1, 48000), Ordering::Less)]
    fn test_compare_ts(
        #[case] a: i64,
        #[case] a_base: Rational,
        #[case] b: i64,
        #[case] b_base: Rational,
        #[case] expected: Ordering,
    ) {
        assert_eq!(compare_ts(a, a_base, b, b_base), expected);
    }

    #[test]
    fn test_rescale() {
        let ms = Rational::MILLIS;
        assert_eq!(Rational::new(1, 90000).rescale(90000, ms), 1000);
        assert_eq!(Rational::new(1, 90000).rescale(3003, ms), 33);
        assert_eq!(ms.rescale(40, Rational::new(1, 90000)), 3600);
        assert_eq!(Rational::new(1, 3).rescale(-1, ms), -333);
    }

    #[test]
    fn test_reduced() {
        assert_eq!(Rational::new(1_000_000, 1_000_000_000).reduced(), Rational::MILLIS);
        assert!(!Rational::new(0, 1).is_valid());
    }
}
