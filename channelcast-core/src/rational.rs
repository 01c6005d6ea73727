//! Rational number type for aspect ratios and frame rates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A rational number represented as a numerator and denominator.
///
/// ffprobe reports aspect ratios as `"16:9"` and frame rates as `"30000/1001"`;
/// both spellings parse into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rational {
    /// Numerator
    pub num: u32,
    /// Denominator (never zero)
    pub den: u32,
}

impl Rational {
    /// Create a new rational number. Returns `None` for a zero denominator.
    pub fn new(num: u32, den: u32) -> Option<Self> {
        (den != 0).then_some(Self { num, den })
    }

    /// Create a rational representing one.
    pub const fn one() -> Self {
        Self { num: 1, den: 1 }
    }

    /// Check if this rational is zero.
    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    /// Check if this rational equals one once reduced.
    pub fn is_one(&self) -> bool {
        self.num == self.den
    }

    /// Reduce the rational to its simplest form.
    pub fn reduce(&self) -> Self {
        if self.num == 0 {
            return Self { num: 0, den: 1 };
        }
        let g = gcd(self.num, self.den);
        Self {
            num: self.num / g,
            den: self.den / g,
        }
    }

    /// Convert to f64.
    pub fn to_f64(&self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::one()
    }
}

impl FromStr for Rational {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (num, den) = s
            .split_once(':')
            .or_else(|| s.split_once('/'))
            .unwrap_or((s, "1"));
        let num = num
            .trim()
            .parse::<u32>()
            .map_err(|_| Error::invalid_param(format!("bad ratio '{}'", s)))?;
        let den = den
            .trim()
            .parse::<u32>()
            .map_err(|_| Error::invalid_param(format!("bad ratio '{}'", s)))?;
        Rational::new(num, den)
            .ok_or_else(|| Error::invalid_param(format!("zero denominator in '{}'", s)))
    }
}

impl TryFrom<String> for Rational {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Rational> for String {
    fn from(r: Rational) -> Self {
        format!("{}/{}", r.num, r.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}
